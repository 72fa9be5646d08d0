use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

const HELD: u64 = 1;

/// Глобальный флаг "полка создаётся". Состояние - одно слово:
/// `(generation << 1) | held`, захват и освобождение одним CAS.
#[derive(Debug, Default)]
pub struct TriggerLock {
    state: AtomicU64,
    acquired_at_ms: AtomicU64,
}

/// Подтверждение для коллаборатора. Освобождает только свой захват:
/// опоздавшее подтверждение после таймаута не трогает новый захват.
/// Удаление без `complete()` замок не освобождает, его снимет таймаут.
#[derive(Debug, Clone)]
pub struct TriggerAck {
    lock: Arc<TriggerLock>,
    generation: u64,
}

impl TriggerAck {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn complete(self) -> bool {
        self.lock.release(self.generation)
    }
}

impl TriggerLock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn try_acquire(self: &Arc<Self>, now_ms: u64) -> Option<TriggerAck> {
        let current = self.state.load(Ordering::Acquire);
        if current & HELD == HELD {
            return None;
        }

        let generation = (current >> 1) + 1;
        let next = (generation << 1) | HELD;
        match self
            .state
            .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                self.acquired_at_ms.store(now_ms, Ordering::Release);
                debug!("Замок триггера захвачен (поколение {})", generation);
                Some(TriggerAck {
                    lock: self.clone(),
                    generation,
                })
            }
            Err(_) => None,
        }
    }

    /// Освободить захват с данным поколением. `false` - он уже снят или заменён.
    pub fn release(&self, generation: u64) -> bool {
        let held = (generation << 1) | HELD;
        let released = generation << 1;
        let ok = self
            .state
            .compare_exchange(held, released, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if ok {
            debug!("Замок триггера освобождён (поколение {})", generation);
        } else {
            debug!("Устаревшее подтверждение поколения {} проигнорировано", generation);
        }
        ok
    }

    /// Снять захват, если коллаборатор не ответил за `timeout_ms`
    pub fn expire_if_stale(&self, now_ms: u64, timeout_ms: u64) -> bool {
        let current = self.state.load(Ordering::Acquire);
        if current & HELD == 0 {
            return false;
        }
        let acquired_at = self.acquired_at_ms.load(Ordering::Acquire);
        if now_ms.saturating_sub(acquired_at) < timeout_ms {
            return false;
        }

        let generation = current >> 1;
        let expired = self.release(generation);
        if expired {
            warn!(
                "Нет подтверждения создания полки за {}ms, замок снят по таймауту",
                timeout_ms
            );
        }
        expired
    }

    pub fn is_held(&self) -> bool {
        self.state.load(Ordering::Acquire) & HELD == HELD
    }

    pub fn generation(&self) -> u64 {
        self.state.load(Ordering::Acquire) >> 1
    }

    /// Когда истечёт текущий захват (если он есть)
    pub fn deadline_ms(&self, timeout_ms: u64) -> Option<u64> {
        self.is_held()
            .then(|| self.acquired_at_ms.load(Ordering::Acquire).saturating_add(timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_while_held() {
        let lock = TriggerLock::new();
        let ack = lock.try_acquire(100).unwrap();
        assert!(lock.try_acquire(101).is_none());
        assert!(ack.complete());
        assert!(!lock.is_held());
        assert!(lock.try_acquire(102).is_some());
    }

    #[test]
    fn test_late_ack_does_not_release_newer_acquisition() {
        let lock = TriggerLock::new();
        let stale = lock.try_acquire(0).unwrap();
        assert!(lock.expire_if_stale(5_000, 5_000));

        let fresh = lock.try_acquire(5_001).unwrap();
        assert!(!stale.complete());
        assert!(lock.is_held());
        assert!(fresh.complete());
    }

    #[test]
    fn test_expire_respects_timeout() {
        let lock = TriggerLock::new();
        let _ack = lock.try_acquire(1_000).unwrap();
        assert!(!lock.expire_if_stale(5_999, 5_000));
        assert_eq!(lock.deadline_ms(5_000), Some(6_000));
        assert!(lock.expire_if_stale(6_000, 5_000));
        assert_eq!(lock.deadline_ms(5_000), None);
    }

    #[test]
    fn test_dropping_ack_keeps_lock() {
        let lock = TriggerLock::new();
        drop(lock.try_acquire(0));
        assert!(lock.is_held());
    }

    #[test]
    fn test_concurrent_acquire_has_single_winner() {
        let lock = TriggerLock::new();
        let winners: usize = (0..8)
            .map(|_| {
                let lock = lock.clone();
                std::thread::spawn(move || lock.try_acquire(0).is_some() as usize)
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .sum();
        assert_eq!(winners, 1);
    }
}
