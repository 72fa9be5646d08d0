//! Единые миллисекундные часы конвейера.
//!
//! Все отметки времени на границе моста событий - миллисекунды от UNIX-эпохи.
//! `now_ms()` монотонна: реальное время фиксируется один раз при первом обращении,
//! дальше к нему прибавляется `Instant::elapsed()`.

use once_cell::sync::Lazy;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Расхождение часов ядра с часами конвейера, после которого считаем, что реальное время скакнуло
const KERNEL_STEP_TOLERANCE_MS: i64 = 1_000;

static ANCHOR: Lazy<(Instant, u64)> = Lazy::new(|| {
    let wall_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    (Instant::now(), wall_ms)
});

/// Текущее время в миллисекундах (монотонно, от эпохи)
pub fn now_ms() -> u64 {
    let (instant, wall_ms) = *ANCHOR;
    wall_ms + instant.elapsed().as_millis() as u64
}

/// Отметка ядра (`struct timeval`: секунды + микросекунды) в миллисекунды
pub fn timeval_to_ms(sec: i64, usec: i64) -> u64 {
    if sec < 0 {
        return 0;
    }
    (sec as u64) * 1_000 + (usec.max(0) as u64) / 1_000
}

/// `SystemTime` события evdev в миллисекунды от эпохи
pub fn system_time_to_ms(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(duration_to_ms)
        .unwrap_or(0)
}

pub fn duration_to_ms(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

/// Перевод отметок ядра (реальное время, может скакать при NTP или ручной
/// установке) в часы конвейера. Интервалы между событиями берутся у ядра,
/// привязка к `now_ms()` обновляется при скачке.
#[derive(Debug, Default)]
pub struct KernelClock {
    offset_ms: Option<i64>,
    resyncs: u64,
}

impl KernelClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_pipeline_ms(&mut self, kernel_ms: u64, now_ms: u64) -> u64 {
        let kernel = kernel_ms as i64;
        let now = now_ms as i64;

        let offset = match self.offset_ms {
            Some(offset) if (kernel + offset - now).abs() <= KERNEL_STEP_TOLERANCE_MS => offset,
            previous => {
                if let Some(stale) = previous {
                    self.resyncs += 1;
                    debug!("Скачок часов ядра на {}ms, привязка обновлена", kernel + stale - now);
                }
                let offset = now - kernel;
                self.offset_ms = Some(offset);
                offset
            }
        };

        // Событие не может быть из будущего
        (kernel + offset).clamp(0, now) as u64
    }

    /// Сколько раз часы ядра перепривязывались
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }
}
