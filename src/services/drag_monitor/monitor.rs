use crate::config::DragConfig;
use crate::error::DragReadError;
use crate::events::{DragItem, DragSignal, DragSnapshot, PositionSample};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::r#trait::DragProbe;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Inactive,
    /// Перетаскивание есть, но содержимое пустое: одно повторное чтение
    PendingRetry { retry_at_ms: u64 },
    Active,
}

/// Адаптивный опрос состояния перетаскивания.
///
/// Выдаёт фронты `Start`/`End`. Полное содержимое читается только на переходе
/// inactive→active и кешируется; после `End` кеш живёт `payload_clear_delay_ms`.
pub struct DragStateMonitor {
    probe: Box<dyn DragProbe>,
    config: DragConfig,
    running: bool,
    phase: Phase,
    payload: DragSnapshot,
    last_positive_ms: Option<u64>,
    clear_at_ms: Option<u64>,
    consecutive_failures: u32,
    total_failures: u64,
}

impl DragStateMonitor {
    pub fn new(probe: Box<dyn DragProbe>, config: DragConfig) -> Self {
        Self {
            probe,
            config,
            running: false,
            phase: Phase::Inactive,
            payload: DragSnapshot::default(),
            last_positive_ms: None,
            clear_at_ms: None,
            consecutive_failures: 0,
            total_failures: 0,
        }
    }

    pub fn start(&mut self) {
        if self.running {
            return;
        }
        info!(
            "Монитор перетаскивания запущен (опрос {}ms / {}ms)",
            self.config.active_poll_interval_ms, self.config.idle_poll_interval_ms
        );
        self.running = true;
        self.phase = Phase::Inactive;
        self.consecutive_failures = 0;
    }

    /// Идемпотентна
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        info!("Монитор перетаскивания остановлен");
        self.running = false;
        self.phase = Phase::Inactive;
        self.payload = DragSnapshot::default();
        self.last_positive_ms = None;
        self.clear_at_ms = None;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn update_polling(&mut self, active_ms: Option<u64>, idle_ms: Option<u64>) {
        if let Some(active) = active_ms {
            self.config.active_poll_interval_ms = active.max(1);
        }
        if let Some(idle) = idle_ms {
            self.config.idle_poll_interval_ms = idle;
        }
        // Простой опрос не бывает чаще активного
        self.config.idle_poll_interval_ms = self
            .config
            .idle_poll_interval_ms
            .max(self.config.active_poll_interval_ms);
        info!(
            "Интервалы опроса: {}ms активный, {}ms простой",
            self.config.active_poll_interval_ms, self.config.idle_poll_interval_ms
        );
    }

    pub fn observe(&mut self, samples: &[PositionSample]) {
        self.probe.observe(samples);
    }

    pub fn total_failures(&self) -> u64 {
        self.total_failures
    }

    pub fn is_drag_active(&self) -> bool {
        self.phase == Phase::Active
    }

    /// Закешированное содержимое (остаётся какое-то время после `End`)
    pub fn snapshot(&self) -> &DragSnapshot {
        &self.payload
    }

    pub fn items(&self) -> &[DragItem] {
        &self.payload.items
    }

    /// Через сколько опросить снова: часто при подозрении на перетаскивание
    pub fn next_interval(&self, now_ms: u64) -> Duration {
        let suspected = matches!(self.phase, Phase::Active | Phase::PendingRetry { .. })
            || self
                .last_positive_ms
                .map_or(false, |t| now_ms.saturating_sub(t) < self.config.active_hold_ms);

        let mut interval_ms = if suspected {
            self.config.active_poll_interval_ms
        } else {
            self.config.idle_poll_interval_ms
        };

        if let Phase::PendingRetry { retry_at_ms } = self.phase {
            interval_ms = interval_ms.min(retry_at_ms.saturating_sub(now_ms));
        }
        if let Some(clear_at) = self.clear_at_ms {
            interval_ms = interval_ms.min(clear_at.saturating_sub(now_ms));
        }

        Duration::from_millis(interval_ms.max(1))
    }

    /// Один тик опроса. Ошибка чтения - "без изменений"; каждые
    /// `max_consecutive_failures` подряд поднимается `DragSignal::Error`.
    pub async fn poll(&mut self, now_ms: u64) -> Option<DragSignal> {
        if !self.running {
            return None;
        }

        if self.clear_at_ms.map_or(false, |t| now_ms >= t) {
            debug!("Кеш содержимого перетаскивания очищен");
            self.payload = DragSnapshot::inactive(now_ms);
            self.clear_at_ms = None;
        }

        let active = match self.probe.is_drag_active(now_ms) {
            Ok(active) => active,
            Err(e) => return self.on_failure(e),
        };

        let signal = match (self.phase, active) {
            (Phase::Inactive, false) => None,
            (Phase::Inactive, true) => {
                self.last_positive_ms = Some(now_ms);
                // Новое перетаскивание отменяет отложенную очистку
                self.clear_at_ms = None;
                match self.probe.read_items().await {
                    Ok(items) if items.is_empty() => {
                        debug!("Перетаскивание без содержимого, повтор через {}ms", self.config.empty_retry_delay_ms);
                        self.phase = Phase::PendingRetry {
                            retry_at_ms: now_ms + self.config.empty_retry_delay_ms,
                        };
                        None
                    }
                    Ok(items) => Some(self.enter_active(items, now_ms)),
                    Err(e) => return self.on_failure(e),
                }
            }
            (Phase::PendingRetry { .. }, false) => {
                debug!("Перетаскивание закончилось до повторного чтения");
                self.phase = Phase::Inactive;
                None
            }
            (Phase::PendingRetry { retry_at_ms }, true) => {
                self.last_positive_ms = Some(now_ms);
                if now_ms < retry_at_ms {
                    None
                } else {
                    // Повтор ровно один: дальше принимаем то, что есть
                    let items = match self.probe.read_items().await {
                        Ok(items) => items,
                        Err(e) => {
                            self.record_failure(&e);
                            Vec::new()
                        }
                    };
                    Some(self.enter_active(items, now_ms))
                }
            }
            (Phase::Active, true) => {
                self.last_positive_ms = Some(now_ms);
                None
            }
            (Phase::Active, false) => {
                info!("Перетаскивание завершено");
                self.phase = Phase::Inactive;
                self.clear_at_ms = Some(now_ms + self.config.payload_clear_delay_ms);
                Some(DragSignal::End)
            }
        };

        self.consecutive_failures = 0;
        signal
    }

    fn enter_active(&mut self, items: Vec<DragItem>, now_ms: u64) -> DragSignal {
        info!("Перетаскивание начато: {} элементов", items.len());
        self.phase = Phase::Active;
        self.payload = DragSnapshot::active(items, now_ms);
        DragSignal::Start(self.payload.clone())
    }

    fn record_failure(&mut self, error: &DragReadError) -> u32 {
        self.consecutive_failures += 1;
        self.total_failures += 1;
        warn!(
            "Ошибка опроса перетаскивания ({} подряд): {}",
            self.consecutive_failures, error
        );
        self.consecutive_failures
    }

    fn on_failure(&mut self, error: DragReadError) -> Option<DragSignal> {
        let failures = self.record_failure(&error);
        (failures % self.config.max_consecutive_failures.max(1) == 0).then(|| DragSignal::Error(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Скриптованный зонд: очередь ответов активности и содержимого
    #[derive(Clone, Default)]
    struct ScriptedProbe {
        active: Arc<Mutex<VecDeque<Result<bool, DragReadError>>>>,
        items: Arc<Mutex<VecDeque<Result<Vec<DragItem>, DragReadError>>>>,
        reads: Arc<Mutex<u32>>,
    }

    impl ScriptedProbe {
        fn push_active(&self, value: Result<bool, DragReadError>) {
            self.active.lock().push_back(value);
        }

        fn push_items(&self, value: Result<Vec<DragItem>, DragReadError>) {
            self.items.lock().push_back(value);
        }

        fn reads(&self) -> u32 {
            *self.reads.lock()
        }
    }

    #[async_trait::async_trait]
    impl DragProbe for ScriptedProbe {
        fn observe(&mut self, _samples: &[PositionSample]) {}

        fn is_drag_active(&mut self, _now_ms: u64) -> Result<bool, DragReadError> {
            self.active.lock().pop_front().unwrap_or(Ok(false))
        }

        async fn read_items(&mut self) -> Result<Vec<DragItem>, DragReadError> {
            *self.reads.lock() += 1;
            self.items.lock().pop_front().unwrap_or(Ok(Vec::new()))
        }
    }

    fn monitor(probe: &ScriptedProbe) -> DragStateMonitor {
        let mut monitor = DragStateMonitor::new(Box::new(probe.clone()), DragConfig::default());
        monitor.start();
        monitor
    }

    fn item() -> DragItem {
        DragItem::from_path("/tmp/drag-shake-test.txt")
    }

    #[tokio::test]
    async fn test_start_and_end_edges() {
        let probe = ScriptedProbe::default();
        for active in [false, true, true, false] {
            probe.push_active(Ok(active));
        }
        probe.push_items(Ok(vec![item()]));
        let mut monitor = monitor(&probe);

        assert_eq!(monitor.poll(0).await, None);
        let start = monitor.poll(10).await;
        assert!(matches!(start, Some(DragSignal::Start(ref s)) if s.items.len() == 1));
        assert_eq!(monitor.poll(20).await, None);
        assert_eq!(monitor.poll(30).await, Some(DragSignal::End));
        // Содержимое читается только на фронте
        assert_eq!(probe.reads(), 1);
    }

    #[tokio::test]
    async fn test_empty_items_retried_exactly_once() {
        let probe = ScriptedProbe::default();
        for active in [false, true, true, true] {
            probe.push_active(Ok(active));
        }
        probe.push_items(Ok(Vec::new()));
        probe.push_items(Ok(Vec::new()));
        let mut monitor = monitor(&probe);

        assert_eq!(monitor.poll(0).await, None);
        assert_eq!(monitor.poll(60).await, None);
        let accepted = monitor.poll(120).await;
        assert!(matches!(accepted, Some(DragSignal::Start(ref s)) if s.items.is_empty()));
        assert_eq!(monitor.poll(180).await, None);
        assert_eq!(probe.reads(), 2);
    }

    #[tokio::test]
    async fn test_retry_finds_items() {
        let probe = ScriptedProbe::default();
        for active in [true, true, true] {
            probe.push_active(Ok(active));
        }
        probe.push_items(Ok(Vec::new()));
        probe.push_items(Ok(vec![item()]));
        let mut monitor = monitor(&probe);

        assert_eq!(monitor.poll(0).await, None);
        // До срока повтора не читаем
        assert_eq!(monitor.poll(10).await, None);
        assert_eq!(probe.reads(), 1);
        let start = monitor.poll(50).await;
        assert!(matches!(start, Some(DragSignal::Start(ref s)) if s.items.len() == 1));
    }

    #[tokio::test]
    async fn test_three_failures_escalate_without_stopping() {
        let probe = ScriptedProbe::default();
        for _ in 0..3 {
            probe.push_active(Err(DragReadError::PollReadFailed("xclip".into())));
        }
        probe.push_active(Ok(true));
        probe.push_items(Ok(vec![item()]));
        let mut monitor = monitor(&probe);

        assert_eq!(monitor.poll(0).await, None);
        assert_eq!(monitor.poll(100).await, None);
        assert!(matches!(monitor.poll(200).await, Some(DragSignal::Error(_))));
        assert!(monitor.is_running());
        assert!(matches!(monitor.poll(300).await, Some(DragSignal::Start(_))));
    }

    #[tokio::test]
    async fn test_success_resets_failure_streak() {
        let probe = ScriptedProbe::default();
        probe.push_active(Err(DragReadError::PollReadFailed("a".into())));
        probe.push_active(Err(DragReadError::PollReadFailed("b".into())));
        probe.push_active(Ok(false));
        probe.push_active(Err(DragReadError::PollReadFailed("c".into())));
        let mut monitor = monitor(&probe);

        for t in 0..4 {
            assert_eq!(monitor.poll(t * 100).await, None);
        }
    }

    #[tokio::test]
    async fn test_payload_cleared_after_delay() {
        let probe = ScriptedProbe::default();
        for active in [true, false, false, false] {
            probe.push_active(Ok(active));
        }
        probe.push_items(Ok(vec![item()]));
        let mut monitor = monitor(&probe);

        monitor.poll(0).await;
        assert_eq!(monitor.poll(100).await, Some(DragSignal::End));
        monitor.poll(400).await;
        assert_eq!(monitor.items().len(), 1);
        monitor.poll(600).await;
        assert!(monitor.items().is_empty());
    }

    #[tokio::test]
    async fn test_adaptive_interval() {
        let probe = ScriptedProbe::default();
        probe.push_active(Ok(true));
        probe.push_active(Ok(false));
        probe.push_items(Ok(vec![item()]));
        let mut monitor = monitor(&probe);

        assert_eq!(monitor.next_interval(0), Duration::from_millis(100));
        monitor.poll(0).await;
        assert_eq!(monitor.next_interval(5), Duration::from_millis(10));
        monitor.poll(20).await;
        // Недавнее перетаскивание держит частый опрос
        assert_eq!(monitor.next_interval(300), Duration::from_millis(10));
        monitor.poll(600).await;
        assert_eq!(monitor.next_interval(1_000), Duration::from_millis(100));
    }

    #[test]
    fn test_polling_update_keeps_idle_not_faster_than_active() {
        let probe = ScriptedProbe::default();
        let mut monitor = monitor(&probe);

        monitor.update_polling(Some(200), None);
        assert_eq!(monitor.next_interval(0), Duration::from_millis(200));

        monitor.update_polling(Some(20), Some(5));
        assert_eq!(monitor.next_interval(0), Duration::from_millis(20));

        monitor.update_polling(None, Some(300));
        assert_eq!(monitor.next_interval(0), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_stopped_monitor_is_inert() {
        let probe = ScriptedProbe::default();
        probe.push_active(Ok(true));
        let mut monitor = monitor(&probe);
        monitor.stop();
        monitor.stop();
        assert_eq!(monitor.poll(0).await, None);
        assert_eq!(probe.reads(), 0);
    }
}
