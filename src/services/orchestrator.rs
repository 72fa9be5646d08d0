//! Оркестратор: сводит перетаскивание, встряхивание и замок триггера
//! в один сигнал "создать полку" и отвечает за восстановление захвата.
//!
//! Всё состояние приложения принадлежит одной задаче tokio (`run`).
//! Поток захвата влияет на него только через мост и канал сбоев.

use crate::config::{Config, ShakeConfig, ShakeConfigPatch};
use crate::error::{CaptureError, Result, ShakeError};
use crate::events::{
    Component, DragSignal, FeatureStatus, PositionSample, ShakeEvent, ShelfTrigger, Vector2D,
};
use crate::services::bridge::{BridgeReceiver, EventBridge};
use crate::services::capture::{create_capture_source, CaptureFault, CaptureSource};
use crate::services::drag_monitor::{create_drag_probe, DragProbe, DragStateMonitor};
use crate::services::gesture_detector::GestureDetector;
use crate::services::health::{HealthStatus, HealthTracker};
use crate::services::metrics::{MetricsSnapshot, PipelineStats};
use crate::services::trigger_lock::{TriggerAck, TriggerLock};
use crate::utils::clock;
use crate::debug_if_enabled;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

/// Внешний сервис полок
pub trait ShelfCollaborator: Send + Sync {
    /// Вызывается не чаще раза за окно антидребезга. Замок держится,
    /// пока не вызван `ack.complete()` или не истёк таймаут подтверждения.
    fn on_drag_shake_triggered(&self, trigger: ShelfTrigger, ack: TriggerAck);

    fn on_status_changed(&self, _status: &FeatureStatus) {}
}

/// Коллаборатор бинарника: пишет триггер в лог и сразу подтверждает
pub struct LoggingShelf;

impl ShelfCollaborator for LoggingShelf {
    fn on_drag_shake_triggered(&self, trigger: ShelfTrigger, ack: TriggerAck) {
        info!("🗂  Создание полки: {}", trigger);
        for item in &trigger.items {
            info!("   • {} ({:?})", item, item.path);
        }
        ack.complete();
    }

    fn on_status_changed(&self, status: &FeatureStatus) {
        info!("Статус drag+shake: {}", status);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    DragActive,
    Triggering,
}

#[derive(Debug, Default)]
struct Recovery {
    consecutive_failures: u32,
    restart_at_ms: Option<u64>,
    last_restart_ms: Option<u64>,
    /// Перезапуски больше не выполняются
    disabled: bool,
}

enum Command {
    UpdateShakeConfig(ShakeConfigPatch, oneshot::Sender<Result<ShakeConfig>>),
    UpdatePolling {
        active_ms: Option<u64>,
        idle_ms: Option<u64>,
    },
    AcknowledgeTrigger(u64),
    Metrics(oneshot::Sender<MetricsSnapshot>),
    Status(oneshot::Sender<FeatureStatus>),
    Shutdown,
}

/// Управление работающим оркестратором из любых задач
#[derive(Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::Sender<Command>,
}

impl OrchestratorHandle {
    async fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| ShakeError::ServiceUnavailable("оркестратор остановлен".to_string()))
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx)).await?;
        rx.await
            .map_err(|_| ShakeError::ServiceUnavailable("оркестратор не ответил".to_string()))
    }

    /// Частичное обновление параметров жеста, действует сразу
    pub async fn update_shake_config(&self, patch: ShakeConfigPatch) -> Result<ShakeConfig> {
        self.request(|tx| Command::UpdateShakeConfig(patch, tx)).await?
    }

    pub async fn update_polling(&self, active_ms: Option<u64>, idle_ms: Option<u64>) -> Result<()> {
        self.send(Command::UpdatePolling { active_ms, idle_ms }).await
    }

    pub async fn acknowledge_trigger(&self, generation: u64) -> Result<()> {
        self.send(Command::AcknowledgeTrigger(generation)).await
    }

    pub async fn metrics(&self) -> Result<MetricsSnapshot> {
        self.request(Command::Metrics).await
    }

    pub async fn status(&self) -> Result<FeatureStatus> {
        self.request(Command::Status).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }
}

pub struct Orchestrator {
    config: Arc<Config>,
    capture: Box<dyn CaptureSource>,
    receiver: BridgeReceiver,
    drag: DragStateMonitor,
    detector: GestureDetector,
    lock: Arc<TriggerLock>,
    collaborator: Arc<dyn ShelfCollaborator>,
    stats: Arc<PipelineStats>,
    health: HealthTracker,
    state: PipelineState,
    status: FeatureStatus,
    recovery: Recovery,
    faults: mpsc::UnboundedReceiver<CaptureFault>,
    commands: mpsc::Receiver<Command>,
    reported_anomalies: u64,
    reported_drag_failures: u64,
    /// Интервалы опроса изменились, следующий опрос - немедленно
    poll_rescheduled: bool,
}

impl Orchestrator {
    /// Собрать конвейер с реальными (или dry-run) источниками
    pub fn new(
        config: Arc<Config>,
        collaborator: Arc<dyn ShelfCollaborator>,
        dry_run: bool,
    ) -> Result<(Self, OrchestratorHandle)> {
        let (publisher, receiver) = EventBridge::new(config.bridge.pool_size);
        let stats = Arc::new(PipelineStats::new());
        let (fault_tx, fault_rx) = mpsc::unbounded_channel();

        let capture = create_capture_source(config.clone(), publisher, stats.clone(), fault_tx, dry_run);
        let probe = create_drag_probe(&config.drag, dry_run);

        Self::from_parts(config, capture, receiver, probe, collaborator, stats, fault_rx)
    }

    pub fn from_parts(
        config: Arc<Config>,
        capture: Box<dyn CaptureSource>,
        receiver: BridgeReceiver,
        probe: Box<dyn DragProbe>,
        collaborator: Arc<dyn ShelfCollaborator>,
        stats: Arc<PipelineStats>,
        faults: mpsc::UnboundedReceiver<CaptureFault>,
    ) -> Result<(Self, OrchestratorHandle)> {
        info!("Инициализация оркестратора (захват: {})", capture.name());

        let detector = GestureDetector::new(config.shake.resolve())?;
        let drag = DragStateMonitor::new(probe, config.drag.clone());
        let (tx, commands) = mpsc::channel(32);

        let health = HealthTracker::new();
        health.register(Component::Capture, false);
        health.register(Component::Bridge, false);
        health.register(Component::DragMonitor, true);
        health.register(Component::Gesture, false);
        health.register(Component::Orchestrator, false);

        let orchestrator = Self {
            config,
            capture,
            receiver,
            drag,
            detector,
            lock: TriggerLock::new(),
            collaborator,
            stats,
            health,
            state: PipelineState::Idle,
            status: FeatureStatus::Starting,
            recovery: Recovery::default(),
            faults,
            commands,
            reported_anomalies: 0,
            reported_drag_failures: 0,
            poll_rescheduled: false,
        };

        Ok((orchestrator, OrchestratorHandle { tx }))
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn status(&self) -> &FeatureStatus {
        &self.status
    }

    pub fn trigger_lock(&self) -> Arc<TriggerLock> {
        self.lock.clone()
    }

    pub fn restart_scheduled_at(&self) -> Option<u64> {
        self.recovery.restart_at_ms
    }

    pub fn metrics(&self, now_ms: u64) -> MetricsSnapshot {
        MetricsSnapshot::collect(
            self.receiver.stats(),
            &self.stats,
            self.status.clone(),
            self.health.overall(now_ms),
        )
    }

    /// Запуск монитора и захвата. Недоступный захват не роняет приложение.
    pub fn start(&mut self, now_ms: u64) {
        self.drag.start();
        self.set_status(FeatureStatus::Starting);

        match self.capture.start() {
            Ok(()) => {
                info!("Захват мыши запущен ({})", self.capture.name());
                self.set_status(FeatureStatus::Active);
            }
            Err(e) => {
                error!("Не удалось запустить захват: {} (код {}: {})", e, e.code().value(), e.code().message());
                self.on_capture_failure(e, now_ms);
            }
        }
    }

    pub fn shutdown(&mut self) {
        info!("Остановка конвейера drag+shake");
        if let Err(e) = self.capture.stop() {
            warn!("Ошибка остановки захвата: {}", e);
        }
        self.drag.stop();
        self.recovery.restart_at_ms = None;
        self.set_status(FeatureStatus::Stopped);
    }

    /// Забрать пакет из моста и обработать
    pub fn drain(&mut self, now_ms: u64) {
        let batch = self.receiver.drain_batch();
        if !batch.is_empty() {
            debug_if_enabled!("Слив: {} отсчётов", batch.len());
            self.process_batch(&batch, now_ms);
        }
    }

    pub fn process_batch(&mut self, batch: &[PositionSample], now_ms: u64) {
        let count = batch.len() as u64;
        self.health.report_activity(Component::Capture, now_ms, count);
        self.health.report_activity(Component::Bridge, now_ms, count);
        self.drag.observe(batch);

        if self.state == PipelineState::Idle {
            return;
        }

        let shake = self.detector.feed(batch);
        self.health.report_activity(Component::Gesture, now_ms, count);
        let anomalies = self.detector.clock_anomalies();
        self.stats
            .add_clock_anomalies(anomalies - self.reported_anomalies);
        self.reported_anomalies = anomalies;

        if let Some(shake) = shake {
            let position = batch.last().map_or(shake.position, |s| s.position());
            self.handle_shake(shake, position, now_ms);
        }
    }

    /// Один тик опроса перетаскивания
    pub async fn poll_drag(&mut self, now_ms: u64) {
        let signal = self.drag.poll(now_ms).await;
        self.health.report_activity(Component::DragMonitor, now_ms, 1);

        let failures = self.drag.total_failures();
        for _ in self.reported_drag_failures..failures {
            self.stats.record_drag_read_failure();
        }
        self.reported_drag_failures = failures;

        if let Some(signal) = signal {
            self.handle_drag_signal(signal);
        }
        self.check_trigger(now_ms);
    }

    pub fn handle_drag_signal(&mut self, signal: DragSignal) {
        match signal {
            DragSignal::Start(snapshot) => {
                debug!("DragStart: {}", snapshot);
                if self.state == PipelineState::Idle {
                    self.state = PipelineState::DragActive;
                    self.detector.reset();
                }
            }
            DragSignal::End => {
                debug!("DragEnd");
                if self.state == PipelineState::DragActive {
                    self.state = PipelineState::Idle;
                }
            }
            DragSignal::Error(e) => {
                self.health.report_error(Component::DragMonitor, e.to_string());
                error!(
                    "Монитор перетаскивания: повторяющиеся ошибки (код {}): {}",
                    e.code().value(),
                    e
                );
                // Опрос продолжается; статус функции не меняется
            }
        }
    }

    /// Встряхивание из детектора. `true` - коллаборатор вызван.
    pub fn handle_shake(&mut self, shake: ShakeEvent, position: Vector2D, now_ms: u64) -> bool {
        self.stats.record_shake();

        match self.state {
            PipelineState::Idle => {
                debug!("Встряхивание без перетаскивания проигнорировано");
                return false;
            }
            PipelineState::Triggering => {
                let total = self.stats.record_trigger_suppressed();
                debug!("Полка уже создаётся, встряхивание подавлено (всего {})", total);
                return false;
            }
            PipelineState::DragActive => {}
        }

        let Some(ack) = self.lock.try_acquire(now_ms) else {
            let total = self.stats.record_trigger_suppressed();
            debug!("Замок триггера занят, встряхивание подавлено (всего {})", total);
            return false;
        };

        self.state = PipelineState::Triggering;
        let trigger = ShelfTrigger {
            items: self.drag.items().to_vec(),
            position,
            timestamp_ms: shake.timestamp_ms,
        };
        info!("Drag+shake: {} (поколение {})", trigger, ack.generation());
        self.stats.record_trigger_fired();
        self.collaborator.on_drag_shake_triggered(trigger, ack);

        // Коллаборатор мог подтвердить синхронно
        self.check_trigger(now_ms);
        true
    }

    /// Выход из `Triggering`: замок освобождён или истёк таймаут подтверждения
    pub fn check_trigger(&mut self, now_ms: u64) {
        if self.state != PipelineState::Triggering {
            return;
        }
        let expired = self
            .lock
            .expire_if_stale(now_ms, self.config.trigger.ack_timeout_ms);
        if expired || !self.lock.is_held() {
            self.state = if self.drag.is_drag_active() {
                PipelineState::DragActive
            } else {
                PipelineState::Idle
            };
            debug!("Триггер завершён, состояние {:?}", self.state);
        }
    }

    /// Сбой работающего захвата
    pub fn handle_fault(&mut self, fault: CaptureFault, now_ms: u64) {
        warn!("Сбой захвата: {} (код {})", fault.error, fault.error.code().value());
        self.health.report_error(Component::Capture, fault.error.to_string());
        if let Err(e) = self.capture.stop() {
            warn!("Ошибка остановки захвата: {}", e);
        }

        if self.recovery.disabled {
            return;
        }

        // Сбой вскоре после перезапуска продолжает серию неудач
        let after_restart = self.recovery.last_restart_ms.map_or(false, |t| {
            now_ms.saturating_sub(t) < self.config.recovery.stability_window_ms
        });
        if !after_restart {
            self.recovery.consecutive_failures = 0;
        }
        self.on_capture_failure(fault.error, now_ms);
    }

    /// Плановый перезапуск захвата
    pub fn restart_capture(&mut self, now_ms: u64) {
        self.recovery.restart_at_ms = None;
        if self.recovery.disabled {
            return;
        }

        info!("Перезапуск захвата, попытка {}", self.recovery.consecutive_failures);
        self.stats.record_capture_restart();

        if let Err(e) = self.capture.stop() {
            warn!("Ошибка остановки захвата: {}", e);
        }
        match self.capture.start() {
            Ok(()) => {
                info!("Захват перезапущен");
                self.recovery.last_restart_ms = Some(now_ms);
                self.health.force_status(Component::Capture, None);
                self.set_status(FeatureStatus::Active);
            }
            Err(e) => {
                warn!("Перезапуск не удался: {}", e);
                self.on_capture_failure(e, now_ms);
            }
        }
    }

    /// Каждый `HookInstallFailed` подряд считается, включая первый запуск
    fn on_capture_failure(&mut self, error: CaptureError, now_ms: u64) {
        match error {
            CaptureError::PermissionDenied(msg) => {
                warn!("Нет прав на устройства ввода, drag+shake отключён: {}", msg);
                for cmd in crate::utils::permissions::get_setup_commands() {
                    if !cmd.is_empty() {
                        info!("   {}", cmd);
                    }
                }
                self.disable(FeatureStatus::PermissionRequired);
            }
            CaptureError::Unsupported(reason) => {
                warn!("Захват мыши недоступен: {}", reason);
                self.disable(FeatureStatus::Unavailable { reason });
            }
            CaptureError::HookInstallFailed(msg) => {
                self.recovery.consecutive_failures += 1;
                let failures = self.recovery.consecutive_failures;
                let max = self.config.recovery.max_restart_attempts;

                if failures >= max {
                    error!("Захват не установлен {} раз подряд, перезапуски прекращены", failures);
                    self.disable(FeatureStatus::Unavailable {
                        reason: format!("{} неудачных установок подряд: {}", failures, msg),
                    });
                    return;
                }

                let restart_at = now_ms + self.config.recovery.restart_delay_ms;
                self.recovery.restart_at_ms = Some(restart_at);
                self.health
                    .force_status(Component::Capture, Some(HealthStatus::Degraded));
                self.set_status(FeatureStatus::Recovering { attempt: failures });
                info!("Перезапуск захвата запланирован на {}ms", restart_at);
            }
        }
    }

    fn disable(&mut self, status: FeatureStatus) {
        self.recovery.disabled = true;
        self.recovery.restart_at_ms = None;
        self.state = PipelineState::Idle;
        self.health
            .force_status(Component::Capture, Some(HealthStatus::Critical));
        self.set_status(status);
    }

    fn set_status(&mut self, status: FeatureStatus) {
        if self.status == status {
            return;
        }
        info!("Статус функции: {} → {}", self.status, status);
        self.status = status;
        self.collaborator.on_status_changed(&self.status);
    }

    fn handle_command(&mut self, command: Command, now_ms: u64) {
        match command {
            Command::UpdateShakeConfig(patch, reply) => {
                let result = self
                    .detector
                    .configure(&patch)
                    .map(|_| *self.detector.config());
                if let Err(e) = &result {
                    warn!("Конфигурация жеста отклонена: {}", e);
                }
                let _ = reply.send(result);
            }
            Command::UpdatePolling { active_ms, idle_ms } => {
                self.drag.update_polling(active_ms, idle_ms);
                self.poll_rescheduled = true;
            }
            Command::AcknowledgeTrigger(generation) => {
                self.lock.release(generation);
                self.check_trigger(now_ms);
            }
            Command::Metrics(reply) => {
                let _ = reply.send(self.metrics(now_ms));
            }
            Command::Status(reply) => {
                let _ = reply.send(self.status.clone());
            }
            Command::Shutdown => {}
        }
    }

    /// Основной цикл: мост, опрос перетаскивания, команды, сбои, перезапуски
    pub async fn run(mut self) -> Result<()> {
        // Миллисекунды цикла идут по часам tokio, привязанным к часам конвейера
        let anchor = Instant::now();
        let anchor_ms = clock::now_ms();
        let now_ms = move || anchor_ms + anchor.elapsed().as_millis() as u64;
        let deadline = move |at_ms: u64| anchor + Duration::from_millis(at_ms.saturating_sub(anchor_ms));

        self.start(now_ms());

        let drain_interval = self.config.bridge.drain_interval();
        let mut last_drain = Instant::now();
        let mut drain_at: Option<Instant> = None;
        let mut next_poll = Instant::now();

        loop {
            if drain_at.is_none() && self.receiver.pending() > 0 {
                drain_at = Some((last_drain + drain_interval).max(Instant::now()));
            }
            let restart_at = self.recovery.restart_at_ms.map(deadline);
            let trigger_deadline = if self.state == PipelineState::Triggering {
                self.lock
                    .deadline_ms(self.config.trigger.ack_timeout_ms)
                    .map(deadline)
            } else {
                None
            };

            tokio::select! {
                _ = self.receiver.notified(), if drain_at.is_none() => {
                    // Не чаще одного слива за интервал
                    drain_at = Some((last_drain + drain_interval).max(Instant::now()));
                }
                _ = sleep_until(drain_at.unwrap_or_else(Instant::now)), if drain_at.is_some() => {
                    drain_at = None;
                    last_drain = Instant::now();
                    self.drain(now_ms());
                }
                _ = sleep_until(next_poll) => {
                    let now = now_ms();
                    self.poll_drag(now).await;
                    next_poll = Instant::now() + self.drag.next_interval(now);
                }
                Some(fault) = self.faults.recv() => {
                    self.handle_fault(fault, now_ms());
                }
                _ = sleep_until(restart_at.unwrap_or_else(Instant::now)), if restart_at.is_some() => {
                    self.restart_capture(now_ms());
                }
                _ = sleep_until(trigger_deadline.unwrap_or_else(Instant::now)), if trigger_deadline.is_some() => {
                    self.check_trigger(now_ms());
                }
                command = self.commands.recv() => {
                    match command {
                        Some(Command::Shutdown) | None => break,
                        Some(command) => self.handle_command(command, now_ms()),
                    }
                    if std::mem::take(&mut self.poll_rescheduled) {
                        next_poll = Instant::now();
                    }
                }
            }
        }

        self.shutdown();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DragReadError;
    use crate::events::DragItem;
    use crate::services::bridge::BridgePublisher;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Захват со скриптованными результатами `start`
    struct FakeCapture {
        results: Arc<Mutex<VecDeque<std::result::Result<(), CaptureError>>>>,
        starts: Arc<AtomicU32>,
        running: bool,
    }

    impl CaptureSource for FakeCapture {
        fn start(&mut self) -> std::result::Result<(), CaptureError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            let result = self.results.lock().pop_front().unwrap_or(Ok(()));
            self.running = result.is_ok();
            result
        }

        fn stop(&mut self) -> std::result::Result<(), CaptureError> {
            self.running = false;
            Ok(())
        }

        fn is_running(&self) -> bool {
            self.running
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }

    /// Перетаскивание, управляемое флагом из теста
    struct FlagProbe {
        active: Arc<Mutex<bool>>,
        /// Сколько ближайших опросов завершится ошибкой чтения
        failures: Arc<AtomicU32>,
        polls: Arc<AtomicU32>,
    }

    #[async_trait::async_trait]
    impl DragProbe for FlagProbe {
        fn observe(&mut self, _samples: &[PositionSample]) {}

        fn is_drag_active(&mut self, _now_ms: u64) -> std::result::Result<bool, DragReadError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(DragReadError::PollReadFailed("xclip: нет ответа".into()));
            }
            Ok(*self.active.lock())
        }

        async fn read_items(&mut self) -> std::result::Result<Vec<DragItem>, DragReadError> {
            Ok(vec![DragItem::from_path("/tmp/shelf-item.txt")])
        }
    }

    #[derive(Default)]
    struct RecordingShelf {
        auto_ack: bool,
        triggers: Mutex<Vec<ShelfTrigger>>,
        acks: Mutex<Vec<TriggerAck>>,
        statuses: Mutex<Vec<FeatureStatus>>,
    }

    impl ShelfCollaborator for RecordingShelf {
        fn on_drag_shake_triggered(&self, trigger: ShelfTrigger, ack: TriggerAck) {
            self.triggers.lock().push(trigger);
            if self.auto_ack {
                ack.complete();
            } else {
                self.acks.lock().push(ack);
            }
        }

        fn on_status_changed(&self, status: &FeatureStatus) {
            self.statuses.lock().push(status.clone());
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        handle: OrchestratorHandle,
        publisher: BridgePublisher,
        shelf: Arc<RecordingShelf>,
        drag_active: Arc<Mutex<bool>>,
        probe_failures: Arc<AtomicU32>,
        polls: Arc<AtomicU32>,
        capture_results: Arc<Mutex<VecDeque<std::result::Result<(), CaptureError>>>>,
        starts: Arc<AtomicU32>,
    }

    fn harness(auto_ack: bool) -> Harness {
        let mut config = Config::default();
        config.shake.overrides = ShakeConfigPatch {
            min_distance_px: Some(50),
            ..Default::default()
        };
        let config = Arc::new(config);

        let (publisher, receiver) = EventBridge::new(config.bridge.pool_size);
        let capture_results = Arc::new(Mutex::new(VecDeque::new()));
        let starts = Arc::new(AtomicU32::new(0));
        let capture = FakeCapture {
            results: capture_results.clone(),
            starts: starts.clone(),
            running: false,
        };
        let drag_active = Arc::new(Mutex::new(false));
        let probe_failures = Arc::new(AtomicU32::new(0));
        let polls = Arc::new(AtomicU32::new(0));
        let probe = FlagProbe {
            active: drag_active.clone(),
            failures: probe_failures.clone(),
            polls: polls.clone(),
        };
        let shelf = Arc::new(RecordingShelf {
            auto_ack,
            ..Default::default()
        });
        let (_fault_tx, fault_rx) = mpsc::unbounded_channel();

        let (orchestrator, handle) = Orchestrator::from_parts(
            config,
            Box::new(capture),
            receiver,
            Box::new(probe),
            shelf.clone(),
            Arc::new(PipelineStats::new()),
            fault_rx,
        )
        .unwrap();

        Harness {
            orchestrator,
            handle,
            publisher,
            shelf,
            drag_active,
            probe_failures,
            polls,
            capture_results,
            starts,
        }
    }

    fn shake_at(ts: u64) -> ShakeEvent {
        ShakeEvent {
            timestamp_ms: ts,
            position: Vector2D::new(500, 400),
            direction_changes: 4,
            distance_px: 300.0,
            average_velocity: 1_500.0,
        }
    }

    fn hook_failed() -> CaptureError {
        CaptureError::HookInstallFailed("устройство отключено".into())
    }

    async fn begin_drag(h: &mut Harness, now_ms: u64) {
        *h.drag_active.lock() = true;
        h.orchestrator.poll_drag(now_ms).await;
        assert_eq!(h.orchestrator.state(), PipelineState::DragActive);
    }

    #[tokio::test]
    async fn test_shake_during_drag_triggers_shelf_with_items() {
        let mut h = harness(true);
        h.orchestrator.start(0);
        begin_drag(&mut h, 10).await;

        let xs = [100, 140, 180, 140, 100, 140, 180, 140, 100];
        for (i, x) in xs.iter().enumerate() {
            h.publisher
                .publish(PositionSample::new(*x, 300, 1_000 + i as u64 * 18, true));
        }
        h.orchestrator.drain(1_200);

        let triggers = h.shelf.triggers.lock();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].items.len(), 1);
        // Позиция - последний отсчёт пакета
        assert_eq!(triggers[0].position, Vector2D::new(100, 300));
        drop(triggers);

        assert_eq!(h.orchestrator.state(), PipelineState::DragActive);
        assert!(!h.orchestrator.trigger_lock().is_held());
        assert_eq!(h.orchestrator.metrics(1_200).triggers_fired, 1);
    }

    #[tokio::test]
    async fn test_drag_read_errors_keep_feature_active_and_polling() {
        let mut h = harness(true);
        h.orchestrator.start(0);
        h.probe_failures.store(3, Ordering::SeqCst);

        for now in [100, 200, 300] {
            h.orchestrator.poll_drag(now).await;
        }

        let metrics = h.orchestrator.metrics(300);
        assert_eq!(metrics.drag_read_failures, 3);
        assert_eq!(metrics.status, FeatureStatus::Active);
        assert_eq!(h.orchestrator.status(), &FeatureStatus::Active);

        let report = h.orchestrator.health.report(300);
        let (_, status, module) = report
            .iter()
            .find(|(component, _, _)| *component == Component::DragMonitor)
            .unwrap();
        assert_eq!(module.errors, 1);
        assert!(module.last_error.is_some());
        assert!(*status > HealthStatus::Healthy);

        // Опрос продолжается и видит следующее перетаскивание
        begin_drag(&mut h, 400).await;
        assert_eq!(h.polls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_shake_without_drag_is_ignored() {
        let mut h = harness(true);
        h.orchestrator.start(0);
        assert!(!h.orchestrator.handle_shake(shake_at(100), Vector2D::new(1, 1), 100));
        assert!(h.shelf.triggers.lock().is_empty());
    }

    #[tokio::test]
    async fn test_second_shake_suppressed_while_lock_held() {
        let mut h = harness(false);
        h.orchestrator.start(0);
        begin_drag(&mut h, 10).await;

        assert!(h.orchestrator.handle_shake(shake_at(100), Vector2D::new(1, 1), 100));
        assert!(!h.orchestrator.handle_shake(shake_at(100), Vector2D::new(1, 1), 100));

        assert_eq!(h.shelf.triggers.lock().len(), 1);
        let metrics = h.orchestrator.metrics(100);
        assert_eq!(metrics.triggers_fired, 1);
        assert_eq!(metrics.triggers_suppressed, 1);
        assert_eq!(h.orchestrator.state(), PipelineState::Triggering);
    }

    #[tokio::test]
    async fn test_contention_on_externally_held_lock() {
        let mut h = harness(true);
        h.orchestrator.start(0);
        begin_drag(&mut h, 10).await;

        let _foreign = h.orchestrator.trigger_lock().try_acquire(50).unwrap();
        assert!(!h.orchestrator.handle_shake(shake_at(100), Vector2D::new(1, 1), 100));
        assert_eq!(h.orchestrator.metrics(100).triggers_suppressed, 1);
        assert_eq!(h.orchestrator.state(), PipelineState::DragActive);
    }

    #[tokio::test]
    async fn test_ack_timeout_releases_trigger() {
        let mut h = harness(false);
        h.orchestrator.start(0);
        begin_drag(&mut h, 10).await;

        assert!(h.orchestrator.handle_shake(shake_at(100), Vector2D::new(1, 1), 100));
        h.orchestrator.check_trigger(4_000);
        assert_eq!(h.orchestrator.state(), PipelineState::Triggering);

        h.orchestrator.check_trigger(5_100);
        assert_eq!(h.orchestrator.state(), PipelineState::DragActive);
        assert!(!h.orchestrator.trigger_lock().is_held());

        // Опоздавшее подтверждение ничего не ломает
        let late = h.shelf.acks.lock().pop().unwrap();
        assert!(!late.complete());
        assert!(h.orchestrator.handle_shake(shake_at(5_200), Vector2D::new(1, 1), 5_200));
    }

    #[tokio::test]
    async fn test_trigger_ends_in_idle_when_drag_finished() {
        let mut h = harness(false);
        h.orchestrator.start(0);
        begin_drag(&mut h, 10).await;
        assert!(h.orchestrator.handle_shake(shake_at(100), Vector2D::new(1, 1), 100));

        *h.drag_active.lock() = false;
        h.orchestrator.poll_drag(120).await;
        assert_eq!(h.orchestrator.state(), PipelineState::Triggering);

        h.shelf.acks.lock().pop().unwrap().complete();
        h.orchestrator.check_trigger(130);
        assert_eq!(h.orchestrator.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn test_three_failed_restarts_disable_feature() {
        let mut h = harness(true);
        h.orchestrator.start(0);
        assert_eq!(h.orchestrator.status(), &FeatureStatus::Active);

        h.capture_results
            .lock()
            .extend([Err(hook_failed()), Err(hook_failed())]);

        h.orchestrator.handle_fault(
            CaptureFault {
                error: hook_failed(),
                timestamp_ms: 10_000,
            },
            10_000,
        );
        assert_eq!(h.orchestrator.restart_scheduled_at(), Some(10_500));

        let mut now = 10_500;
        while let Some(at) = h.orchestrator.restart_scheduled_at() {
            assert_eq!(at, now);
            h.orchestrator.restart_capture(now);
            now += 500;
        }

        assert!(matches!(
            h.orchestrator.status(),
            FeatureStatus::Unavailable { .. }
        ));
        // Сбой и два неудачных перезапуска - три подряд
        assert_eq!(h.starts.load(Ordering::SeqCst), 3);

        h.orchestrator.handle_fault(
            CaptureFault {
                error: hook_failed(),
                timestamp_ms: 20_000,
            },
            20_000,
        );
        assert_eq!(h.orchestrator.restart_scheduled_at(), None);
        assert_eq!(h.orchestrator.metrics(20_000).health, HealthStatus::Critical);
    }

    #[tokio::test]
    async fn test_fault_soon_after_restart_counts_as_failed_restart() {
        let mut h = harness(true);
        h.orchestrator.start(0);

        let fault = |ts| CaptureFault {
            error: hook_failed(),
            timestamp_ms: ts,
        };

        h.orchestrator.handle_fault(fault(10_000), 10_000);
        h.orchestrator.restart_capture(10_500);
        assert_eq!(h.orchestrator.status(), &FeatureStatus::Active);

        h.orchestrator.handle_fault(fault(11_000), 11_000);
        assert_eq!(
            h.orchestrator.status(),
            &FeatureStatus::Recovering { attempt: 2 }
        );

        // Долгая стабильная работа обнуляет счётчик
        h.orchestrator.restart_capture(11_500);
        h.orchestrator.handle_fault(fault(60_000), 60_000);
        assert_eq!(
            h.orchestrator.status(),
            &FeatureStatus::Recovering { attempt: 1 }
        );
    }

    #[tokio::test]
    async fn test_permission_denied_degrades_without_retry() {
        let mut h = harness(true);
        h.capture_results
            .lock()
            .push_back(Err(CaptureError::PermissionDenied("/dev/input".into())));

        h.orchestrator.start(0);

        assert_eq!(h.orchestrator.status(), &FeatureStatus::PermissionRequired);
        assert_eq!(h.orchestrator.restart_scheduled_at(), None);
        assert!(h
            .shelf
            .statuses
            .lock()
            .contains(&FeatureStatus::PermissionRequired));
    }

    #[tokio::test]
    async fn test_initial_hook_failure_schedules_restart() {
        let mut h = harness(true);
        h.capture_results.lock().push_back(Err(hook_failed()));

        h.orchestrator.start(0);
        assert_eq!(
            h.orchestrator.status(),
            &FeatureStatus::Recovering { attempt: 1 }
        );
        h.orchestrator.restart_capture(500);
        assert_eq!(h.orchestrator.status(), &FeatureStatus::Active);
    }

    #[tokio::test]
    async fn test_three_hook_failures_from_start_disable_feature() {
        let mut h = harness(true);
        h.capture_results
            .lock()
            .extend([Err(hook_failed()), Err(hook_failed()), Err(hook_failed())]);

        h.orchestrator.start(0);
        assert_eq!(h.orchestrator.status(), &FeatureStatus::Recovering { attempt: 1 });
        h.orchestrator.restart_capture(500);
        assert_eq!(h.orchestrator.status(), &FeatureStatus::Recovering { attempt: 2 });
        h.orchestrator.restart_capture(1_000);

        assert!(matches!(
            h.orchestrator.status(),
            FeatureStatus::Unavailable { .. }
        ));
        assert_eq!(h.starts.load(Ordering::SeqCst), 3);
        assert_eq!(h.orchestrator.restart_scheduled_at(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_backs_off_and_gives_up() {
        let h = harness(true);
        h.capture_results
            .lock()
            .extend([Err(hook_failed()), Err(hook_failed()), Err(hook_failed())]);
        let handle = h.handle.clone();
        let task = tokio::spawn(h.orchestrator.run());

        let mut status = handle.status().await.unwrap();
        for _ in 0..50 {
            if matches!(status, FeatureStatus::Unavailable { .. }) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            status = handle.status().await.unwrap();
        }

        assert!(matches!(status, FeatureStatus::Unavailable { .. }));
        assert_eq!(h.starts.load(Ordering::SeqCst), 3);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.starts.load(Ordering::SeqCst), 3);
        assert_eq!(handle.metrics().await.unwrap().capture_restarts, 2);

        handle.shutdown().await.unwrap();
        task.await.unwrap().unwrap();
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_run_future_is_send() {
        let h = harness(true);
        let run = h.orchestrator.run();
        assert_send(&run);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_update_takes_effect_immediately() {
        let h = harness(true);
        let handle = h.handle.clone();
        let task = tokio::spawn(h.orchestrator.run());

        assert_eq!(handle.status().await.unwrap(), FeatureStatus::Active);
        tokio::time::sleep(Duration::from_millis(1)).await;
        // Первый опрос сразу, следующий по простому интервалу через 100ms
        assert_eq!(h.polls.load(Ordering::SeqCst), 1);

        handle.update_polling(Some(5), Some(20)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(h.polls.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(h.polls.load(Ordering::SeqCst) >= 3);

        handle.shutdown().await.unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_handle_commands_over_run_loop() {
        let h = harness(true);
        let handle = h.handle.clone();
        let task = tokio::spawn(h.orchestrator.run());

        let status = handle.status().await.unwrap();
        assert_eq!(status, FeatureStatus::Active);

        let updated = handle
            .update_shake_config(ShakeConfigPatch {
                debounce_ms: Some(300),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.debounce_ms, 300);
        assert_eq!(updated.min_direction_changes, 3);

        let rejected = handle
            .update_shake_config(ShakeConfigPatch {
                time_window_ms: Some(0),
                ..Default::default()
            })
            .await;
        assert!(matches!(rejected, Err(ShakeError::InvalidConfig(_))));

        handle.update_polling(Some(5), Some(50)).await.unwrap();
        let metrics = handle.metrics().await.unwrap();
        assert_eq!(metrics.events_dropped, 0);

        handle.shutdown().await.unwrap();
        task.await.unwrap().unwrap();
        assert!(handle.status().await.is_err());
    }
}
