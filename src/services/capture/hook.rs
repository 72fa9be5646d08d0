use crate::config::CaptureConfig;
use crate::events::PointerInput;
use crate::services::bridge::BridgePublisher;
use crate::services::metrics::PipelineStats;
use crate::{debug_if_enabled, trace_if_enabled};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

use super::filter::ButtonFilter;
use super::pointer_state::PointerState;

/// Состояние колбэка захвата. Живёт между перезапусками потока,
/// поэтому производитель моста не теряется.
pub struct HookContext {
    publisher: BridgePublisher,
    pointer: PointerState,
    filter: ButtonFilter,
    stats: Arc<PipelineStats>,
    moved: bool,
    button_changed: bool,
    #[cfg(test)]
    panic_next: bool,
}

impl HookContext {
    pub fn new(config: &CaptureConfig, publisher: BridgePublisher, stats: Arc<PipelineStats>) -> Self {
        Self {
            publisher,
            pointer: PointerState::new(config.screen_width, config.screen_height),
            filter: ButtonFilter::new(config.max_events_per_sec),
            stats,
            moved: false,
            button_changed: false,
            #[cfg(test)]
            panic_next: false,
        }
    }

    /// Обработать событие устройства. Паника внутри не выходит за пределы колбэка:
    /// она считается, а событие остаётся у композитора как есть (устройство не захвачено).
    pub fn handle(&mut self, input: PointerInput) {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.process(input)));
        if outcome.is_err() {
            let total = self.stats.record_callback_error();
            error!("Сбой в колбэке захвата на событии {:?} (всего {})", input, total);
            self.moved = false;
            self.button_changed = false;
        }
    }

    pub fn pointer_mut(&mut self) -> &mut PointerState {
        &mut self.pointer
    }

    fn process(&mut self, input: PointerInput) {
        #[cfg(test)]
        if std::mem::take(&mut self.panic_next) {
            panic!("сбой обработки {:?}", input);
        }

        match input {
            PointerInput::Motion { dx, dy } => {
                self.pointer.apply_delta(dx, dy);
                self.moved = true;
            }
            PointerInput::Absolute { axis, value } => {
                self.pointer.set_absolute(axis, value);
                self.moved = true;
            }
            PointerInput::LeftButton { pressed } => {
                if self.pointer.left_down() != pressed {
                    self.pointer.set_left_button(pressed);
                    self.button_changed = true;
                }
            }
            PointerInput::Sync { timestamp_ms } => {
                if !(self.moved || self.button_changed) {
                    return;
                }
                self.moved = false;
                self.button_changed = false;

                let sample = self.pointer.sample(timestamp_ms);
                if !self.filter.should_forward(&sample) {
                    trace_if_enabled!("Отсчёт {} отфильтрован по частоте", sample);
                    return;
                }
                if !self.publisher.publish(sample) {
                    debug_if_enabled!("Мост переполнен, отсчёт {} отброшен", sample);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::bridge::EventBridge;

    fn context() -> (HookContext, crate::services::bridge::BridgeReceiver, Arc<PipelineStats>) {
        let (publisher, receiver) = EventBridge::new(64);
        let stats = Arc::new(PipelineStats::new());
        let config = CaptureConfig::default();
        (HookContext::new(&config, publisher, stats.clone()), receiver, stats)
    }

    #[test]
    fn test_sample_emitted_on_sync_only() {
        let (mut ctx, mut receiver, _) = context();
        ctx.handle(PointerInput::Motion { dx: 10, dy: 0 });
        ctx.handle(PointerInput::Motion { dx: 0, dy: -5 });
        assert_eq!(receiver.pending(), 0);

        ctx.handle(PointerInput::Sync { timestamp_ms: 1_000 });
        let batch = receiver.drain_batch();
        assert_eq!(batch.len(), 1);
        assert_eq!((batch[0].x, batch[0].y), (970, 535));
        assert_eq!(batch[0].timestamp_ms, 1_000);
    }

    #[test]
    fn test_empty_sync_emits_nothing() {
        let (mut ctx, mut receiver, _) = context();
        ctx.handle(PointerInput::Sync { timestamp_ms: 1_000 });
        assert!(receiver.drain_batch().is_empty());
    }

    #[test]
    fn test_button_press_bypasses_rate_limit() {
        let (mut ctx, mut receiver, _) = context();
        ctx.handle(PointerInput::Motion { dx: 1, dy: 0 });
        ctx.handle(PointerInput::Sync { timestamp_ms: 1_000 });
        ctx.handle(PointerInput::LeftButton { pressed: true });
        ctx.handle(PointerInput::Sync { timestamp_ms: 1_001 });
        ctx.handle(PointerInput::Motion { dx: 1, dy: 0 });
        ctx.handle(PointerInput::Sync { timestamp_ms: 1_002 });

        let batch = receiver.drain_batch();
        assert_eq!(batch.len(), 2);
        assert!(batch[1].left_button_down);
    }

    #[test]
    fn test_panic_in_callback_is_counted_and_pipeline_continues() {
        let (mut ctx, mut receiver, stats) = context();
        ctx.handle(PointerInput::Motion { dx: 10, dy: 0 });
        ctx.panic_next = true;
        ctx.handle(PointerInput::Motion { dx: 10, dy: 0 });
        assert_eq!(stats.callback_errors(), 1);

        // Незавершённый пакет сброшен вместе со сбоем
        ctx.handle(PointerInput::Sync { timestamp_ms: 900 });
        assert!(receiver.drain_batch().is_empty());

        ctx.handle(PointerInput::Motion { dx: 0, dy: 5 });
        ctx.handle(PointerInput::Sync { timestamp_ms: 1_000 });
        let batch = receiver.drain_batch();
        assert_eq!(batch.len(), 1);
        assert_eq!((batch[0].x, batch[0].y), (970, 545));
        assert_eq!(stats.callback_errors(), 1);
    }

    #[test]
    fn test_wide_abs_range_does_not_reach_panic_handler() {
        let (mut ctx, mut receiver, stats) = context();
        ctx.pointer_mut().set_abs_range(crate::events::Axis::X, i32::MIN, i32::MAX);
        ctx.handle(PointerInput::Absolute {
            axis: crate::events::Axis::X,
            value: i32::MAX,
        });
        ctx.handle(PointerInput::Sync { timestamp_ms: 1_000 });

        assert_eq!(stats.callback_errors(), 0);
        assert_eq!(receiver.drain_batch()[0].x, 1919);
    }
}
