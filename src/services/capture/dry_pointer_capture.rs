use crate::error::CaptureError;
use crate::events::PointerInput;
use crate::utils::clock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use super::capture_thread::CaptureThread;
use super::hook::HookContext;
use super::r#trait::CaptureSource;

const THREAD_NAME: &str = "drag-shake-dry-capture";
const FRAME: Duration = Duration::from_millis(8);

/// Один шаг сценария: смещение, состояние кнопки, число кадров
#[derive(Debug, Clone, Copy)]
struct Step {
    dx: i32,
    dy: i32,
    button: Option<bool>,
    frames: u32,
}

const fn step(dx: i32, dy: i32, button: Option<bool>, frames: u32) -> Step {
    Step { dx, dy, button, frames }
}

/// Перетаскивание вправо, встряхивание, отпускание, пауза
fn scenario() -> Vec<Step> {
    let mut steps = vec![
        step(0, 0, Some(true), 1),
        step(10, 2, None, 30),
        step(0, 0, None, 20),
    ];
    for _ in 0..4 {
        steps.push(step(15, 0, None, 5));
        steps.push(step(-15, 0, None, 5));
    }
    steps.push(step(0, 0, None, 60));
    steps.push(step(0, 0, Some(false), 1));
    steps.push(step(-5, -1, None, 60));
    steps.push(step(0, 0, None, 500));
    steps
}

/// Захват без устройства: проигрывает сценарий перетаскивания со встряхиванием
pub struct DryRunPointerCapture {
    thread: CaptureThread,
}

impl DryRunPointerCapture {
    pub fn new(context: HookContext) -> Self {
        info!("Инициализация DryRunPointerCapture");
        Self {
            thread: CaptureThread::new(THREAD_NAME, context),
        }
    }

    fn play(ctx: &mut HookContext, running: &AtomicBool) {
        info!("Dry-run режим - захват мыши работает в режиме эмуляции");
        let steps = scenario();

        while running.load(Ordering::Acquire) {
            debug!("Dry-run: новый проход сценария");
            for step in &steps {
                if let Some(pressed) = step.button {
                    ctx.handle(PointerInput::LeftButton { pressed });
                }
                for _ in 0..step.frames {
                    if !running.load(Ordering::Acquire) {
                        return;
                    }
                    if step.dx != 0 || step.dy != 0 {
                        ctx.handle(PointerInput::Motion { dx: step.dx, dy: step.dy });
                    }
                    ctx.handle(PointerInput::Sync { timestamp_ms: clock::now_ms() });
                    std::thread::sleep(FRAME);
                }
            }
        }
    }
}

impl CaptureSource for DryRunPointerCapture {
    fn start(&mut self) -> Result<(), CaptureError> {
        self.thread.spawn(Self::play)
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.thread.stop();
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.thread.is_running()
    }

    fn name(&self) -> &'static str {
        "dry-run"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureConfig;
    use crate::services::bridge::EventBridge;
    use crate::services::metrics::PipelineStats;
    use std::sync::Arc;

    #[test]
    fn test_scenario_contains_press_release_and_reversals() {
        let steps = scenario();
        assert_eq!(steps.first().and_then(|s| s.button), Some(true));
        assert!(steps.iter().any(|s| s.button == Some(false)));
        let reversals = steps
            .windows(2)
            .filter(|w| w[0].dx.signum() * w[1].dx.signum() < 0)
            .count();
        assert!(reversals >= 4);
    }

    #[test]
    fn test_dry_capture_publishes_samples() {
        let (publisher, mut receiver) = EventBridge::new(256);
        let ctx = HookContext::new(&CaptureConfig::default(), publisher, Arc::new(PipelineStats::new()));
        let mut capture = DryRunPointerCapture::new(ctx);

        capture.start().unwrap();
        std::thread::sleep(Duration::from_millis(150));
        capture.stop().unwrap();
        capture.stop().unwrap();

        let batch = receiver.drain_batch();
        assert!(!batch.is_empty());
        assert!(batch[0].left_button_down);
    }
}
