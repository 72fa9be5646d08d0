use crate::config::Config;
use crate::error::CaptureError;
use crate::events::{Axis, PointerInput};
use crate::mappings::EvdevToPointerInput;
use crate::utils::clock::{self, KernelClock};
use crate::utils::permissions::{check_event_devices, InputAccess};
use crate::utils::DeviceFinder;
use evdev::{AbsoluteAxisCode, Device};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::capture_thread::CaptureThread;
use super::hook::HookContext;
use super::r#trait::{CaptureFault, CaptureSource, FaultSender};

const THREAD_NAME: &str = "drag-shake-capture";
const IDLE_SLEEP: Duration = Duration::from_millis(2);

/// Захват мыши через evdev. Устройство только читается, без grab:
/// все события доходят до композитора без изменений.
pub struct RealPointerCapture {
    config: Arc<Config>,
    thread: CaptureThread,
    faults: FaultSender,
}

impl RealPointerCapture {
    pub fn new(config: Arc<Config>, context: HookContext, faults: FaultSender) -> Self {
        info!("Инициализация RealPointerCapture");
        Self {
            config,
            thread: CaptureThread::new(THREAD_NAME, context),
            faults,
        }
    }

    fn open_device(&self) -> Result<(PathBuf, Device), CaptureError> {
        let device_path = match DeviceFinder::find_pointer_device(&self.config.capture.device_path) {
            Ok(path) => path,
            Err(e) => {
                // Мышь могла не найтись только потому, что устройства не открываются
                return Err(match check_event_devices(Path::new("/dev/input")) {
                    InputAccess::Denied(msg) => CaptureError::PermissionDenied(msg),
                    _ => CaptureError::from(e),
                });
            }
        };

        let device = Device::open(&device_path).map_err(|e| {
            if e.kind() == ErrorKind::PermissionDenied {
                CaptureError::PermissionDenied(format!("{:?}: {}", device_path, e))
            } else {
                CaptureError::HookInstallFailed(format!(
                    "Не удалось открыть устройство {:?}: {}",
                    device_path, e
                ))
            }
        })?;

        device.set_nonblocking(true).map_err(|e| {
            CaptureError::HookInstallFailed(format!("Неблокирующий режим недоступен: {}", e))
        })?;

        Ok((device_path, device))
    }

    fn abs_ranges(device: &Device) -> Vec<(Axis, i32, i32)> {
        let Ok(infos) = device.get_absinfo() else {
            return Vec::new();
        };
        infos
            .filter_map(|(code, info)| {
                let axis = if code == AbsoluteAxisCode::ABS_X {
                    Axis::X
                } else if code == AbsoluteAxisCode::ABS_Y {
                    Axis::Y
                } else {
                    return None;
                };
                Some((axis, info.minimum(), info.maximum()))
            })
            .collect()
    }

    fn log_device(device: &Device, path: &Path) {
        info!("Мышь: {}", device.name().unwrap_or("Unknown"));
        info!("Путь: {}", path.display());
        info!("Физический путь: {:?}", device.physical_path());
    }

    /// Отметку `SYN_REPORT` из часов ядра - в часы конвейера
    fn restamp(input: PointerInput, kernel_clock: &mut KernelClock, now_ms: u64) -> PointerInput {
        match input {
            PointerInput::Sync { timestamp_ms } => PointerInput::Sync {
                timestamp_ms: kernel_clock.to_pipeline_ms(timestamp_ms, now_ms),
            },
            other => other,
        }
    }

    fn read_loop(mut device: Device, ctx: &mut HookContext, running: &AtomicBool, faults: &FaultSender) {
        let mut kernel_clock = KernelClock::new();

        while running.load(Ordering::Acquire) {
            match device.fetch_events() {
                Ok(events) => {
                    for event in events {
                        if let Some(input) = EvdevToPointerInput::from_event(&event) {
                            ctx.handle(Self::restamp(input, &mut kernel_clock, clock::now_ms()));
                        }
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => std::thread::sleep(IDLE_SLEEP),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("Ошибка чтения событий мыши: {}", e);
                    let fault = CaptureFault {
                        error: CaptureError::HookInstallFailed(format!("чтение устройства: {}", e)),
                        timestamp_ms: clock::now_ms(),
                    };
                    if faults.send(fault).is_err() {
                        warn!("Оркестратор не принимает сбои захвата");
                    }
                    return;
                }
            }
        }
    }
}

impl CaptureSource for RealPointerCapture {
    fn start(&mut self) -> Result<(), CaptureError> {
        if self.thread.is_running() {
            return Ok(());
        }

        let (path, device) = self.open_device()?;
        Self::log_device(&device, &path);

        let ranges = Self::abs_ranges(&device);
        let faults = self.faults.clone();

        self.thread.spawn(move |ctx, running| {
            for (axis, min, max) in ranges {
                ctx.pointer_mut().set_abs_range(axis, min, max);
            }
            Self::read_loop(device, ctx, running, &faults);
        })
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.thread.stop();
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.thread.is_running()
    }

    fn name(&self) -> &'static str {
        "evdev"
    }
}
