mod capture_thread;
mod dry_pointer_capture;
mod filter;
mod hook;
mod pointer_capture;
mod pointer_state;
mod r#trait;

pub use self::capture_thread::CaptureThread;
pub use self::dry_pointer_capture::DryRunPointerCapture;
pub use self::hook::HookContext;
pub use self::r#trait::{create_capture_source, CaptureFault, CaptureSource, FaultSender};
