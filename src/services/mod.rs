pub mod bridge;
pub mod capture;
pub mod drag_monitor;
pub mod gesture_detector;
pub mod health;
pub mod metrics;
pub mod orchestrator;
pub mod trigger_lock;

pub use bridge::{BridgePublisher, BridgeReceiver, EventBridge};
pub use capture::create_capture_source;
pub use drag_monitor::{create_drag_probe, DragStateMonitor};
pub use gesture_detector::GestureDetector;
pub use health::{HealthStatus, HealthTracker};
pub use metrics::{MetricsSnapshot, PipelineStats};
pub use orchestrator::{LoggingShelf, Orchestrator, OrchestratorHandle, ShelfCollaborator};
pub use trigger_lock::{TriggerAck, TriggerLock};
