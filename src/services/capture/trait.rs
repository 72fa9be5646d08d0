use crate::config::Config;
use crate::error::CaptureError;
use crate::services::bridge::BridgePublisher;
use crate::services::metrics::PipelineStats;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::hook::HookContext;

/// Сбой потока захвата после успешного старта (например, мышь отключена)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureFault {
    pub error: CaptureError,
    pub timestamp_ms: u64,
}

pub type FaultSender = mpsc::UnboundedSender<CaptureFault>;

/// Источник событий указателя на выделенном потоке
pub trait CaptureSource: Send {
    /// `PermissionDenied` - нет прав на устройства, `HookInstallFailed` - прочие отказы ОС
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Идемпотентна и безопасна без предшествующего `start`
    fn stop(&mut self) -> Result<(), CaptureError>;

    fn is_running(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// Factory function to create an appropriate capture source based on the dry_run flag
pub fn create_capture_source(
    config: Arc<Config>,
    publisher: BridgePublisher,
    stats: Arc<PipelineStats>,
    faults: FaultSender,
    dry_run: bool,
) -> Box<dyn CaptureSource> {
    let context = HookContext::new(&config.capture, publisher, stats);
    if dry_run {
        Box::new(super::dry_pointer_capture::DryRunPointerCapture::new(context))
    } else {
        Box::new(super::pointer_capture::RealPointerCapture::new(config, context, faults))
    }
}
