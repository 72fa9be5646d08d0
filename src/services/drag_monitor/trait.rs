use crate::config::DragConfig;
use crate::error::DragReadError;
use crate::events::{DragItem, PositionSample};
use tracing::info;

/// Источник содержимого перетаскивания (XDND выделение, буфер Wayland)
#[async_trait::async_trait]
pub trait PayloadReader: Send + Sync {
    async fn read_items(&self) -> Result<Vec<DragItem>, DragReadError>;

    fn name(&self) -> &'static str;
}

/// Определяет, идёт ли перетаскивание, и читает его содержимое
#[async_trait::async_trait]
pub trait DragProbe: Send {
    /// Отсчёты указателя из моста, в порядке поступления
    fn observe(&mut self, samples: &[PositionSample]);

    fn is_drag_active(&mut self, now_ms: u64) -> Result<bool, DragReadError>;

    async fn read_items(&mut self) -> Result<Vec<DragItem>, DragReadError>;
}

/// Factory function to create an appropriate drag probe based on the dry_run flag
pub fn create_drag_probe(config: &DragConfig, dry_run: bool) -> Box<dyn DragProbe> {
    let reader: Box<dyn PayloadReader> = if dry_run {
        Box::new(super::dry_run::DryRunPayloadReader::new())
    } else {
        super::selection_reader::select_reader(&config.backend)
    };
    info!("Источник содержимого перетаскивания: {}", reader.name());
    Box::new(super::pointer_probe::PointerDragProbe::new(reader))
}
