use crate::error::DragReadError;
use crate::events::DragItem;
use std::path::PathBuf;
use tracing::debug;

use super::r#trait::PayloadReader;

/// Читатель без графической сессии: перетаскивание видно, содержимое - нет
pub struct NullPayloadReader;

#[async_trait::async_trait]
impl PayloadReader for NullPayloadReader {
    async fn read_items(&self) -> Result<Vec<DragItem>, DragReadError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Dry-run: всегда "перетаскиваются" одни и те же файлы
pub struct DryRunPayloadReader {
    paths: Vec<PathBuf>,
}

impl DryRunPayloadReader {
    pub fn new() -> Self {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/tmp"));
        Self {
            paths: vec![
                home.join("Documents/report.pdf"),
                home.join("Pictures/screenshot.png"),
            ],
        }
    }
}

#[async_trait::async_trait]
impl PayloadReader for DryRunPayloadReader {
    async fn read_items(&self) -> Result<Vec<DragItem>, DragReadError> {
        debug!("Dry-run: эмуляция содержимого перетаскивания");
        Ok(self.paths.iter().map(DragItem::from_path).collect())
    }

    fn name(&self) -> &'static str {
        "dry-run"
    }
}
