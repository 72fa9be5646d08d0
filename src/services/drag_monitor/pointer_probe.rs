use crate::error::DragReadError;
use crate::events::{DragItem, PositionSample};

use super::pointer_heuristic::DragHeuristic;
use super::r#trait::{DragProbe, PayloadReader};

/// Перетаскивание по эвристике указателя, содержимое - из выделения
pub struct PointerDragProbe {
    heuristic: DragHeuristic,
    reader: Box<dyn PayloadReader>,
}

impl PointerDragProbe {
    pub fn new(reader: Box<dyn PayloadReader>) -> Self {
        Self {
            heuristic: DragHeuristic::new(),
            reader,
        }
    }
}

#[async_trait::async_trait]
impl DragProbe for PointerDragProbe {
    fn observe(&mut self, samples: &[PositionSample]) {
        for sample in samples {
            self.heuristic.observe(sample);
        }
    }

    fn is_drag_active(&mut self, now_ms: u64) -> Result<bool, DragReadError> {
        Ok(self.heuristic.is_active(now_ms))
    }

    async fn read_items(&mut self) -> Result<Vec<DragItem>, DragReadError> {
        self.reader.read_items().await
    }
}
