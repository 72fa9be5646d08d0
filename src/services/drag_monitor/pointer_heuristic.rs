use crate::events::{PositionSample, Vector2D};

const MIN_DRAG_DISTANCE_PX: f64 = 25.0;
const MIN_DRAG_TIME_MS: u64 = 50;
const MIN_MOVE_COUNT: u32 = 5;
const MIN_DISTANCE_FROM_START_PX: f64 = 20.0;

/// Распознаёт перетаскивание по указателю: кнопка удерживается, курсор
/// прошёл достаточно и ушёл от точки нажатия. Признанное перетаскивание
/// держится до отпускания кнопки, даже если курсор вернулся к началу.
#[derive(Debug, Default)]
pub struct DragHeuristic {
    pressed: bool,
    latched: bool,
    start: Vector2D,
    start_ms: u64,
    last: Vector2D,
    total_distance: f64,
    move_count: u32,
}

impl DragHeuristic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, sample: &PositionSample) {
        let position = sample.position();

        match (self.pressed, sample.left_button_down) {
            (false, true) => {
                *self = Self {
                    pressed: true,
                    start: position,
                    start_ms: sample.timestamp_ms,
                    last: position,
                    ..Self::default()
                };
            }
            (true, true) => {
                if position != self.last {
                    self.total_distance += self.last.distance_to(&position);
                    self.move_count += 1;
                    self.last = position;
                }
            }
            (true, false) => *self = Self::default(),
            (false, false) => {}
        }
    }

    pub fn is_active(&mut self, now_ms: u64) -> bool {
        if !self.pressed {
            return false;
        }
        if !self.latched {
            self.latched = self.total_distance >= MIN_DRAG_DISTANCE_PX
                && now_ms.saturating_sub(self.start_ms) >= MIN_DRAG_TIME_MS
                && self.move_count >= MIN_MOVE_COUNT
                && self.start.distance_to(&self.last) >= MIN_DISTANCE_FROM_START_PX;
        }
        self.latched
    }
}
