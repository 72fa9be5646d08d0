use crate::events::{Axis, PositionSample};

/// Абсолютное положение курсора, восстановленное из событий устройства
#[derive(Debug)]
pub struct PointerState {
    x: i32,
    y: i32,
    width: i32,
    height: i32,
    left_down: bool,
    abs_range_x: Option<(i32, i32)>,
    abs_range_y: Option<(i32, i32)>,
}

impl PointerState {
    /// Курсор стартует в центре экрана: реального положения evdev не сообщает
    pub fn new(width: i32, height: i32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            x: width / 2,
            y: height / 2,
            width,
            height,
            left_down: false,
            abs_range_x: None,
            abs_range_y: None,
        }
    }

    pub fn apply_delta(&mut self, dx: i32, dy: i32) {
        self.x = self.x.saturating_add(dx).clamp(0, self.width - 1);
        self.y = self.y.saturating_add(dy).clamp(0, self.height - 1);
    }

    pub fn set_abs_range(&mut self, axis: Axis, min: i32, max: i32) {
        let range = (max > min).then_some((min, max));
        match axis {
            Axis::X => self.abs_range_x = range,
            Axis::Y => self.abs_range_y = range,
        }
    }

    /// Абсолютное значение оси; при известном диапазоне масштабируется на экран
    pub fn set_absolute(&mut self, axis: Axis, value: i32) {
        let (range, extent) = match axis {
            Axis::X => (self.abs_range_x, self.width),
            Axis::Y => (self.abs_range_y, self.height),
        };

        let pixel = match range {
            Some((min, max)) => {
                // Разность крайних i32 не помещается в i32
                let offset = i64::from(value.clamp(min, max)) - i64::from(min);
                let span = i64::from(max) - i64::from(min);
                (offset as f64 / span as f64 * f64::from(extent - 1)).round() as i32
            }
            None => value,
        }
        .clamp(0, extent - 1);

        match axis {
            Axis::X => self.x = pixel,
            Axis::Y => self.y = pixel,
        }
    }

    pub fn set_left_button(&mut self, pressed: bool) {
        self.left_down = pressed;
    }

    pub fn left_down(&self) -> bool {
        self.left_down
    }

    pub fn sample(&self, timestamp_ms: u64) -> PositionSample {
        PositionSample::new(self.x, self.y, timestamp_ms, self.left_down)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_centered_and_clamps() {
        let mut state = PointerState::new(1920, 1080);
        assert_eq!(state.sample(0).position().x, 960);

        state.apply_delta(-5_000, 5_000);
        let s = state.sample(0);
        assert_eq!((s.x, s.y), (0, 1079));
    }

    #[test]
    fn test_absolute_scaling() {
        let mut state = PointerState::new(1001, 501);
        state.set_abs_range(Axis::X, 0, 4_000);
        state.set_absolute(Axis::X, 2_000);
        state.set_absolute(Axis::Y, 9_999);
        let s = state.sample(0);
        assert_eq!((s.x, s.y), (500, 500));
    }

    #[test]
    fn test_full_i32_abs_range() {
        let mut state = PointerState::new(1920, 1080);
        state.set_abs_range(Axis::X, i32::MIN, i32::MAX);
        state.set_abs_range(Axis::Y, i32::MIN, i32::MAX);

        state.set_absolute(Axis::X, i32::MAX);
        state.set_absolute(Axis::Y, i32::MIN);
        assert_eq!((state.sample(0).x, state.sample(0).y), (1919, 0));

        state.set_absolute(Axis::X, 0);
        assert_eq!(state.sample(0).x, 960);
    }
}
