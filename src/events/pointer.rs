use serde::{Deserialize, Serialize};
use std::fmt;

/// Позиция курсора в пикселях экрана
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vector2D {
    pub x: i32,
    pub y: i32,
}

impl Vector2D {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Vector2D) -> f64 {
        let dx = (other.x - self.x) as f64;
        let dy = (other.y - self.y) as f64;
        dx.hypot(dy)
    }
}

impl fmt::Display for Vector2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Отсчёт положения мыши.
///
/// Создаётся потоком захвата и больше не меняется. `timestamp_ms` - миллисекунды
/// от UNIX-эпохи по монотонным часам (см. `utils::clock`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSample {
    pub x: i32,
    pub y: i32,
    pub timestamp_ms: u64,
    pub left_button_down: bool,
}

impl PositionSample {
    pub fn new(x: i32, y: i32, timestamp_ms: u64, left_button_down: bool) -> Self {
        Self {
            x,
            y,
            timestamp_ms,
            left_button_down,
        }
    }

    pub fn position(&self) -> Vector2D {
        Vector2D::new(self.x, self.y)
    }

    /// Тот же отсчёт с другой отметкой времени (нормализация на границе моста)
    pub fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }
}

impl fmt::Display for PositionSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}ms{}",
            self.position(),
            self.timestamp_ms,
            if self.left_button_down { " [LMB]" } else { "" }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
}

/// Сырое событие указателя, уже переведённое из кодов evdev
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerInput {
    /// Относительное смещение (REL_X / REL_Y)
    Motion { dx: i32, dy: i32 },
    /// Абсолютная координата (ABS_X / ABS_Y) в единицах устройства
    Absolute { axis: Axis, value: i32 },
    /// Смена состояния левой кнопки
    LeftButton { pressed: bool },
    /// Конец пакета событий (SYN_REPORT) с отметкой ядра в миллисекундах
    Sync { timestamp_ms: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_distance() {
        let a = Vector2D::new(0, 0);
        let b = Vector2D::new(3, 4);
        assert_eq!(a.distance_to(&b), 5.0);
    }

    #[test]
    fn test_sample_display() {
        let sample = PositionSample::new(10, 20, 1_000, true);
        assert_eq!(sample.to_string(), "(10, 20)@1000ms [LMB]");
        assert_eq!(sample.with_timestamp(5).timestamp_ms, 5);
    }
}
