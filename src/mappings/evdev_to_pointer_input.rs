use crate::events::{Axis, PointerInput};
use crate::utils::clock;
use evdev::{AbsoluteAxisCode, EventType, InputEvent, KeyCode, RelativeAxisCode, SynchronizationCode};
use std::time::SystemTime;

/// Преобразование событий evdev в `PointerInput`
/// Всё, что не относится к положению и левой кнопке, отбрасывается
pub struct EvdevToPointerInput;

impl EvdevToPointerInput {
    pub fn from_event(event: &InputEvent) -> Option<PointerInput> {
        Self::translate(event.event_type(), event.code(), event.value(), event.timestamp())
    }

    pub fn translate(
        event_type: EventType,
        code: u16,
        value: i32,
        time: SystemTime,
    ) -> Option<PointerInput> {
        match event_type {
            EventType::RELATIVE => match code {
                c if c == RelativeAxisCode::REL_X.0 => Some(PointerInput::Motion { dx: value, dy: 0 }),
                c if c == RelativeAxisCode::REL_Y.0 => Some(PointerInput::Motion { dx: 0, dy: value }),
                // Колесо и прочие оси
                _ => None,
            },
            EventType::ABSOLUTE => match code {
                c if c == AbsoluteAxisCode::ABS_X.0 => Some(PointerInput::Absolute { axis: Axis::X, value }),
                c if c == AbsoluteAxisCode::ABS_Y.0 => Some(PointerInput::Absolute { axis: Axis::Y, value }),
                _ => None,
            },
            EventType::KEY if code == KeyCode::BTN_LEFT.code() => match value {
                0 => Some(PointerInput::LeftButton { pressed: false }),
                1 => Some(PointerInput::LeftButton { pressed: true }),
                // Автоповтор кнопки не меняет состояние
                _ => None,
            },
            EventType::SYNCHRONIZATION if code == SynchronizationCode::SYN_REPORT.0 => {
                Some(PointerInput::Sync {
                    timestamp_ms: clock::system_time_to_ms(time),
                })
            }
            _ => None,
        }
    }
}
