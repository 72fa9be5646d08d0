pub mod evdev_to_pointer_input;

pub use evdev_to_pointer_input::EvdevToPointerInput;
