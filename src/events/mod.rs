pub mod drag;
pub mod pointer;
pub mod trigger;

pub use drag::{DragItem, DragSignal, DragSnapshot};
pub use pointer::{Axis, PointerInput, PositionSample, Vector2D};
pub use trigger::{Component, FeatureStatus, ShakeEvent, ShelfTrigger};
