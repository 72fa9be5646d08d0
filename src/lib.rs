//! Drag+shake: жест встряхивания курсора во время перетаскивания файлов
//! открывает полку с перетаскиваемыми файлами.
//!
//! Конвейер: поток захвата (evdev) → мост событий → детектор жеста и
//! монитор перетаскивания → оркестратор → коллаборатор полок.

pub mod config;
pub mod error;
pub mod events;
pub mod mappings;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{Result, ShakeError};
