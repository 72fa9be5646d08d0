use crate::error::DragReadError;
use crate::events::DragItem;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use super::dry_run::NullPayloadReader;
use super::r#trait::PayloadReader;
use super::uri_list::parse_uri_list;

const READ_TIMEOUT: Duration = Duration::from_millis(250);

/// Чтение `text/uri-list` внешней утилитой (xclip, wl-paste)
pub struct CommandReader {
    name: &'static str,
    program: &'static str,
    args: &'static [&'static str],
    /// Фрагменты stderr, означающие "выделение пусто", а не сбой
    empty_markers: &'static [&'static str],
}

impl CommandReader {
    pub fn xclip() -> Self {
        Self {
            name: "xclip",
            program: "xclip",
            args: &["-o", "-selection", "XdndSelection", "-t", "text/uri-list"],
            empty_markers: &["not available", "No selection"],
        }
    }

    pub fn wl_paste() -> Self {
        Self {
            name: "wl-paste",
            program: "wl-paste",
            args: &["--no-newline", "-t", "text/uri-list"],
            empty_markers: &["No selection", "Nothing is copied", "not available"],
        }
    }
}

#[async_trait::async_trait]
impl PayloadReader for CommandReader {
    async fn read_items(&self) -> Result<Vec<DragItem>, DragReadError> {
        debug!("Чтение содержимого перетаскивания через {}", self.program);

        let mut command = Command::new(self.program);
        command.args(self.args).kill_on_drop(true);

        let output = match tokio::time::timeout(READ_TIMEOUT, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                return Err(DragReadError::ToolUnavailable(format!("{} не найден", self.program)));
            }
            Ok(Err(e)) => {
                return Err(DragReadError::PollReadFailed(format!("{}: {}", self.program, e)));
            }
            Err(_) => {
                return Err(DragReadError::PollReadFailed(format!(
                    "{} не ответил за {}ms",
                    self.program,
                    READ_TIMEOUT.as_millis()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if self.empty_markers.iter().any(|m| stderr.contains(m)) {
                debug!("{}: выделение пусто", self.program);
                return Ok(Vec::new());
            }
            return Err(DragReadError::PollReadFailed(format!(
                "{} вернул ошибку: {}",
                self.program,
                stderr.trim()
            )));
        }

        let items = parse_uri_list(&String::from_utf8_lossy(&output.stdout));
        debug!("{}: {} элементов", self.program, items.len());
        Ok(items)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Пробует читателей по порядку, пропуская отсутствующие утилиты
pub struct ChainReader {
    readers: Vec<Box<dyn PayloadReader>>,
}

impl ChainReader {
    pub fn new(readers: Vec<Box<dyn PayloadReader>>) -> Self {
        Self { readers }
    }
}

#[async_trait::async_trait]
impl PayloadReader for ChainReader {
    async fn read_items(&self) -> Result<Vec<DragItem>, DragReadError> {
        let mut last_error = DragReadError::ToolUnavailable("нет читателей".to_string());
        for reader in &self.readers {
            match reader.read_items().await {
                Err(DragReadError::ToolUnavailable(msg)) => {
                    debug!("{} недоступен: {}", reader.name(), msg);
                    last_error = DragReadError::ToolUnavailable(msg);
                }
                other => return other,
            }
        }
        Err(last_error)
    }

    fn name(&self) -> &'static str {
        "chain"
    }
}

/// Выбор читателя по настройке `drag.backend` и окружению сессии
pub fn select_reader(backend: &str) -> Box<dyn PayloadReader> {
    match backend {
        "xclip" => Box::new(CommandReader::xclip()),
        "wl-paste" => Box::new(CommandReader::wl_paste()),
        "none" => Box::new(NullPayloadReader),
        _ => {
            let wayland = std::env::var_os("WAYLAND_DISPLAY").is_some();
            let x11 = std::env::var_os("DISPLAY").is_some();

            let mut readers: Vec<Box<dyn PayloadReader>> = Vec::new();
            if x11 {
                readers.push(Box::new(CommandReader::xclip()));
            }
            if wayland {
                readers.push(Box::new(CommandReader::wl_paste()));
            }

            if readers.is_empty() {
                warn!("Нет графической сессии (DISPLAY/WAYLAND_DISPLAY) - содержимое перетаскивания читаться не будет");
                Box::new(NullPayloadReader)
            } else {
                Box::new(ChainReader::new(readers))
            }
        }
    }
}
