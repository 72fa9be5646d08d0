use crate::error::DragReadError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Перетаскиваемый элемент (файл или папка)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DragItem {
    pub path: PathBuf,
    pub name: String,
    pub size_bytes: Option<u64>,
    pub is_directory: bool,
    pub extension: Option<String>,
    pub exists: bool,
}

impl DragItem {
    /// Собрать описание элемента по пути, заглядывая в файловую систему
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        let metadata = std::fs::metadata(&path).ok();
        let exists = metadata.is_some();
        let is_directory = metadata.as_ref().map_or(false, |m| m.is_dir());
        let size_bytes = metadata
            .as_ref()
            .filter(|m| m.is_file())
            .map(|m| m.len());

        let extension = if is_directory {
            None
        } else {
            Path::new(&name)
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
        };

        Self {
            path,
            name,
            size_bytes,
            is_directory,
            extension,
            exists,
        }
    }
}

impl fmt::Display for DragItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_directory {
            write!(f, "{}/", self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// Снимок состояния перетаскивания на одном тике опроса
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DragSnapshot {
    pub is_active: bool,
    pub items: Vec<DragItem>,
    pub captured_at_ms: u64,
}

impl DragSnapshot {
    pub fn inactive(captured_at_ms: u64) -> Self {
        Self {
            is_active: false,
            items: Vec::new(),
            captured_at_ms,
        }
    }

    pub fn active(items: Vec<DragItem>, captured_at_ms: u64) -> Self {
        Self {
            is_active: true,
            items,
            captured_at_ms,
        }
    }
}

impl fmt::Display for DragSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_active {
            return write!(f, "нет перетаскивания");
        }
        let names: Vec<String> = self.items.iter().map(|i| i.to_string()).collect();
        write!(f, "перетаскивание [{}]", names.join(", "))
    }
}

/// Фронты состояния перетаскивания для оркестратора
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragSignal {
    Start(DragSnapshot),
    End,
    /// Несколько подряд неудачных чтений; опрос продолжается
    Error(DragReadError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drag_item_from_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("report.pdf");
        std::fs::write(&file_path, b"12345").unwrap();

        let item = DragItem::from_path(&file_path);
        assert_eq!(item.name, "report.pdf");
        assert_eq!(item.extension.as_deref(), Some("pdf"));
        assert_eq!(item.size_bytes, Some(5));
        assert!(item.exists);
        assert!(!item.is_directory);
    }

    #[test]
    fn test_drag_item_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("photos.d");
        std::fs::create_dir(&sub).unwrap();

        let item = DragItem::from_path(&sub);
        assert!(item.is_directory);
        assert_eq!(item.extension, None);
        assert_eq!(item.size_bytes, None);
        assert_eq!(item.to_string(), "photos.d/");
    }

    #[test]
    fn test_drag_item_from_missing_path() {
        let item = DragItem::from_path("/non/existent/file.txt");
        assert!(!item.exists);
        assert_eq!(item.name, "file.txt");
        assert_eq!(item.size_bytes, None);
    }
}
