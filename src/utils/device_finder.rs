use crate::error::{Result, ShakeError};
use evdev::{KeyCode, RelativeAxisCode};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub struct DeviceFinder;

impl DeviceFinder {
    /// Найти указательное устройство (мышь) для захвата
    pub fn find_pointer_device(device_path: &str) -> Result<PathBuf> {
        if device_path != "auto" {
            let path = PathBuf::from(device_path);
            return if path.exists() {
                info!("Используется указанное устройство: {:?}", path);
                Ok(path)
            } else {
                ShakeError::device_not_found(format!("Указанное устройство не найдено: {:?}", path))
            };
        }

        Self::auto_find_pointer()
    }

    fn auto_find_pointer() -> Result<PathBuf> {
        info!("Начинаем автопоиск мыши...");

        if let Ok(device) = Self::find_by_id() {
            info!("Найдена мышь по ID: {:?}", device);
            return Ok(device);
        }

        if let Ok(device) = Self::find_by_event_devices() {
            info!("Найдена мышь среди event устройств: {:?}", device);
            return Ok(device);
        }

        ShakeError::device_not_found(
            "Не удалось найти подходящую мышь. \
             Убедитесь, что пользователь добавлен в группу 'input'",
        )
    }

    fn find_by_id() -> Result<PathBuf> {
        let by_id_dir = Path::new("/dev/input/by-id");

        if !by_id_dir.exists() {
            debug!("Директория /dev/input/by-id не существует");
            return ShakeError::device_not_found("Директория by-id не найдена");
        }

        let entries = fs::read_dir(by_id_dir)
            .map_err(|e| ShakeError::Permission(format!("Нет доступа к /dev/input/by-id: {}", e)))?;

        let mut candidates = Vec::new();

        for entry in entries {
            let path = entry?.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("").to_string();

            if !name.contains("event") {
                continue;
            }

            let priority = Self::by_id_priority(&name);
            if priority == 0 {
                continue;
            }

            if !Self::is_device_accessible(&path) {
                warn!("Устройство {:?} недоступно", path);
                continue;
            }

            if Self::is_pointer_device(&path) {
                info!("Добавлена мышь: {} (приоритет: {})", name, priority);
                candidates.push((path, priority));
            } else {
                debug!("Устройство не прошло проверку как мышь: {}", name);
            }
        }

        candidates.sort_by(|a, b| b.1.cmp(&a.1));

        match candidates.into_iter().next() {
            Some((path, _)) => Ok(path),
            None => ShakeError::device_not_found("Мышь не найдена в by-id"),
        }
    }

    /// Приоритет по имени ссылки в by-id; 0 - не мышь
    fn by_id_priority(name: &str) -> u32 {
        if name.ends_with("event-mouse") {
            100
        } else if name.to_lowercase().contains("mouse") {
            50
        } else if name.contains("kbd") {
            0
        } else {
            10
        }
    }

    fn find_by_event_devices() -> Result<PathBuf> {
        let input_dir = Path::new("/dev/input");

        let entries = fs::read_dir(input_dir)
            .map_err(|e| ShakeError::Permission(format!("Нет доступа к /dev/input: {}", e)))?;

        let mut event_devices: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map_or(false, |n| n.starts_with("event"))
            })
            .collect();

        event_devices.sort();

        for device_path in event_devices {
            debug!("Проверяем устройство: {:?}", device_path);

            if Self::is_device_accessible(&device_path) && Self::is_pointer_device(&device_path) {
                return Ok(device_path);
            }
        }

        ShakeError::device_not_found("Не найдена доступная мышь среди event устройств")
    }

    /// Мышь: относительные оси X/Y и левая кнопка
    fn is_pointer_device(device_path: &Path) -> bool {
        match evdev::Device::open(device_path) {
            Ok(device) => {
                let has_axes = device.supported_relative_axes().map_or(false, |axes| {
                    axes.contains(RelativeAxisCode::REL_X) && axes.contains(RelativeAxisCode::REL_Y)
                });
                let has_left_button = device
                    .supported_keys()
                    .map_or(false, |keys| keys.contains(KeyCode::BTN_LEFT));

                let is_pointer = has_axes && has_left_button;
                debug!(
                    "Устройство {:?} ({}): оси={}, BTN_LEFT={}",
                    device_path,
                    device.name().unwrap_or("Unknown"),
                    has_axes,
                    has_left_button
                );
                is_pointer
            }
            Err(e) => {
                debug!("Не удалось открыть устройство {:?}: {}", device_path, e);
                false
            }
        }
    }

    fn is_device_accessible(device_path: &Path) -> bool {
        match fs::File::open(device_path) {
            Ok(_) => true,
            Err(e) => {
                debug!("Устройство {:?} недоступно: {}", device_path, e);
                false
            }
        }
    }
}
