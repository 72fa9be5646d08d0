use crate::error::{Result, ShakeError};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

const INPUT_DIR: &str = "/dev/input";

/// Итог проверки прав: отсутствие доступа - отдельный статус, а не общая ошибка,
/// чтобы хост мог попросить пользователя выдать права.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAccess {
    Granted,
    Denied(String),
    Unsupported(String),
}

/// Проверить права доступа к устройствам ввода
pub fn check_permissions() -> Result<()> {
    info!("Проверка прав доступа...");

    match check_input_access(Path::new(INPUT_DIR)) {
        InputAccess::Granted => {}
        InputAccess::Denied(msg) => return Err(ShakeError::Permission(msg)),
        InputAccess::Unsupported(msg) => return Err(ShakeError::DeviceNotFound(msg)),
    }

    // Проверка, что не запущен от root (рекомендация безопасности)
    check_not_root();

    info!("Проверка прав доступа завершена успешно");
    Ok(())
}

pub fn check_input_access(input_dir: &Path) -> InputAccess {
    if !input_dir.exists() {
        return InputAccess::Unsupported(format!(
            "Директория {} не существует - evdev недоступен",
            input_dir.display()
        ));
    }

    match fs::read_dir(input_dir) {
        Ok(_) => {
            info!("Доступ к {} подтвержден", input_dir.display());
            InputAccess::Granted
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => InputAccess::Denied(format!(
            "Нет доступа к {}: {}. Добавьте пользователя в группу 'input'",
            input_dir.display(),
            e
        )),
        Err(e) => InputAccess::Unsupported(format!(
            "Не удалось прочитать {}: {}",
            input_dir.display(),
            e
        )),
    }
}

/// Доступ к самим файлам `event*`: каталог часто читаем, а устройства нет
pub fn check_event_devices(input_dir: &Path) -> InputAccess {
    let entries = match fs::read_dir(input_dir) {
        Ok(entries) => entries,
        Err(_) => return check_input_access(input_dir),
    };

    let mut found = 0usize;
    let mut denied = 0usize;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_event = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.starts_with("event"));
        if !is_event {
            continue;
        }
        found += 1;
        match fs::File::open(&path) {
            Ok(_) => return InputAccess::Granted,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => denied += 1,
            Err(_) => {}
        }
    }

    if found == 0 {
        InputAccess::Unsupported(format!("В {} нет устройств event*", input_dir.display()))
    } else if denied > 0 {
        InputAccess::Denied(format!(
            "Нет доступа ни к одному из {} устройств в {}. Добавьте пользователя в группу 'input'",
            found,
            input_dir.display()
        ))
    } else {
        InputAccess::Unsupported(format!("Устройства в {} не открываются", input_dir.display()))
    }
}

fn check_not_root() {
    match std::env::var("USER") {
        Ok(user) if user == "root" => {
            warn!("⚠️  Приложение запущено от имени root!");
            warn!("   Рекомендуется добавить пользователя в группу 'input'");
            warn!("   и запускать приложение от имени обычного пользователя:");
            warn!("   sudo usermod -a -G input $USER");
            warn!("   (затем перезайдите в систему)");
        }
        Ok(user) => {
            info!("Приложение запущено от имени пользователя: {}", user);
        }
        Err(_) => {
            warn!("Не удалось определить пользователя");
        }
    }
}

/// Получить рекомендуемые команды для настройки прав доступа
pub fn get_setup_commands() -> Vec<String> {
    vec![
        "# Добавить пользователя в группу input:".to_string(),
        "sudo usermod -a -G input $USER".to_string(),
        "".to_string(),
        "# Для чтения содержимого перетаскивания установите xclip (X11) или wl-clipboard (Wayland)".to_string(),
        "".to_string(),
        "# После выполнения команд перезайдите в систему".to_string(),
    ]
}
