use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShakeError {
    #[error("Ошибка конфигурации: {0}")]
    Config(#[from] anyhow::Error),

    #[error("Ошибка ввода-вывода: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ошибка захвата ввода: {0}")]
    Capture(#[from] CaptureError),

    #[error("Ошибка чтения перетаскивания: {0}")]
    DragRead(#[from] DragReadError),

    #[error("Устройство не найдено: {0}")]
    DeviceNotFound(String),

    #[error("Недостаточно прав доступа: {0}")]
    Permission(String),

    #[error("Неверная конфигурация жеста: {0}")]
    InvalidConfig(String),

    #[error("Сервис недоступен: {0}")]
    ServiceUnavailable(String),

    #[error("Внутренняя ошибка: {0}")]
    Internal(String),
}

impl ShakeError {
    pub fn device_not_found<T>(msg: impl Into<String>) -> Result<T> {
        Err(ShakeError::DeviceNotFound(msg.into()))
    }
}

pub type Result<T> = std::result::Result<T, ShakeError>;

/// Ошибки потока захвата. Никогда не пересекают границу колбэка ОС:
/// поток захвата превращает их в счётчики или в `CaptureFault` для оркестратора.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Нет доступа к устройствам ввода: {0}")]
    PermissionDenied(String),

    #[error("Не удалось установить перехват мыши: {0}")]
    HookInstallFailed(String),

    #[error("Захват ввода не поддерживается: {0}")]
    Unsupported(String),
}

impl CaptureError {
    /// Можно ли пытаться перезапустить захват без участия пользователя
    pub fn is_retryable(&self) -> bool {
        matches!(self, CaptureError::HookInstallFailed(_))
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            CaptureError::PermissionDenied(_) => ErrorCode::InputPermissionDenied,
            CaptureError::HookInstallFailed(_) => ErrorCode::HookInstallFailed,
            CaptureError::Unsupported(_) => ErrorCode::CaptureUnsupported,
        }
    }
}

impl From<ShakeError> for CaptureError {
    fn from(err: ShakeError) -> Self {
        match err {
            ShakeError::Permission(msg) => CaptureError::PermissionDenied(msg),
            ShakeError::DeviceNotFound(msg) => CaptureError::Unsupported(msg),
            ShakeError::Capture(inner) => inner,
            other => CaptureError::HookInstallFailed(other.to_string()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DragReadError {
    #[error("Не удалось прочитать состояние перетаскивания: {0}")]
    PollReadFailed(String),

    #[error("Утилита недоступна: {0}")]
    ToolUnavailable(String),
}

impl DragReadError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::SelectionReadFailed
    }
}

/// Числовые коды ошибок для диагностики хоста
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    InputPermissionDenied = 100,
    HookInstallFailed = 200,
    SelectionReadFailed = 203,
    CaptureUnsupported = 300,
}

impl ErrorCode {
    pub fn value(self) -> u16 {
        self as u16
    }

    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::InputPermissionDenied => {
                "Нет доступа к /dev/input: добавьте пользователя в группу input"
            }
            ErrorCode::HookInstallFailed => "Не удалось запустить захват мыши",
            ErrorCode::SelectionReadFailed => "Не удалось прочитать содержимое перетаскивания",
            ErrorCode::CaptureUnsupported => "Захват мыши не поддерживается",
        }
    }
}

// Удобные макросы для создания ошибок
#[macro_export]
macro_rules! shake_error {
    (device_not_found, $($arg:tt)*) => {
        $crate::error::ShakeError::DeviceNotFound(format!($($arg)*))
    };
    (permission, $($arg:tt)*) => {
        $crate::error::ShakeError::Permission(format!($($arg)*))
    };
    (invalid_config, $($arg:tt)*) => {
        $crate::error::ShakeError::InvalidConfig(format!($($arg)*))
    };
    (service_unavailable, $($arg:tt)*) => {
        $crate::error::ShakeError::ServiceUnavailable(format!($($arg)*))
    };
    (internal, $($arg:tt)*) => {
        $crate::error::ShakeError::Internal(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_error_retryability() {
        assert!(CaptureError::HookInstallFailed("x".into()).is_retryable());
        assert!(!CaptureError::PermissionDenied("x".into()).is_retryable());
        assert!(!CaptureError::Unsupported("x".into()).is_retryable());
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(CaptureError::PermissionDenied("x".into()).code().value(), 100);
        assert_eq!(CaptureError::HookInstallFailed("x".into()).code().value(), 200);
        assert_eq!(DragReadError::PollReadFailed("x".into()).code().value(), 203);
    }

    #[test]
    fn test_shake_error_converts_to_capture_error() {
        let err: CaptureError = ShakeError::Permission("нет доступа".into()).into();
        assert!(matches!(err, CaptureError::PermissionDenied(_)));

        let err: CaptureError = shake_error!(device_not_found, "нет мыши").into();
        assert!(matches!(err, CaptureError::Unsupported(_)));
    }
}
