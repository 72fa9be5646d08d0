use super::{DragItem, Vector2D};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Обнаруженное встряхивание
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShakeEvent {
    pub timestamp_ms: u64,
    pub position: Vector2D,
    pub direction_changes: u32,
    pub distance_px: f64,
    /// Средняя скорость в окне, px/s
    pub average_velocity: f64,
}

impl fmt::Display for ShakeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "встряхивание в {} ({} смен направления, {:.0}px, {:.0}px/s)",
            self.position, self.direction_changes, self.distance_px, self.average_velocity
        )
    }
}

/// Сигнал внешнему сервису полок: создать полку с этими элементами
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShelfTrigger {
    pub items: Vec<DragItem>,
    pub position: Vector2D,
    pub timestamp_ms: u64,
}

impl fmt::Display for ShelfTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "полка в {} с {} элементами ({}ms)",
            self.position,
            self.items.len(),
            self.timestamp_ms
        )
    }
}

/// Компоненты конвейера для диагностики
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Component {
    Capture,
    Bridge,
    DragMonitor,
    Gesture,
    Orchestrator,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Component::Capture => "capture",
            Component::Bridge => "bridge",
            Component::DragMonitor => "drag-monitor",
            Component::Gesture => "gesture",
            Component::Orchestrator => "orchestrator",
        };
        write!(f, "{}", name)
    }
}

/// Доступность функции drag+shake для хоста
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureStatus {
    Starting,
    Active,
    Recovering { attempt: u32 },
    /// Нет прав на чтение устройств ввода - нужна реакция пользователя
    PermissionRequired,
    /// Функция отключена до перезапуска приложения
    Unavailable { reason: String },
    Stopped,
}

impl FeatureStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            FeatureStatus::PermissionRequired | FeatureStatus::Unavailable { .. }
        )
    }
}

impl fmt::Display for FeatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureStatus::Starting => write!(f, "запуск"),
            FeatureStatus::Active => write!(f, "активно"),
            FeatureStatus::Recovering { attempt } => write!(f, "восстановление (попытка {})", attempt),
            FeatureStatus::PermissionRequired => write!(f, "нужны права доступа"),
            FeatureStatus::Unavailable { reason } => write!(f, "недоступно: {}", reason),
            FeatureStatus::Stopped => write!(f, "остановлено"),
        }
    }
}
