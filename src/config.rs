use crate::error::{Result as ShakeResult, ShakeError};
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub capture: CaptureConfig,
    pub bridge: BridgeConfig,
    pub drag: DragConfig,
    pub shake: ShakeSettings,
    pub trigger: TriggerConfig,
    pub recovery: RecoveryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Путь к evdev устройству или "auto"
    pub device_path: String,
    /// Потолок частоты отсчётов, отправляемых в мост
    pub max_events_per_sec: u32,
    /// Границы экрана для интегрирования относительных смещений
    pub screen_width: i32,
    pub screen_height: i32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_path: "auto".to_string(),
            max_events_per_sec: 60,
            screen_width: 1920,
            screen_height: 1080,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub pool_size: usize,
    pub drain_interval_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            pool_size: 64,
            drain_interval_ms: 16,
        }
    }
}

impl BridgeConfig {
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DragConfig {
    /// "auto" | "xclip" | "wl-paste" | "none"
    pub backend: String,
    pub active_poll_interval_ms: u64,
    pub idle_poll_interval_ms: u64,
    /// Сколько держать быстрый опрос после последнего положительного ответа
    pub active_hold_ms: u64,
    pub empty_retry_delay_ms: u64,
    pub payload_clear_delay_ms: u64,
    pub max_consecutive_failures: u32,
}

impl Default for DragConfig {
    fn default() -> Self {
        Self {
            backend: "auto".to_string(),
            active_poll_interval_ms: 10,
            idle_poll_interval_ms: 100,
            active_hold_ms: 500,
            empty_retry_delay_ms: 50,
            payload_clear_delay_ms: 500,
            max_consecutive_failures: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub ack_timeout_ms: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self { ack_timeout_ms: 5_000 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub restart_delay_ms: u64,
    pub max_restart_attempts: u32,
    /// Сбой раньше этого срока после перезапуска считается неудачным перезапуском
    pub stability_window_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            restart_delay_ms: 500,
            max_restart_attempts: 3,
            stability_window_ms: 2_000,
        }
    }
}

impl RecoveryConfig {
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

/// Чувствительность жеста - именованные наборы параметров
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Low,
    #[default]
    Medium,
    High,
}

/// Параметры детекции встряхивания. Скорости в px/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShakeConfig {
    pub min_direction_changes: u32,
    pub time_window_ms: u64,
    pub min_distance_px: u32,
    pub debounce_ms: u64,
    pub min_velocity: Option<f64>,
    pub max_velocity: Option<f64>,
    pub velocity_weight: Option<f64>,
}

impl Default for ShakeConfig {
    fn default() -> Self {
        Self::preset(Sensitivity::Medium)
    }
}

impl ShakeConfig {
    pub fn preset(sensitivity: Sensitivity) -> Self {
        match sensitivity {
            Sensitivity::Low => Self {
                min_direction_changes: 4,
                time_window_ms: 600,
                min_distance_px: 150,
                debounce_ms: 1_000,
                min_velocity: Some(300.0),
                max_velocity: None,
                velocity_weight: None,
            },
            Sensitivity::Medium => Self {
                min_direction_changes: 3,
                time_window_ms: 500,
                min_distance_px: 100,
                debounce_ms: 1_000,
                min_velocity: Some(200.0),
                max_velocity: None,
                velocity_weight: None,
            },
            Sensitivity::High => Self {
                min_direction_changes: 2,
                time_window_ms: 500,
                min_distance_px: 60,
                debounce_ms: 800,
                min_velocity: None,
                max_velocity: None,
                velocity_weight: None,
            },
        }
    }

    /// Новая конфигурация с применёнными частичными изменениями
    pub fn merged(&self, patch: &ShakeConfigPatch) -> Self {
        Self {
            min_direction_changes: patch.min_direction_changes.unwrap_or(self.min_direction_changes),
            time_window_ms: patch.time_window_ms.unwrap_or(self.time_window_ms),
            min_distance_px: patch.min_distance_px.unwrap_or(self.min_distance_px),
            debounce_ms: patch.debounce_ms.unwrap_or(self.debounce_ms),
            min_velocity: patch.min_velocity.or(self.min_velocity),
            max_velocity: patch.max_velocity.or(self.max_velocity),
            velocity_weight: patch.velocity_weight.or(self.velocity_weight),
        }
    }

    pub fn validate(&self) -> ShakeResult<()> {
        if self.min_direction_changes < 1 {
            return Err(ShakeError::InvalidConfig(
                "min_direction_changes должно быть не меньше 1".to_string(),
            ));
        }
        if self.time_window_ms == 0 {
            return Err(ShakeError::InvalidConfig(
                "time_window_ms должно быть больше 0".to_string(),
            ));
        }
        for (name, value) in [("min_velocity", self.min_velocity), ("max_velocity", self.max_velocity)] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(ShakeError::InvalidConfig(format!(
                        "{} должно быть неотрицательным числом, получено {}",
                        name, v
                    )));
                }
            }
        }
        if let (Some(min), Some(max)) = (self.min_velocity, self.max_velocity) {
            if min > max {
                return Err(ShakeError::InvalidConfig(format!(
                    "min_velocity ({}) больше max_velocity ({})",
                    min, max
                )));
            }
        }
        if let Some(weight) = self.velocity_weight {
            if !(0.0..=1.0).contains(&weight) {
                return Err(ShakeError::InvalidConfig(format!(
                    "velocity_weight должно быть в диапазоне [0, 1], получено {}",
                    weight
                )));
            }
        }
        Ok(())
    }
}

/// Частичное обновление `ShakeConfig`: заданные поля заменяют текущие
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShakeConfigPatch {
    pub min_direction_changes: Option<u32>,
    pub time_window_ms: Option<u64>,
    pub min_distance_px: Option<u32>,
    pub debounce_ms: Option<u64>,
    pub min_velocity: Option<f64>,
    pub max_velocity: Option<f64>,
    pub velocity_weight: Option<f64>,
}

impl ShakeConfigPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl From<ShakeConfig> for ShakeConfigPatch {
    fn from(config: ShakeConfig) -> Self {
        Self {
            min_direction_changes: Some(config.min_direction_changes),
            time_window_ms: Some(config.time_window_ms),
            min_distance_px: Some(config.min_distance_px),
            debounce_ms: Some(config.debounce_ms),
            min_velocity: config.min_velocity,
            max_velocity: config.max_velocity,
            velocity_weight: config.velocity_weight,
        }
    }
}

/// Секция `[shake]`: пресет плюс точечные переопределения
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ShakeSettings {
    pub preset: Sensitivity,
    #[serde(flatten)]
    pub overrides: ShakeConfigPatch,
}

impl ShakeSettings {
    pub fn resolve(&self) -> ShakeConfig {
        ShakeConfig::preset(self.preset).merged(&self.overrides)
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        let figment = Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("DRAG_SHAKE_").split("__"));

        let config: Config = figment
            .extract()
            .with_context(|| format!("Не удалось загрузить конфигурацию из {:?}", config_path))?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Неверный уровень логирования: {}", self.logging.level),
        }

        match self.logging.format.as_str() {
            "pretty" | "compact" => {}
            _ => anyhow::bail!("Неверный формат логирования: {}", self.logging.format),
        }

        if self.capture.max_events_per_sec == 0 {
            anyhow::bail!("max_events_per_sec должно быть больше 0");
        }
        if self.capture.screen_width <= 0 || self.capture.screen_height <= 0 {
            anyhow::bail!(
                "Неверный размер экрана: {}x{}",
                self.capture.screen_width,
                self.capture.screen_height
            );
        }

        if self.bridge.pool_size == 0 || !self.bridge.pool_size.is_power_of_two() {
            anyhow::bail!(
                "pool_size должно быть степенью двойки, получено {}",
                self.bridge.pool_size
            );
        }
        // Слив не чаще 60 раз в секунду
        if self.bridge.drain_interval_ms < 16 {
            anyhow::bail!("drain_interval_ms должно быть минимум 16");
        }

        match self.drag.backend.as_str() {
            "auto" | "xclip" | "wl-paste" | "none" => {}
            _ => anyhow::bail!("Неверный источник перетаскивания: {}", self.drag.backend),
        }
        if self.drag.active_poll_interval_ms == 0
            || self.drag.active_poll_interval_ms > self.drag.idle_poll_interval_ms
        {
            anyhow::bail!(
                "active_poll_interval_ms ({}) должно быть больше 0 и не больше idle_poll_interval_ms ({})",
                self.drag.active_poll_interval_ms,
                self.drag.idle_poll_interval_ms
            );
        }
        if self.drag.max_consecutive_failures == 0 {
            anyhow::bail!("max_consecutive_failures должно быть больше 0");
        }

        self.shake.resolve().validate()?;

        if self.trigger.ack_timeout_ms == 0 {
            anyhow::bail!("ack_timeout_ms должно быть больше 0");
        }

        if self.recovery.max_restart_attempts == 0 {
            anyhow::bail!("max_restart_attempts должно быть больше 0");
        }

        Ok(())
    }
}
