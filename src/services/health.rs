use crate::events::Component;
use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

const EVENT_TIMEOUT_MS: u64 = 5_000;
const CRITICAL_TIMEOUT_MS: u64 = 30_000;
const DEGRADED_ERROR_RATE: f64 = 0.05;
const UNHEALTHY_ERROR_RATE: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Critical,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Critical => "critical",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ModuleHealth {
    pub events: u64,
    pub errors: u64,
    pub last_activity_ms: u64,
    pub last_error: Option<String>,
    /// Компонент должен отчитываться постоянно (таймер опроса), молчание = сбой
    pub heartbeat: bool,
    /// Принудительный статус от оркестратора (права, исчерпанные перезапуски)
    pub forced: Option<HealthStatus>,
}

impl ModuleHealth {
    pub fn error_rate(&self) -> f64 {
        if self.events == 0 {
            return if self.errors > 0 { 1.0 } else { 0.0 };
        }
        self.errors as f64 / self.events as f64
    }

    pub fn status(&self, now_ms: u64) -> HealthStatus {
        let mut status = HealthStatus::Healthy;

        if self.heartbeat && self.last_activity_ms > 0 {
            let silence = now_ms.saturating_sub(self.last_activity_ms);
            if silence > CRITICAL_TIMEOUT_MS {
                status = HealthStatus::Critical;
            } else if silence > EVENT_TIMEOUT_MS {
                status = HealthStatus::Unhealthy;
            }
        }

        let rate = self.error_rate();
        if rate > UNHEALTHY_ERROR_RATE {
            status = status.max(HealthStatus::Unhealthy);
        } else if rate > DEGRADED_ERROR_RATE {
            status = status.max(HealthStatus::Degraded);
        }

        match self.forced {
            Some(forced) => status.max(forced),
            None => status,
        }
    }
}

/// Реестр активности и ошибок компонентов конвейера
#[derive(Debug, Default)]
pub struct HealthTracker {
    modules: DashMap<Component, ModuleHealth>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, component: Component, heartbeat: bool) {
        self.modules.entry(component).or_default().heartbeat = heartbeat;
    }

    pub fn report_activity(&self, component: Component, now_ms: u64, events: u64) {
        let mut entry = self.modules.entry(component).or_default();
        entry.events += events;
        entry.last_activity_ms = now_ms;
    }

    pub fn report_error(&self, component: Component, error: impl Into<String>) {
        let error = error.into();
        warn!("Ошибка компонента {}: {}", component, error);
        let mut entry = self.modules.entry(component).or_default();
        entry.errors += 1;
        entry.last_error = Some(error);
    }

    pub fn force_status(&self, component: Component, status: Option<HealthStatus>) {
        if let Some(status) = status {
            info!("Статус здоровья {} принудительно: {}", component, status);
        }
        self.modules.entry(component).or_default().forced = status;
    }

    pub fn component_status(&self, component: Component, now_ms: u64) -> HealthStatus {
        self.modules
            .get(&component)
            .map_or(HealthStatus::Healthy, |m| m.status(now_ms))
    }

    /// Общий статус - худший из компонентов
    pub fn overall(&self, now_ms: u64) -> HealthStatus {
        self.modules
            .iter()
            .map(|m| m.status(now_ms))
            .max()
            .unwrap_or(HealthStatus::Healthy)
    }

    pub fn report(&self, now_ms: u64) -> Vec<(Component, HealthStatus, ModuleHealth)> {
        let mut report: Vec<_> = self
            .modules
            .iter()
            .map(|m| (*m.key(), m.status(now_ms), m.value().clone()))
            .collect();
        report.sort_by_key(|(component, _, _)| component.to_string());
        report
    }
}
