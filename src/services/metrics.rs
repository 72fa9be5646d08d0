use crate::events::{FeatureStatus, Vector2D};
use crate::services::bridge::BridgeStats;
use crate::services::health::HealthStatus;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Счётчики конвейера вне моста. Пишутся из потока захвата и задачи приложения.
#[derive(Debug, Default)]
pub struct PipelineStats {
    callback_errors: AtomicU64,
    clock_anomalies: AtomicU64,
    shakes_detected: AtomicU64,
    triggers_fired: AtomicU64,
    triggers_suppressed: AtomicU64,
    drag_read_failures: AtomicU64,
    capture_restarts: AtomicU64,
}

macro_rules! counter {
    ($inc:ident, $get:ident) => {
        pub fn $inc(&self) -> u64 {
            self.$get.fetch_add(1, Ordering::Relaxed) + 1
        }

        pub fn $get(&self) -> u64 {
            self.$get.load(Ordering::Relaxed)
        }
    };
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Аномалии часов считает детектор; здесь только накапливаем
    pub fn add_clock_anomalies(&self, count: u64) {
        if count > 0 {
            self.clock_anomalies.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn clock_anomalies(&self) -> u64 {
        self.clock_anomalies.load(Ordering::Relaxed)
    }
}

impl PipelineStats {
    counter!(record_callback_error, callback_errors);
    counter!(record_shake, shakes_detected);
    counter!(record_trigger_fired, triggers_fired);
    counter!(record_trigger_suppressed, triggers_suppressed);
    counter!(record_drag_read_failure, drag_read_failures);
    counter!(record_capture_restart, capture_restarts);
}

/// Диагностический снимок для хоста
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub events_processed: u64,
    pub events_batched: u64,
    pub events_dropped: u64,
    pub batches_delivered: u64,
    pub batching_efficiency: f64,
    pub currently_tracking: bool,
    pub last_position: Vector2D,
    pub status: FeatureStatus,
    pub health: HealthStatus,
    pub clock_anomalies: u64,
    pub callback_errors: u64,
    pub shakes_detected: u64,
    pub triggers_fired: u64,
    pub triggers_suppressed: u64,
    pub drag_read_failures: u64,
    pub capture_restarts: u64,
}

impl MetricsSnapshot {
    pub fn collect(
        bridge: BridgeStats,
        stats: &PipelineStats,
        status: FeatureStatus,
        health: HealthStatus,
    ) -> Self {
        Self {
            events_processed: bridge.events_processed,
            events_batched: bridge.events_batched,
            events_dropped: bridge.events_dropped,
            batches_delivered: bridge.batches_delivered,
            batching_efficiency: bridge.batching_efficiency,
            currently_tracking: bridge.currently_tracking,
            last_position: bridge.last_position,
            status,
            health,
            clock_anomalies: stats.clock_anomalies(),
            callback_errors: stats.callback_errors(),
            shakes_detected: stats.shakes_detected(),
            triggers_fired: stats.triggers_fired(),
            triggers_suppressed: stats.triggers_suppressed(),
            drag_read_failures: stats.drag_read_failures(),
            capture_restarts: stats.capture_restarts(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = PipelineStats::new();
        assert_eq!(stats.record_trigger_suppressed(), 1);
        assert_eq!(stats.record_trigger_suppressed(), 2);
        stats.add_clock_anomalies(3);
        stats.add_clock_anomalies(0);

        let snapshot = MetricsSnapshot::collect(
            BridgeStats::default(),
            &stats,
            FeatureStatus::Active,
            HealthStatus::Healthy,
        );
        assert_eq!(snapshot.triggers_suppressed, 2);
        assert_eq!(snapshot.clock_anomalies, 3);
        assert_eq!(snapshot.triggers_fired, 0);
    }
}
