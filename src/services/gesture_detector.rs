//! Детектор встряхивания по траектории курсора.
//!
//! Скользящее окно отсчётов за `time_window_ms`. Смена направления - разворот
//! знака горизонтальной или вертикальной составляющей шага больше порога шума.
//! Встряхивание: достаточно разворотов, длины пути и (если задано) скорость
//! в диапазоне. После срабатывания окно очищается и действует `debounce_ms`.

use crate::config::{ShakeConfig, ShakeConfigPatch};
use crate::error::Result;
use crate::events::{PositionSample, ShakeEvent};
use crate::trace_if_enabled;
use smallvec::SmallVec;
use std::collections::VecDeque;
use tracing::debug;

/// Шаг меньше этого по оси не меняет направление
const NOISE_THRESHOLD_PX: i32 = 3;
const MAX_WINDOW_SAMPLES: usize = 256;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct WindowStats {
    reversals: u32,
    weighted_reversals: f64,
    path_px: f64,
    average_velocity: f64,
}

pub struct GestureDetector {
    config: ShakeConfig,
    window: VecDeque<PositionSample>,
    last_timestamp_ms: Option<u64>,
    last_shake_ms: Option<u64>,
    clock_anomalies: u64,
    shakes_detected: u64,
}

impl GestureDetector {
    pub fn new(config: ShakeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            window: VecDeque::with_capacity(MAX_WINDOW_SAMPLES),
            last_timestamp_ms: None,
            last_shake_ms: None,
            clock_anomalies: 0,
            shakes_detected: 0,
        })
    }

    pub fn config(&self) -> &ShakeConfig {
        &self.config
    }

    /// Слить частичную конфигурацию. Новая конфигурация сбрасывает окно и антидребезг.
    pub fn configure(&mut self, patch: &ShakeConfigPatch) -> Result<()> {
        let merged = self.config.merged(patch);
        merged.validate()?;
        debug!("Новая конфигурация встряхивания: {:?}", merged);
        self.config = merged;
        self.reset();
        Ok(())
    }

    /// Очистить состояние, не трогая конфигурацию
    pub fn reset(&mut self) {
        self.window.clear();
        self.last_timestamp_ms = None;
        self.last_shake_ms = None;
    }

    /// Обработать пакет отсчётов. Не больше одного встряхивания за вызов.
    pub fn feed(&mut self, samples: &[PositionSample]) -> Option<ShakeEvent> {
        let mut detected = None;

        for sample in samples {
            if let Some(last) = self.last_timestamp_ms {
                if sample.timestamp_ms <= last {
                    self.clock_anomalies += 1;
                    trace_if_enabled!("Отсчёт {} не новее {}ms, отброшен", sample, last);
                    continue;
                }
            }
            self.last_timestamp_ms = Some(sample.timestamp_ms);
            self.push(*sample);

            if detected.is_some() || self.in_debounce(sample.timestamp_ms) {
                continue;
            }

            if let Some(event) = self.evaluate(sample) {
                debug!("Обнаружено {}", event);
                self.last_shake_ms = Some(sample.timestamp_ms);
                self.shakes_detected += 1;
                self.window.clear();
                detected = Some(event);
            }
        }

        detected
    }

    pub fn clock_anomalies(&self) -> u64 {
        self.clock_anomalies
    }

    pub fn shakes_detected(&self) -> u64 {
        self.shakes_detected
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    fn push(&mut self, sample: PositionSample) {
        self.window.push_back(sample);

        let horizon = sample.timestamp_ms.saturating_sub(self.config.time_window_ms);
        while self.window.front().map_or(false, |s| s.timestamp_ms < horizon) {
            self.window.pop_front();
        }
        while self.window.len() > MAX_WINDOW_SAMPLES {
            self.window.pop_front();
        }
    }

    fn in_debounce(&self, now_ms: u64) -> bool {
        self.last_shake_ms
            .map_or(false, |last| now_ms < last.saturating_add(self.config.debounce_ms))
    }

    fn evaluate(&self, latest: &PositionSample) -> Option<ShakeEvent> {
        let stats = self.analyze();

        let changes = match self.config.velocity_weight {
            Some(w) => (1.0 - w) * stats.reversals as f64 + w * stats.weighted_reversals,
            None => stats.reversals as f64,
        };
        // Погрешность f64 при смешивании целых
        if changes + 1e-9 < self.config.min_direction_changes as f64 {
            return None;
        }
        if stats.path_px < self.config.min_distance_px as f64 {
            return None;
        }
        if let Some(min) = self.config.min_velocity {
            if stats.average_velocity < min {
                return None;
            }
        }
        if let Some(max) = self.config.max_velocity {
            if stats.average_velocity > max {
                return None;
            }
        }

        Some(ShakeEvent {
            timestamp_ms: latest.timestamp_ms,
            position: latest.position(),
            direction_changes: stats.reversals,
            distance_px: stats.path_px,
            average_velocity: stats.average_velocity,
        })
    }

    fn analyze(&self) -> WindowStats {
        let (Some(first), Some(last)) = (self.window.front(), self.window.back()) else {
            return WindowStats::default();
        };

        let mut path_px = 0.0;
        let mut last_dir_x = 0;
        let mut last_dir_y = 0;
        // Скорости шагов-разворотов; вес считается после средней скорости
        let mut reversal_speeds: SmallVec<[f64; 32]> = SmallVec::new();

        for (prev, cur) in self.window.iter().zip(self.window.iter().skip(1)) {
            let dx = cur.x - prev.x;
            let dy = cur.y - prev.y;
            let distance = prev.position().distance_to(&cur.position());
            path_px += distance;

            let mut reversed = false;
            if dx.abs() >= NOISE_THRESHOLD_PX {
                let dir = dx.signum();
                reversed |= last_dir_x != 0 && dir != last_dir_x;
                last_dir_x = dir;
            }
            if dy.abs() >= NOISE_THRESHOLD_PX {
                let dir = dy.signum();
                reversed |= last_dir_y != 0 && dir != last_dir_y;
                last_dir_y = dir;
            }

            if reversed {
                let dt_ms = cur.timestamp_ms.saturating_sub(prev.timestamp_ms).max(1);
                reversal_speeds.push(distance * 1_000.0 / dt_ms as f64);
            }
        }

        let duration_ms = last.timestamp_ms.saturating_sub(first.timestamp_ms);
        let average_velocity = if duration_ms == 0 {
            0.0
        } else {
            path_px * 1_000.0 / duration_ms as f64
        };

        let reversals = reversal_speeds.len() as u32;
        let weighted_reversals = reversal_speeds
            .iter()
            .map(|speed| {
                if average_velocity > 0.0 {
                    (speed / average_velocity).min(1.0)
                } else {
                    1.0
                }
            })
            .sum();

        WindowStats {
            reversals,
            weighted_reversals,
            path_px,
            average_velocity,
        }
    }
}
