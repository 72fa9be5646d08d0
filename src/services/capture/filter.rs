use crate::events::PositionSample;

/// Ограничение частоты отсчётов, уходящих в мост.
/// Смена состояния левой кнопки проходит всегда.
#[derive(Debug)]
pub struct ButtonFilter {
    min_interval_ms: u64,
    last_forwarded_ms: Option<u64>,
    last_button: Option<bool>,
}

impl ButtonFilter {
    pub fn new(max_events_per_sec: u32) -> Self {
        Self {
            min_interval_ms: 1_000 / u64::from(max_events_per_sec.max(1)),
            last_forwarded_ms: None,
            last_button: None,
        }
    }

    pub fn should_forward(&mut self, sample: &PositionSample) -> bool {
        let button_changed = self.last_button != Some(sample.left_button_down);
        let interval_elapsed = self.last_forwarded_ms.map_or(true, |last| {
            sample.timestamp_ms.saturating_sub(last) >= self.min_interval_ms
        });

        if button_changed || interval_elapsed {
            self.last_forwarded_ms = Some(sample.timestamp_ms);
            self.last_button = Some(sample.left_button_down);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_to_ceiling() {
        let mut filter = ButtonFilter::new(60);
        // Движение каждую миллисекунду в течение секунды
        let forwarded = (0..1_000u64)
            .filter(|&t| filter.should_forward(&PositionSample::new(t as i32, 0, t, false)))
            .count();
        assert!(forwarded <= 63, "forwarded {}", forwarded);
        assert!(forwarded >= 55, "forwarded {}", forwarded);
    }

    #[test]
    fn test_button_change_forwarded_immediately() {
        let mut filter = ButtonFilter::new(60);
        assert!(filter.should_forward(&PositionSample::new(0, 0, 100, false)));
        assert!(!filter.should_forward(&PositionSample::new(1, 0, 101, false)));
        assert!(filter.should_forward(&PositionSample::new(1, 0, 102, true)));
        assert!(filter.should_forward(&PositionSample::new(1, 0, 103, false)));
    }
}
