use chrono::TimeDelta;
use serde::Deserialize;

/// Tuning knobs for the recognition state machine and the matcher.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Consecutive identical face labels required before a transition is confirmed.
    pub confirmation_threshold: u32,
    /// Seconds without any face before the absence marker is confirmed.
    pub inactivity_timeout_secs: u64,
    /// Minimum seconds between two unknown-subject alerts.
    pub alert_interval_secs: u64,
    /// Maximum scaled embedding distance for a gallery match (lower is
    /// stricter). 0.6 corresponds to ArcFace cosine similarity 0.40.
    pub distance_tolerance: f32,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            confirmation_threshold: 5,
            inactivity_timeout_secs: 30,
            alert_interval_secs: 10,
            distance_tolerance: 0.6,
        }
    }
}

impl RecognitionConfig {
    pub fn inactivity_timeout(&self) -> TimeDelta {
        secs_to_delta(self.inactivity_timeout_secs)
    }

    pub fn alert_interval(&self) -> TimeDelta {
        secs_to_delta(self.alert_interval_secs)
    }
}

fn secs_to_delta(secs: u64) -> TimeDelta {
    TimeDelta::try_seconds(i64::try_from(secs).unwrap_or(i64::MAX)).unwrap_or(TimeDelta::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = RecognitionConfig::default();
        assert_eq!(cfg.confirmation_threshold, 5);
        assert_eq!(cfg.inactivity_timeout(), TimeDelta::seconds(30));
        assert_eq!(cfg.alert_interval(), TimeDelta::seconds(10));
        assert!((cfg.distance_tolerance - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_huge_timeout_saturates() {
        let cfg = RecognitionConfig {
            inactivity_timeout_secs: u64::MAX,
            ..Default::default()
        };
        assert_eq!(cfg.inactivity_timeout(), TimeDelta::MAX);
    }
}
