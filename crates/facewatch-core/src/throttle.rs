//! Minimum-interval gate for unknown-subject alerts.

use crate::config::RecognitionConfig;
use crate::events::AlertEvent;
use crate::label::Label;
use chrono::{DateTime, TimeDelta, Utc};

/// Rate limiter that lets at most one unknown-subject alert through per
/// `alert_interval`. There is no burst allowance.
#[derive(Debug, Clone)]
pub struct AlertThrottle {
    interval: TimeDelta,
    last_alert_at: Option<DateTime<Utc>>,
}

impl AlertThrottle {
    pub fn new(config: &RecognitionConfig) -> Self {
        Self {
            interval: config.alert_interval(),
            last_alert_at: None,
        }
    }

    pub fn last_alert_at(&self) -> Option<DateTime<Utc>> {
        self.last_alert_at
    }

    /// Issue an alert for a confirmed `Unknown` if the interval has elapsed.
    /// Any other label is ignored.
    pub fn maybe_alert(&mut self, label: &Label, now: DateTime<Utc>) -> Option<AlertEvent> {
        if *label != Label::Unknown {
            return None;
        }

        if let Some(last) = self.last_alert_at {
            let elapsed = (now - last).max(TimeDelta::zero());
            if elapsed < self.interval {
                tracing::debug!(
                    elapsed_secs = elapsed.num_seconds(),
                    interval_secs = self.interval.num_seconds(),
                    "alert suppressed by throttle"
                );
                return None;
            }
        }

        self.last_alert_at = Some(now);
        Some(AlertEvent::unknown_subject(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn throttle(interval_secs: u64) -> AlertThrottle {
        AlertThrottle::new(&RecognitionConfig {
            alert_interval_secs: interval_secs,
            ..Default::default()
        })
    }

    #[test]
    fn test_first_alert_always_passes() {
        let mut th = throttle(10);
        let alert = th.maybe_alert(&Label::Unknown, t(0)).expect("alert");
        assert_eq!(alert.timestamp, t(0));
        assert_eq!(alert.message, crate::events::UNKNOWN_ALERT_MESSAGE);
        assert_eq!(th.last_alert_at(), Some(t(0)));
    }

    #[test]
    fn test_interval_scenario() {
        let mut th = throttle(10);
        assert!(th.maybe_alert(&Label::Unknown, t(0)).is_some());
        assert!(th.maybe_alert(&Label::Unknown, t(5)).is_none());
        assert!(th.maybe_alert(&Label::Unknown, t(11)).is_some());
    }

    #[test]
    fn test_interval_boundary_is_inclusive() {
        let mut th = throttle(10);
        th.maybe_alert(&Label::Unknown, t(0));
        assert!(th.maybe_alert(&Label::Unknown, t(9)).is_none());
        assert!(th.maybe_alert(&Label::Unknown, t(10)).is_some());
    }

    #[test]
    fn test_suppressed_attempt_does_not_extend_window() {
        let mut th = throttle(10);
        th.maybe_alert(&Label::Unknown, t(0));
        th.maybe_alert(&Label::Unknown, t(8));
        assert_eq!(th.last_alert_at(), Some(t(0)));
        assert!(th.maybe_alert(&Label::Unknown, t(10)).is_some());
    }

    #[test]
    fn test_non_unknown_labels_ignored() {
        let mut th = throttle(10);
        assert!(th.maybe_alert(&Label::known("Ana").unwrap(), t(0)).is_none());
        assert!(th.maybe_alert(&Label::NoFaceDetected, t(0)).is_none());
        assert!(th.last_alert_at().is_none());
    }

    #[test]
    fn test_rate_limit_over_dense_confirmations() {
        let mut th = throttle(10);
        let fired: Vec<i64> = (0..100)
            .filter(|s| th.maybe_alert(&Label::Unknown, t(*s)).is_some())
            .collect();
        assert_eq!(fired, vec![0, 10, 20, 30, 40, 50, 60, 70, 80, 90]);
        for pair in fired.windows(2) {
            assert!(pair[1] - pair[0] >= 10);
        }
    }

    #[test]
    fn test_zero_interval_never_throttles() {
        let mut th = throttle(0);
        assert!(th.maybe_alert(&Label::Unknown, t(0)).is_some());
        assert!(th.maybe_alert(&Label::Unknown, t(0)).is_some());
    }
}
