//! Per-stream composition of identification, debouncing and alerting.

use crate::config::RecognitionConfig;
use crate::debounce::DebounceEngine;
use crate::events::{AlertEvent, DoorCommand, IdentityEvent};
use crate::identify::IdentitySource;
use crate::label::Label;
use crate::sink::EventSink;
use crate::throttle::AlertThrottle;
use chrono::{DateTime, Utc};
use image::RgbImage;

/// What one tick produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    /// Raw label reported by the identity source for this frame.
    pub observed: Label,
    pub identity: Option<IdentityEvent>,
    pub alert: Option<AlertEvent>,
}

/// Recognition state for one camera stream.
///
/// Streams never share a `Pipeline`; each owns its debounce and throttle state.
#[derive(Debug, Clone)]
pub struct Pipeline {
    debounce: DebounceEngine,
    throttle: AlertThrottle,
}

impl Pipeline {
    pub fn new(config: &RecognitionConfig, started_at: DateTime<Utc>) -> Self {
        Self {
            debounce: DebounceEngine::new(config, started_at),
            throttle: AlertThrottle::new(config),
        }
    }

    pub fn debounce(&self) -> &DebounceEngine {
        &self.debounce
    }

    /// Identify `frame` and run the resulting label through the state machine.
    pub fn tick<I, S>(
        &mut self,
        frame: &RgbImage,
        source: &mut I,
        sink: &mut S,
        now: DateTime<Utc>,
    ) -> TickOutcome
    where
        I: IdentitySource + ?Sized,
        S: EventSink + ?Sized,
    {
        let observed = source.identify(frame);
        self.observe(observed, frame, sink, now)
    }

    /// Run an already-identified label through the state machine.
    pub fn observe<S>(
        &mut self,
        observed: Label,
        frame: &RgbImage,
        sink: &mut S,
        now: DateTime<Utc>,
    ) -> TickOutcome
    where
        S: EventSink + ?Sized,
    {
        let identity = self.debounce.process(observed.clone(), now);
        let mut alert = None;

        if let Some(event) = &identity {
            tracing::info!(label = %event.label, "identity confirmed");
            sink.on_identity(event);

            match &event.label {
                Label::Known(name) => sink.on_door_open(&DoorCommand::open(name.clone())),
                Label::Unknown => {
                    alert = self.throttle.maybe_alert(&event.label, now);
                    if let Some(alert) = &alert {
                        tracing::warn!(message = %alert.message, "unknown subject alert");
                        sink.on_alert(alert, frame);
                    }
                }
                Label::NoFaceDetected => {}
            }
        }

        TickOutcome {
            observed,
            identity,
            alert,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::VecDeque;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn ana() -> Label {
        Label::known("Ana").unwrap()
    }

    struct Scripted(VecDeque<Label>);

    impl IdentitySource for Scripted {
        fn identify(&mut self, _frame: &RgbImage) -> Label {
            self.0.pop_front().unwrap_or(Label::NoFaceDetected)
        }
    }

    #[derive(Default)]
    struct Recorded {
        identities: Vec<IdentityEvent>,
        doors: Vec<DoorCommand>,
        alerts: Vec<(AlertEvent, (u32, u32))>,
    }

    impl EventSink for Recorded {
        fn on_identity(&mut self, event: &IdentityEvent) {
            self.identities.push(event.clone());
        }

        fn on_door_open(&mut self, command: &DoorCommand) {
            self.doors.push(command.clone());
        }

        fn on_alert(&mut self, event: &AlertEvent, evidence: &RgbImage) {
            self.alerts.push((event.clone(), evidence.dimensions()));
        }
    }

    fn pipeline(threshold: u32) -> Pipeline {
        let cfg = RecognitionConfig {
            confirmation_threshold: threshold,
            inactivity_timeout_secs: 30,
            alert_interval_secs: 10,
            ..Default::default()
        };
        Pipeline::new(&cfg, t(0))
    }

    #[test]
    fn test_known_confirmation_opens_door() {
        let mut p = pipeline(3);
        let mut source = Scripted(VecDeque::from(vec![ana(); 3]));
        let mut sink = Recorded::default();
        let frame = RgbImage::new(4, 4);

        let outcomes: Vec<_> = (0..3)
            .map(|s| p.tick(&frame, &mut source, &mut sink, t(s)))
            .collect();

        assert!(outcomes[0].identity.is_none());
        assert!(outcomes[1].identity.is_none());
        assert_eq!(outcomes[2].identity.as_ref().map(|e| &e.label), Some(&ana()));
        assert_eq!(sink.identities.len(), 1);
        assert_eq!(sink.doors.len(), 1);
        assert_eq!(sink.doors[0].command, "open");
        assert_eq!(sink.doors[0].user.as_str(), "Ana");
        assert!(sink.alerts.is_empty());
    }

    #[test]
    fn test_unknown_confirmation_alerts_with_evidence() {
        let mut p = pipeline(2);
        let mut sink = Recorded::default();
        let frame = RgbImage::new(8, 6);

        p.observe(Label::Unknown, &frame, &mut sink, t(0));
        let out = p.observe(Label::Unknown, &frame, &mut sink, t(1));

        assert!(out.alert.is_some());
        assert_eq!(sink.identities.len(), 1);
        assert!(sink.doors.is_empty());
        assert_eq!(sink.alerts.len(), 1);
        assert_eq!(sink.alerts[0].1, (8, 6));
    }

    #[test]
    fn test_repeated_unknown_confirmations_are_throttled() {
        let mut p = pipeline(1);
        let mut sink = Recorded::default();
        let frame = RgbImage::new(2, 2);

        // Unknown at t=0, back to Ana, Unknown at t=5, Ana, Unknown at t=11.
        p.observe(Label::Unknown, &frame, &mut sink, t(0));
        p.observe(ana(), &frame, &mut sink, t(2));
        p.observe(Label::Unknown, &frame, &mut sink, t(5));
        p.observe(ana(), &frame, &mut sink, t(7));
        p.observe(Label::Unknown, &frame, &mut sink, t(11));

        assert_eq!(sink.identities.len(), 5);
        let alert_times: Vec<_> = sink.alerts.iter().map(|(a, _)| a.timestamp).collect();
        assert_eq!(alert_times, vec![t(0), t(11)]);
    }

    #[test]
    fn test_absence_event_has_no_side_actions() {
        let mut p = pipeline(1);
        let mut sink = Recorded::default();
        let frame = RgbImage::new(2, 2);

        p.observe(ana(), &frame, &mut sink, t(0));
        let out = p.observe(Label::NoFaceDetected, &frame, &mut sink, t(31));

        assert_eq!(
            out.identity.map(|e| e.label),
            Some(Label::NoFaceDetected)
        );
        assert_eq!(sink.identities.len(), 2);
        assert_eq!(sink.doors.len(), 1);
        assert!(sink.alerts.is_empty());
    }

    #[test]
    fn test_outcome_reports_raw_label() {
        let mut p = pipeline(5);
        let mut source = Scripted(VecDeque::from(vec![Label::Unknown]));
        let mut sink = Recorded::default();
        let out = p.tick(&RgbImage::new(1, 1), &mut source, &mut sink, t(0));
        assert_eq!(out.observed, Label::Unknown);
        assert!(out.identity.is_none());
        assert!(out.alert.is_none());
    }

    #[test]
    fn test_streams_are_independent() {
        let mut front = pipeline(2);
        let mut back = pipeline(2);
        let mut sink = Recorded::default();
        let frame = RgbImage::new(1, 1);

        front.observe(ana(), &frame, &mut sink, t(0));
        back.observe(ana(), &frame, &mut sink, t(0));
        assert_eq!(front.debounce().streak(), 1);
        assert_eq!(back.debounce().streak(), 1);

        front.observe(ana(), &frame, &mut sink, t(1));
        assert_eq!(front.debounce().confirmed(), &ana());
        assert_eq!(back.debounce().confirmed(), &Label::NoFaceDetected);
    }
}
