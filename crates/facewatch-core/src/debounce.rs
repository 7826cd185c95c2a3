//! Identity debouncing.
//!
//! Turns one raw label per frame into confirmed identity transitions. A face
//! label has to be seen on `confirmation_threshold` consecutive face frames
//! before it replaces the confirmed identity, and the absence marker is only
//! confirmed after no face at all has been seen for longer than the
//! inactivity timeout.

use crate::config::RecognitionConfig;
use crate::events::IdentityEvent;
use crate::label::Label;
use chrono::{DateTime, TimeDelta, Utc};

/// Debounce state for a single camera stream.
#[derive(Debug, Clone)]
pub struct DebounceEngine {
    confirmation_threshold: u32,
    inactivity_timeout: TimeDelta,
    confirmed: Label,
    pending: Option<Label>,
    streak: u32,
    last_seen_face_at: DateTime<Utc>,
}

impl DebounceEngine {
    /// Create an engine whose inactivity clock starts at `started_at`.
    ///
    /// A zero threshold is treated as 1; `Config` validation rejects it
    /// before it gets here.
    pub fn new(config: &RecognitionConfig, started_at: DateTime<Utc>) -> Self {
        Self {
            confirmation_threshold: config.confirmation_threshold.max(1),
            inactivity_timeout: config.inactivity_timeout(),
            confirmed: Label::NoFaceDetected,
            pending: None,
            streak: 0,
            last_seen_face_at: started_at,
        }
    }

    /// The label most recently emitted downstream.
    pub fn confirmed(&self) -> &Label {
        &self.confirmed
    }

    /// The candidate label currently accumulating evidence.
    pub fn pending(&self) -> Option<&Label> {
        self.pending.as_ref()
    }

    /// Consecutive observations of the pending label.
    pub fn streak(&self) -> u32 {
        self.streak
    }

    /// Feed one frame's label. Returns an event only on a genuine transition.
    pub fn process(&mut self, label: Label, now: DateTime<Utc>) -> Option<IdentityEvent> {
        if !label.is_face() {
            return self.process_absence(now);
        }

        self.last_seen_face_at = now;

        if label == self.confirmed {
            self.clear_pending();
            return None;
        }

        if self.pending.as_ref() == Some(&label) {
            self.streak += 1;
        } else {
            self.pending = Some(label);
            self.streak = 1;
        }

        if self.streak < self.confirmation_threshold {
            tracing::trace!(
                pending = ?self.pending,
                streak = self.streak,
                threshold = self.confirmation_threshold,
                "debounce: accumulating"
            );
            return None;
        }

        let confirmed = self.pending.take()?;
        self.streak = 0;
        Some(self.confirm(confirmed, now))
    }

    fn process_absence(&mut self, now: DateTime<Utc>) -> Option<IdentityEvent> {
        if self.confirmed == Label::NoFaceDetected {
            return None;
        }

        // A clock that stepped backwards counts as no time elapsed.
        let idle = (now - self.last_seen_face_at).max(TimeDelta::zero());
        if idle <= self.inactivity_timeout {
            return None;
        }

        tracing::debug!(idle_secs = idle.num_seconds(), "debounce: inactivity timeout");
        self.clear_pending();
        Some(self.confirm(Label::NoFaceDetected, now))
    }

    fn confirm(&mut self, label: Label, now: DateTime<Utc>) -> IdentityEvent {
        tracing::debug!(from = %self.confirmed, to = %label, "debounce: transition confirmed");
        self.confirmed = label.clone();
        IdentityEvent {
            label,
            timestamp: now,
        }
    }

    fn clear_pending(&mut self) {
        self.pending = None;
        self.streak = 0;
    }
}
