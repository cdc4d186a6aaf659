//! Staleness gate
//!
//! Decides per entity whether a scheduling tick should hit the network.
//! Elapsed time is anchored to the last observed *change* in an entity's
//! readings, not to the last fetch, so a quiet entity is re-checked once the
//! threshold has passed and keeps being re-checked until something moves.

use chrono::{DateTime, Utc};

/// Per-entity throttling state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitState {
    /// `None` until the first successful fetch
    last_change: Option<DateTime<Utc>>,
    threshold_minutes: f64,
}

impl RateLimitState {
    pub fn new(threshold_minutes: f64) -> Self {
        Self {
            last_change: None,
            threshold_minutes,
        }
    }

    pub fn last_change(&self) -> Option<DateTime<Utc>> {
        self.last_change
    }

    pub fn threshold_minutes(&self) -> f64 {
        self.threshold_minutes
    }

    pub fn never_polled(&self) -> bool {
        self.last_change.is_none()
    }

    /// Minutes since the last change, rounded to one decimal; `None` if never polled
    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> Option<f64> {
        self.last_change.map(|changed| {
            let secs = (now - changed).num_milliseconds() as f64 / 1000.0;
            (secs / 6.0).round_ties_even() / 10.0
        })
    }

    /// Whether the entity should issue a fetch this tick
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.elapsed_minutes(now) {
            None => true,
            Some(elapsed) => elapsed >= self.threshold_minutes,
        }
    }

    /// Record a successful fetch; the anchor moves only on change or on the
    /// very first success. Returns whether the anchor moved.
    pub fn record_success(&mut self, now: DateTime<Utc>, changed: bool) -> bool {
        if changed || self.last_change.is_none() {
            self.last_change = Some(now);
            return true;
        }
        false
    }
}
