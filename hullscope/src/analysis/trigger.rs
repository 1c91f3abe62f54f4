//! Debounce and deduplication of slider values.
//!
//! Dragging a slider produces a burst of values. Only the value the slider
//! rests on matters: a value survives once no newer value has arrived for
//! the quiet window, and is then dropped if it equals the previous survivor.
//!
//! ```text
//! input:   10  12  15 ─────────── 15 ─────── 20 ──────
//!          ├───┼───┤   250ms      ├──250ms──┤
//! emitted:            15                (dup)        20
//! ```
//!
//! [`TriggerFilter`] is a pure state machine driven by explicit timestamps;
//! the pipeline's driver loop owns the clock.

use std::time::Duration;

use tokio::time::Instant;

/// Configuration for the trigger stage.
#[derive(Debug, Clone)]
pub struct TriggerConfig {
    /// Quiet time after the last input before the value survives.
    pub quiet_window: Duration,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            quiet_window: Duration::from_millis(250),
        }
    }
}

/// Debounce-then-distinct filter.
#[derive(Debug)]
pub struct TriggerFilter {
    config: TriggerConfig,

    /// Latest value not yet emitted or dropped.
    pending: Option<f64>,

    /// When `pending` was recorded.
    last_input: Option<Instant>,

    /// Previous surviving value.
    last_emitted: Option<f64>,
}

impl TriggerFilter {
    pub fn new(config: TriggerConfig) -> Self {
        Self {
            config,
            pending: None,
            last_input: None,
            last_emitted: None,
        }
    }

    /// Record an input, restarting the quiet window.
    pub fn record(&mut self, value: f64, at: Instant) {
        self.pending = Some(value);
        self.last_input = Some(at);
    }

    /// When the pending value will survive, if one is pending.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending?;
        self.last_input.map(|at| at + self.config.quiet_window)
    }

    /// Emit the pending value if its quiet window has elapsed at `now`.
    ///
    /// Returns `None` while the window is open, when nothing is pending, or
    /// when the surviving value repeats the previous one.
    pub fn poll(&mut self, now: Instant) -> Option<f64> {
        let deadline = self.deadline()?;
        if now < deadline {
            return None;
        }
        self.release()
    }

    /// Emit the pending value immediately, subject to deduplication.
    ///
    /// Used when the input stream ends.
    pub fn flush(&mut self) -> Option<f64> {
        self.release()
    }

    /// The previous surviving value.
    pub fn last_emitted(&self) -> Option<f64> {
        self.last_emitted
    }

    /// Whether a value is waiting for its quiet window.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn release(&mut self) -> Option<f64> {
        let value = self.pending.take()?;
        self.last_input = None;
        if self.last_emitted == Some(value) {
            return None;
        }
        self.last_emitted = Some(value);
        Some(value)
    }
}
