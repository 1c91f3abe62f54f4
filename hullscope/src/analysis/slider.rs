//! Slider input: range normalization and the input handle.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

use super::presenter::ResultPresenter;

/// Bounds and step of the buffer distance slider, in kilometers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliderRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
    /// Position before any user input.
    pub initial: f64,
}

impl Default for SliderRange {
    fn default() -> Self {
        Self {
            min: 10.0,
            max: 300.0,
            step: 5.0,
            initial: 30.0,
        }
    }
}

impl SliderRange {
    /// Clamp `raw` into the range and snap it to the step grid.
    ///
    /// Returns `None` for non-finite input. A non-positive step disables
    /// snapping.
    pub fn normalize(&self, raw: f64) -> Option<f64> {
        if !raw.is_finite() {
            return None;
        }
        let clamped = raw.clamp(self.min, self.max);
        if self.step <= 0.0 {
            return Some(clamped);
        }
        let steps = ((clamped - self.min) / self.step).round();
        Some((self.min + steps * self.step).min(self.max))
    }

    /// Whether the range is usable.
    pub fn is_valid(&self) -> bool {
        self.min.is_finite()
            && self.max.is_finite()
            && self.step.is_finite()
            && self.min > 0.0
            && self.min <= self.max
            && self.initial >= self.min
            && self.initial <= self.max
    }
}

/// Handle through which raw slider positions enter the pipeline.
///
/// Every accepted value is echoed to the presenter synchronously, before it
/// reaches the debounced trigger. The echo works even after the pipeline
/// has stopped.
#[derive(Clone)]
pub struct SliderControl {
    range: SliderRange,
    presenter: Arc<ResultPresenter>,
    tx: mpsc::UnboundedSender<f64>,
}

impl SliderControl {
    pub(crate) fn new(
        range: SliderRange,
        presenter: Arc<ResultPresenter>,
        tx: mpsc::UnboundedSender<f64>,
    ) -> Self {
        Self {
            range,
            presenter,
            tx,
        }
    }

    /// Feed a raw slider position.
    ///
    /// The echo shows the normalized value, not `raw`, matching what a
    /// stepped slider can actually display. Returns the normalized value,
    /// or `None` if `raw` was rejected.
    pub fn input(&self, raw: f64) -> Option<f64> {
        let value = self.range.normalize(raw)?;
        self.presenter.set_slider_echo(value);
        if self.tx.send(value).is_err() {
            trace!(value, "Pipeline stopped; slider value only echoed");
        }
        Some(value)
    }

    /// The slider's range.
    pub fn range(&self) -> SliderRange {
        self.range
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_range() {
        let range = SliderRange::default();
        assert_eq!(range.min, 10.0);
        assert_eq!(range.max, 300.0);
        assert_eq!(range.step, 5.0);
        assert_eq!(range.initial, 30.0);
        assert!(range.is_valid());
    }

    #[test]
    fn test_normalize_clamps_and_snaps() {
        let range = SliderRange::default();
        assert_eq!(range.normalize(0.0), Some(10.0));
        assert_eq!(range.normalize(1_000.0), Some(300.0));
        assert_eq!(range.normalize(12.0), Some(10.0));
        assert_eq!(range.normalize(13.0), Some(15.0));
        assert_eq!(range.normalize(f64::NAN), None);
        assert_eq!(range.normalize(f64::INFINITY), None);
    }

    #[test]
    fn test_max_off_grid_is_still_reachable() {
        let range = SliderRange {
            min: 10.0,
            max: 298.0,
            step: 5.0,
            initial: 30.0,
        };
        assert_eq!(range.normalize(400.0), Some(298.0));
    }

    #[test]
    fn test_input_echoes_before_sending() {
        let presenter = Arc::new(ResultPresenter::new(30.0));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let slider = SliderControl::new(SliderRange::default(), Arc::clone(&presenter), tx);

        assert_eq!(slider.input(47.0), Some(45.0));
        assert_eq!(presenter.snapshot().slider_echo, 45.0);
        assert_eq!(rx.try_recv().unwrap(), 45.0);
    }

    #[test]
    fn test_input_echoes_after_pipeline_stopped() {
        let presenter = Arc::new(ResultPresenter::new(30.0));
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let slider = SliderControl::new(SliderRange::default(), Arc::clone(&presenter), tx);

        assert_eq!(slider.input(100.0), Some(100.0));
        assert_eq!(presenter.snapshot().slider_echo, 100.0);
    }

    proptest! {
        #[test]
        fn prop_normalized_value_in_range_and_on_grid(raw in -1_000.0f64..1_000.0) {
            let range = SliderRange::default();
            let value = range.normalize(raw).unwrap();
            prop_assert!(value >= range.min && value <= range.max);
            let steps = (value - range.min) / range.step;
            prop_assert!((steps - steps.round()).abs() < 1e-9);
        }

        #[test]
        fn prop_normalize_is_idempotent(raw in -1_000.0f64..1_000.0) {
            let range = SliderRange::default();
            let once = range.normalize(raw).unwrap();
            prop_assert_eq!(range.normalize(once), Some(once));
        }
    }
}
