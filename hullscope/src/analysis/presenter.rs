//! Scalar outputs shown next to the map.

use std::fmt;

use parking_lot::RwLock;

use super::pipeline::AnalysisResult;

/// Copy of the presenter state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PresenterSnapshot {
    /// Features inside the visible extent for the committed result.
    pub filtered_count: usize,
    /// Area of the unioned buffer in km².
    pub buffer_area: f64,
    /// Area of the convex hull in km².
    pub hull_area: f64,
    /// Latest slider position in km, updated on every input.
    pub slider_echo: f64,
}

impl fmt::Display for PresenterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "buffer distance: {} km", self.slider_echo)?;
        writeln!(f, "features buffered in extent: {}", self.filtered_count)?;
        writeln!(f, "unioned buffer area: {:.1} km²", self.buffer_area)?;
        write!(f, "convex hull area: {:.1} km²", self.hull_area)
    }
}

/// Latest analysis outputs.
///
/// Written by the slider echo and by pipeline commits. Readers always see
/// a consistent snapshot.
#[derive(Debug, Default)]
pub struct ResultPresenter {
    state: RwLock<PresenterSnapshot>,
}

impl ResultPresenter {
    /// A presenter showing `initial_echo` and no results yet.
    pub fn new(initial_echo: f64) -> Self {
        Self {
            state: RwLock::new(PresenterSnapshot {
                slider_echo: initial_echo,
                ..PresenterSnapshot::default()
            }),
        }
    }

    pub fn snapshot(&self) -> PresenterSnapshot {
        *self.state.read()
    }

    pub fn set_slider_echo(&self, value: f64) {
        self.state.write().slider_echo = value;
    }

    /// Record a request that ran without feature data.
    pub fn set_filtered_count(&self, count: usize) {
        self.state.write().filtered_count = count;
    }

    /// Record a committed result.
    pub fn publish(&self, result: &AnalysisResult) {
        let mut state = self.state.write();
        state.filtered_count = result.filtered_count;
        state.buffer_area = result.buffer_area;
        state.hull_area = result.hull_area;
    }
}
