//! Debounced buffer/hull analysis driven by a slider.
//!
//! Raw slider values fan out two ways. Each one is echoed to the
//! [`ResultPresenter`] immediately; the same value also enters a
//! [`TriggerFilter`] that only lets it through once the slider has rested
//! for the quiet window and the value differs from the last one analysed.
//! Surviving values become [`AnalysisRequest`]s, each run as an ordered
//! chain of geometry operations whose result replaces the output layer.
//!
//! See [`pipeline`] for the chain and supersession rules.

mod events;
mod metrics;
pub mod pipeline;
mod presenter;
mod slider;
mod trigger;

pub use events::PipelineEvent;
pub use metrics::{AnalysisMetrics, MetricsSnapshot};
pub use pipeline::{
    AnalysisPipeline, AnalysisRequest, AnalysisResult, PipelineConfig, DEFAULT_EVENT_CAPACITY,
};
pub use presenter::{PresenterSnapshot, ResultPresenter};
pub use slider::{SliderControl, SliderRange};
pub use trigger::{TriggerConfig, TriggerFilter};
