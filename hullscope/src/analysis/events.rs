//! Events broadcast by the pipeline.

use crate::geometry::GeometryOpError;

use super::pipeline::AnalysisRequest;

/// Something that happened to a request.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A value survived debounce and dedup.
    RequestIssued(AnalysisRequest),

    /// A chain's result replaced the output layer contents.
    Committed {
        generation: u64,
        distance: f64,
        filtered_count: usize,
        buffer_area: f64,
        hull_area: f64,
    },

    /// A chain finished or was cancelled after a newer request was issued.
    Superseded { generation: u64, latest: u64 },

    /// A geometry operation failed; the output layer is unchanged.
    Failed {
        generation: u64,
        error: GeometryOpError,
    },

    /// The chain ran before the feature snapshot was available.
    NoFeatureData { generation: u64 },
}

impl PipelineEvent {
    /// Generation of the request this event concerns.
    pub fn generation(&self) -> u64 {
        match self {
            PipelineEvent::RequestIssued(request) => request.generation,
            PipelineEvent::Committed { generation, .. }
            | PipelineEvent::Superseded { generation, .. }
            | PipelineEvent::Failed { generation, .. }
            | PipelineEvent::NoFeatureData { generation } => *generation,
        }
    }

    /// Whether this event ends a chain.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PipelineEvent::RequestIssued(_))
    }
}
