//! The one-time feature snapshot and the slot that publishes it.
//!
//! The watcher fills the slot once; the pipeline reads whatever is there
//! when a request runs. A request that finds the slot still pending, or the
//! query failed, proceeds with no feature data.

use std::sync::Arc;

use tokio::sync::watch;

use super::{Feature, FeatureQueryError};
use crate::geometry::Geometry;

/// Geometries captured from a settled layer view. Immutable and cheap to clone.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureSnapshot {
    geometries: Arc<[Geometry]>,
}

impl FeatureSnapshot {
    /// Snapshot of the given geometries, in order.
    pub fn new(geometries: Vec<Geometry>) -> Self {
        Self {
            geometries: geometries.into(),
        }
    }

    /// Snapshot of the geometries of a query result.
    pub fn from_features(features: &[Feature]) -> Self {
        Self::new(features.iter().map(|f| f.geometry.clone()).collect())
    }

    pub fn geometries(&self) -> &[Geometry] {
        &self.geometries
    }

    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }
}

/// State of the feature snapshot slot.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureData {
    /// The layer view has not settled yet.
    Pending,
    /// The snapshot was captured.
    Ready(FeatureSnapshot),
    /// The snapshot will never materialize.
    Unavailable(FeatureQueryError),
}

/// Create a pending snapshot slot.
pub fn feature_channel() -> (FeatureSink, FeatureSource) {
    let (tx, rx) = watch::channel(FeatureData::Pending);
    (FeatureSink { tx }, FeatureSource { rx })
}

/// Write side of the slot. Consumed by [`publish`](Self::publish), so the
/// slot is filled at most once.
#[derive(Debug)]
pub struct FeatureSink {
    tx: watch::Sender<FeatureData>,
}

impl FeatureSink {
    /// Fill the slot with a query outcome.
    pub fn publish(self, outcome: Result<FeatureSnapshot, FeatureQueryError>) {
        let data = match outcome {
            Ok(snapshot) => FeatureData::Ready(snapshot),
            Err(e) => FeatureData::Unavailable(e),
        };
        self.tx.send_replace(data);
    }
}

/// Read side of the slot.
#[derive(Debug, Clone)]
pub struct FeatureSource {
    rx: watch::Receiver<FeatureData>,
}

impl FeatureSource {
    /// A source that is already filled with `snapshot`.
    pub fn ready(snapshot: FeatureSnapshot) -> Self {
        let (sink, source) = feature_channel();
        sink.publish(Ok(snapshot));
        source
    }

    /// Current slot state.
    pub fn current(&self) -> FeatureData {
        self.rx.borrow().clone()
    }

    /// The snapshot, if captured.
    pub fn snapshot(&self) -> Option<FeatureSnapshot> {
        match &*self.rx.borrow() {
            FeatureData::Ready(snapshot) => Some(snapshot.clone()),
            _ => None,
        }
    }

    /// Wait until the slot leaves `Pending`.
    pub async fn settled(&mut self) -> FeatureData {
        let settled = self
            .rx
            .wait_for(|data| !matches!(data, FeatureData::Pending))
            .await
            .map(|data| data.clone());
        // Err means the sink was dropped without publishing
        settled.unwrap_or_else(|_| self.current())
    }
}
