//! Waits for a feature layer to settle and captures its features once.
//!
//! # Readiness
//!
//! A layer view reports `updating = true` while it loads. The watcher waits
//! for the first moment, at or after the watch starts, where the flag reads
//! `false`, then issues exactly one query. Later refreshes of the view
//! (`false → true → false`) are not observed: the snapshot is a one-time
//! capture for the session.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::snapshot::{FeatureSink, FeatureSnapshot};
use super::{FeatureQueryError, Layer, OutputLayer};
use crate::view::RenderSurface;

/// Resolves layers on a ready surface and snapshots feature layers.
pub struct LayerReadinessWatcher {
    surface: Arc<dyn RenderSurface>,

    /// Upper bound on the whole settle-and-query sequence. `None` waits
    /// indefinitely.
    ready_timeout: Option<Duration>,
}

impl LayerReadinessWatcher {
    /// Create a watcher over a ready surface.
    pub fn new(surface: Arc<dyn RenderSurface>, ready_timeout: Option<Duration>) -> Self {
        Self {
            surface,
            ready_timeout,
        }
    }

    /// The first layer of the map matching `predicate`.
    pub fn resolve_layer(&self, predicate: impl Fn(&Layer) -> bool) -> Option<Layer> {
        self.surface.layers().into_iter().find(|layer| predicate(layer))
    }

    /// The feature layer with id `id`.
    pub fn resolve_feature_layer(&self, id: &str) -> Option<Layer> {
        self.resolve_layer(|layer| layer.id() == id && layer.as_feature().is_some())
    }

    /// The graphics layer with id `id`.
    pub fn resolve_output_layer(&self, id: &str) -> Option<Arc<dyn OutputLayer>> {
        self.resolve_layer(|layer| layer.id() == id && layer.as_graphics().is_some())
            .and_then(|layer| layer.as_graphics().cloned())
    }

    /// Wait for `layer`'s view to settle, then query its features once.
    ///
    /// # Errors
    ///
    /// - `NotQueryable` if `layer` is not a feature layer
    /// - `LayerViewUnavailable` / `QueryFailed` from the surface
    /// - `TimedOut` if the configured readiness timeout elapses
    /// - `Closed` if the view drops its `updating` watch before settling
    pub async fn await_queryable_layer_view(
        &self,
        layer: &Layer,
    ) -> Result<FeatureSnapshot, FeatureQueryError> {
        match self.ready_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.settle_and_query(layer))
                .await
                .map_err(|_| FeatureQueryError::TimedOut {
                    layer: layer.id().to_string(),
                    timeout,
                })?,
            None => self.settle_and_query(layer).await,
        }
    }

    async fn settle_and_query(&self, layer: &Layer) -> Result<FeatureSnapshot, FeatureQueryError> {
        if layer.as_feature().is_none() {
            return Err(FeatureQueryError::NotQueryable(layer.id().to_string()));
        }

        let view = self.surface.when_layer_view(layer).await?;
        let mut updating = view.updating();

        debug!(layer = layer.id(), "Waiting for layer view to finish updating");
        let settled = updating.wait_for(|busy| !*busy).await.is_ok();
        if !settled {
            return Err(FeatureQueryError::Closed);
        }

        let features = view.query_features().await?;
        info!(
            layer = layer.id(),
            features = features.len(),
            "Captured feature snapshot"
        );
        Ok(FeatureSnapshot::from_features(&features))
    }

    /// Resolve the feature layer `layer_id` in the background and publish
    /// the outcome into `sink`.
    pub fn spawn_snapshot(self: Arc<Self>, layer_id: String, sink: FeatureSink) -> JoinHandle<()> {
        tokio::spawn(async move {
            let outcome = match self.resolve_feature_layer(&layer_id) {
                Some(layer) => self.await_queryable_layer_view(&layer).await,
                None => Err(FeatureQueryError::LayerNotFound(layer_id.clone())),
            };
            if let Err(e) = &outcome {
                warn!(layer = %layer_id, error = %e, "Feature snapshot unavailable");
            }
            sink.publish(outcome);
        })
    }
}
