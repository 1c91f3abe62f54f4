//! Map layers as seen by the analysis.
//!
//! A map carries a closed set of layer kinds:
//!
//! - **Feature layers** hold the input data (e.g. volcano locations). Their
//!   on-screen [`LayerView`] is what gets queried once it settles.
//! - **Graphics layers** ([`OutputLayer`]) hold the rendered analysis result
//!   and are written only by the pipeline.
//!
//! [`LayerReadinessWatcher`] resolves both kinds and turns the feature layer
//! into a one-time [`FeatureSnapshot`].

mod graphics;
mod snapshot;
mod watcher;

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;

use crate::geometry::{BoxFuture, Geometry};

pub use graphics::{FillSymbol, Graphic, GraphicRole, LineSymbol, Rgba};
pub use snapshot::{feature_channel, FeatureData, FeatureSink, FeatureSnapshot, FeatureSource};
pub use watcher::LayerReadinessWatcher;

/// Errors raised while resolving or querying a feature layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureQueryError {
    /// No layer with this id exists in the map.
    #[error("Layer '{0}' was not found")]
    LayerNotFound(String),

    /// The layer exists but holds no queryable features.
    #[error("Layer '{0}' is not a feature layer")]
    NotQueryable(String),

    /// The surface could not produce a view for the layer.
    #[error("Layer view unavailable: {0}")]
    LayerViewUnavailable(String),

    /// The feature query was rejected.
    #[error("Feature query failed: {0}")]
    QueryFailed(String),

    /// The layer view did not finish updating in time.
    #[error("Layer '{layer}' did not settle within {timeout:?}")]
    TimedOut {
        layer: String,
        timeout: std::time::Duration,
    },

    /// The layer view went away before it finished updating.
    #[error("Layer view closed before it finished updating")]
    Closed,
}

/// A feature returned by a layer query.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Feature geometry.
    pub geometry: Geometry,
    /// Feature attributes, keyed by field name.
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Feature {
    /// A feature with no attributes.
    pub fn new(geometry: impl Into<Geometry>) -> Self {
        Self {
            geometry: geometry.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Builder: add an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }
}

/// A layer holding queryable features.
pub trait FeatureLayer: Send + Sync {
    /// Layer id.
    fn id(&self) -> &str;

    /// Allows a backend to recover its concrete layer type.
    fn as_any(&self) -> &dyn Any;
}

/// The on-screen representation of a feature layer.
pub trait LayerView: Send + Sync {
    /// Watch the `updating` flag. `true` while the view is loading data.
    fn updating(&self) -> watch::Receiver<bool>;

    /// Query all features currently held by the view.
    fn query_features(&self) -> BoxFuture<'_, Result<Vec<Feature>, FeatureQueryError>>;
}

/// A layer holding graphics drawn by the analysis.
pub trait OutputLayer: Send + Sync {
    /// Layer id.
    fn id(&self) -> &str;

    /// Remove every graphic.
    fn remove_all(&self);

    /// Add graphics in order.
    fn add_many(&self, graphics: Vec<Graphic>);

    /// The graphics currently displayed.
    fn graphics(&self) -> Vec<Graphic>;

    /// Clear the layer and add `graphics` as one unit.
    ///
    /// Implementations that can swap contents in a single step should
    /// override this.
    fn replace_all(&self, graphics: Vec<Graphic>) {
        self.remove_all();
        self.add_many(graphics);
    }
}

/// A map layer.
#[derive(Clone)]
pub enum Layer {
    /// Input features.
    Feature(Arc<dyn FeatureLayer>),
    /// Analysis output.
    Graphics(Arc<dyn OutputLayer>),
}

impl Layer {
    /// Layer id.
    pub fn id(&self) -> &str {
        match self {
            Layer::Feature(layer) => layer.id(),
            Layer::Graphics(layer) => layer.id(),
        }
    }

    /// The feature layer, if this is one.
    pub fn as_feature(&self) -> Option<&Arc<dyn FeatureLayer>> {
        match self {
            Layer::Feature(layer) => Some(layer),
            Layer::Graphics(_) => None,
        }
    }

    /// The graphics layer, if this is one.
    pub fn as_graphics(&self) -> Option<&Arc<dyn OutputLayer>> {
        match self {
            Layer::Graphics(layer) => Some(layer),
            Layer::Feature(_) => None,
        }
    }
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Layer::Feature(layer) => f.debug_tuple("Feature").field(&layer.id()).finish(),
            Layer::Graphics(layer) => f.debug_tuple("Graphics").field(&layer.id()).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryFeatureLayer, MemoryOutputLayer};

    #[test]
    fn test_layer_kind_accessors() {
        let feature = Layer::Feature(Arc::new(MemoryFeatureLayer::new("volcanoesLayer", vec![])));
        let output = Layer::Graphics(Arc::new(MemoryOutputLayer::new("analysisLayer")));

        assert_eq!(feature.id(), "volcanoesLayer");
        assert!(feature.as_feature().is_some());
        assert!(feature.as_graphics().is_none());

        assert_eq!(output.id(), "analysisLayer");
        assert!(output.as_graphics().is_some());
        assert!(output.as_feature().is_none());
    }

    #[test]
    fn test_layer_debug_shows_id() {
        let output = Layer::Graphics(Arc::new(MemoryOutputLayer::new("analysisLayer")));
        assert_eq!(format!("{:?}", output), "Graphics(\"analysisLayer\")");
    }

    #[test]
    fn test_feature_attributes() {
        let feature = Feature::new(crate::geometry::LatLng::new(63.63, -19.62))
            .with_attribute("name", serde_json::json!("Eyjafjallajökull"));
        assert_eq!(
            feature.attributes.get("name"),
            Some(&serde_json::json!("Eyjafjallajökull"))
        );
    }

    #[test]
    fn test_query_error_display() {
        let err = FeatureQueryError::TimedOut {
            layer: "volcanoesLayer".to_string(),
            timeout: std::time::Duration::from_secs(30),
        };
        assert_eq!(
            err.to_string(),
            "Layer 'volcanoesLayer' did not settle within 30s"
        );
    }
}
