//! Render surface interface.
//!
//! The render surface (pan/zoom, projection, tiles) is an external
//! collaborator. This module only describes how it is created and what the
//! analysis needs from it.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use super::state::{ViewChange, ViewProperty, ViewState};
use crate::geometry::{BoxFuture, Extent, LatLng};
use crate::layers::{FeatureQueryError, Layer, LayerView};

/// Errors raised while creating a render surface.
///
/// These are fatal to a session: without a map there is nothing to analyse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderInitError {
    /// No UI anchor to mount the surface in.
    #[error("Render anchor is unavailable")]
    MissingAnchor,

    /// No map model to display.
    #[error("Map model is unavailable")]
    MissingMapModel,

    /// The renderer backend refused to create a surface.
    #[error("Renderer backend error: {0}")]
    Backend(String),

    /// The surface was created but failed to become ready.
    #[error("Render surface failed to become ready: {0}")]
    NotReady(String),
}

/// Identifier of the UI element hosting the surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerAnchor(String);

impl ContainerAnchor {
    /// Create an anchor from an element id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The element id.
    pub fn id(&self) -> &str {
        &self.0
    }

    /// Whether the anchor points at something.
    pub fn is_available(&self) -> bool {
        !self.0.trim().is_empty()
    }
}

impl fmt::Display for ContainerAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The map displayed by a surface: a basemap plus operational layers.
#[derive(Clone)]
pub struct MapModel {
    /// Basemap identifier.
    pub basemap: String,
    /// Operational layers, bottom to top.
    pub layers: Vec<Layer>,
}

impl MapModel {
    /// Create a map model.
    pub fn new(basemap: impl Into<String>, layers: Vec<Layer>) -> Self {
        Self {
            basemap: basemap.into(),
            layers,
        }
    }
}

impl fmt::Debug for MapModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapModel")
            .field("basemap", &self.basemap)
            .field(
                "layers",
                &self.layers.iter().map(Layer::id).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Everything a factory needs to construct a surface.
#[derive(Debug, Clone)]
pub struct SurfaceOptions {
    /// Where to mount the surface.
    pub container: ContainerAnchor,
    /// What to display.
    pub map: MapModel,
    /// Initial zoom.
    pub zoom: f64,
    /// Initial center.
    pub center: LatLng,
    /// Initial rotation in degrees.
    pub rotation: f64,
}

impl SurfaceOptions {
    /// Options seeded from a view state.
    pub fn seeded(container: ContainerAnchor, map: MapModel, state: &ViewState) -> Self {
        Self {
            container,
            map,
            zoom: state.zoom,
            center: state.center,
            rotation: state.rotation,
        }
    }
}

/// A live render surface.
///
/// The surface exposes no setters. After construction it is the source of
/// truth for the viewport and only pushes changes out.
pub trait RenderSurface: Send + Sync {
    /// Resolves once the surface has finished its asynchronous setup.
    fn when_ready(&self) -> BoxFuture<'_, Result<(), RenderInitError>>;

    /// Subscribe to changes of the given viewport properties.
    ///
    /// The channel closes when the surface is torn down.
    fn watch_view(&self, properties: &[ViewProperty]) -> mpsc::UnboundedReceiver<ViewChange>;

    /// The map's layer collection.
    fn layers(&self) -> Vec<Layer>;

    /// The currently visible extent.
    fn extent(&self) -> Extent;

    /// Obtain the on-screen view of a layer.
    fn when_layer_view<'a>(
        &'a self,
        layer: &'a Layer,
    ) -> BoxFuture<'a, Result<Arc<dyn LayerView>, FeatureQueryError>>;
}

/// Creates render surfaces.
pub trait RenderSurfaceFactory: Send + Sync {
    /// Construct a surface. Readiness is reported later through
    /// [`RenderSurface::when_ready`].
    fn create(&self, options: SurfaceOptions) -> Result<Arc<dyn RenderSurface>, RenderInitError>;
}
