//! In-memory render backend.
//!
//! A headless implementation of every renderer-side interface. The CLI
//! replays scenarios against it and tests use it to script renderer
//! behavior: user pans and zooms, layer views that load late, queries that
//! fail, output layers that record every state they pass through.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::geometry::{BoxFuture, Extent, LatLng};
use crate::layers::{
    Feature, FeatureLayer, FeatureQueryError, Graphic, GraphicRole, Layer, LayerView, OutputLayer,
};
use crate::view::{
    RenderInitError, RenderSurface, RenderSurfaceFactory, SurfaceOptions, ViewChange,
    ViewProperty, ViewState, ViewValue,
};

// =============================================================================
// Layers
// =============================================================================

/// Layer view over a fixed feature list.
///
/// Starts out `updating`; call [`set_updating`](Self::set_updating) to
/// simulate the load finishing.
#[derive(Debug)]
pub struct MemoryLayerView {
    updating: watch::Sender<bool>,
    features: Vec<Feature>,
    failure: RwLock<Option<String>>,
    queries: AtomicUsize,
}

impl MemoryLayerView {
    fn new(features: Vec<Feature>, updating: bool) -> Self {
        Self {
            updating: watch::Sender::new(updating),
            features,
            failure: RwLock::new(None),
            queries: AtomicUsize::new(0),
        }
    }

    /// Set the `updating` flag.
    pub fn set_updating(&self, updating: bool) {
        self.updating.send_replace(updating);
    }

    /// Make every subsequent query fail with `reason`.
    pub fn fail_queries(&self, reason: impl Into<String>) {
        *self.failure.write() = Some(reason.into());
    }

    /// Number of queries issued so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl LayerView for MemoryLayerView {
    fn updating(&self) -> watch::Receiver<bool> {
        self.updating.subscribe()
    }

    fn query_features(&self) -> BoxFuture<'_, Result<Vec<Feature>, FeatureQueryError>> {
        Box::pin(async move {
            self.queries.fetch_add(1, Ordering::SeqCst);
            let failure = self.failure.read().clone();
            match failure {
                Some(reason) => Err(FeatureQueryError::QueryFailed(reason)),
                None => Ok(self.features.clone()),
            }
        })
    }
}

/// Feature layer backed by a [`MemoryLayerView`].
#[derive(Debug)]
pub struct MemoryFeatureLayer {
    id: String,
    view: Arc<MemoryLayerView>,
}

impl MemoryFeatureLayer {
    /// A layer whose view is still loading.
    pub fn new(id: impl Into<String>, features: Vec<Feature>) -> Self {
        Self {
            id: id.into(),
            view: Arc::new(MemoryLayerView::new(features, true)),
        }
    }

    /// A layer whose view has already finished loading.
    pub fn loaded(id: impl Into<String>, features: Vec<Feature>) -> Self {
        Self {
            id: id.into(),
            view: Arc::new(MemoryLayerView::new(features, false)),
        }
    }

    /// The layer's view.
    pub fn view(&self) -> Arc<MemoryLayerView> {
        Arc::clone(&self.view)
    }
}

impl FeatureLayer for MemoryFeatureLayer {
    fn id(&self) -> &str {
        &self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Output layer that records every state it passes through.
#[derive(Debug)]
pub struct MemoryOutputLayer {
    id: String,
    graphics: Mutex<Vec<Graphic>>,

    /// Roles present after each mutation, in order.
    history: Mutex<Vec<Vec<GraphicRole>>>,
}

impl MemoryOutputLayer {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            graphics: Mutex::new(Vec::new()),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Every state the layer has been observed in, as sorted role lists.
    pub fn history(&self) -> Vec<Vec<GraphicRole>> {
        self.history.lock().clone()
    }

    fn record(&self, graphics: &[Graphic]) {
        let mut roles: Vec<GraphicRole> = graphics.iter().map(|g| g.role).collect();
        roles.sort();
        self.history.lock().push(roles);
    }
}

impl OutputLayer for MemoryOutputLayer {
    fn id(&self) -> &str {
        &self.id
    }

    fn remove_all(&self) {
        let mut graphics = self.graphics.lock();
        graphics.clear();
        self.record(&graphics);
    }

    fn add_many(&self, added: Vec<Graphic>) {
        let mut graphics = self.graphics.lock();
        graphics.extend(added);
        self.record(&graphics);
    }

    fn graphics(&self) -> Vec<Graphic> {
        self.graphics.lock().clone()
    }

    fn replace_all(&self, replacement: Vec<Graphic>) {
        let mut graphics = self.graphics.lock();
        *graphics = replacement;
        self.record(&graphics);
    }
}

// =============================================================================
// Surface
// =============================================================================

struct ViewWatcher {
    properties: Vec<ViewProperty>,
    tx: mpsc::UnboundedSender<ViewChange>,
}

/// Headless render surface.
pub struct MemorySurface {
    view: Mutex<ViewState>,
    extent: RwLock<Extent>,
    layers: Vec<Layer>,
    ready: watch::Sender<Option<Result<(), RenderInitError>>>,
    watchers: Mutex<Vec<ViewWatcher>>,
    emitted: AtomicUsize,
    last_change: Mutex<Option<ViewChange>>,
}

impl MemorySurface {
    /// A surface that is ready immediately.
    pub fn new(view: ViewState, extent: Extent, layers: Vec<Layer>) -> Self {
        let surface = Self::pending(view, extent, layers);
        surface.set_ready(Ok(()));
        surface
    }

    /// A surface that stays unready until [`set_ready`](Self::set_ready).
    pub fn pending(view: ViewState, extent: Extent, layers: Vec<Layer>) -> Self {
        Self {
            view: Mutex::new(view),
            extent: RwLock::new(extent),
            layers,
            ready: watch::Sender::new(None),
            watchers: Mutex::new(Vec::new()),
            emitted: AtomicUsize::new(0),
            last_change: Mutex::new(None),
        }
    }

    /// Resolve readiness.
    pub fn set_ready(&self, result: Result<(), RenderInitError>) {
        self.ready.send_replace(Some(result));
    }

    /// Change the visible extent.
    pub fn set_extent(&self, extent: Extent) {
        *self.extent.write() = extent;
    }

    /// Current viewport.
    pub fn view(&self) -> ViewState {
        *self.view.lock()
    }

    /// Simulate the user zooming.
    pub fn user_zoom(&self, zoom: f64) {
        self.user_change(ViewValue::Zoom(zoom));
    }

    /// Simulate the user panning.
    pub fn user_pan(&self, center: LatLng) {
        self.user_change(ViewValue::Center(center));
    }

    /// Simulate the user rotating.
    pub fn user_rotate(&self, rotation: f64) {
        self.user_change(ViewValue::Rotation(rotation));
    }

    /// Number of change notifications emitted.
    pub fn emitted_changes(&self) -> usize {
        self.emitted.load(Ordering::SeqCst)
    }

    /// The most recent change notification.
    pub fn last_change(&self) -> Option<ViewChange> {
        *self.last_change.lock()
    }

    fn user_change(&self, new_value: ViewValue) {
        let change = {
            let mut view = self.view.lock();
            let old_value = match new_value {
                ViewValue::Zoom(_) => ViewValue::Zoom(view.zoom),
                ViewValue::Center(_) => ViewValue::Center(view.center),
                ViewValue::Rotation(_) => ViewValue::Rotation(view.rotation),
            };
            *view = view.with_value(new_value.property(), new_value);
            ViewChange::new(new_value, old_value)
        };

        self.emitted.fetch_add(1, Ordering::SeqCst);
        *self.last_change.lock() = Some(change);

        self.watchers.lock().retain(|watcher| {
            if !watcher.properties.contains(&change.property) {
                return true;
            }
            watcher.tx.send(change).is_ok()
        });
    }
}

impl RenderSurface for MemorySurface {
    fn when_ready(&self) -> BoxFuture<'_, Result<(), RenderInitError>> {
        let mut ready = self.ready.subscribe();
        Box::pin(async move {
            let outcome = ready
                .wait_for(Option::is_some)
                .await
                .map(|state| state.clone());
            match outcome {
                Ok(Some(result)) => result,
                _ => Err(RenderInitError::NotReady("surface torn down".to_string())),
            }
        })
    }

    fn watch_view(&self, properties: &[ViewProperty]) -> mpsc::UnboundedReceiver<ViewChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.watchers.lock().push(ViewWatcher {
            properties: properties.to_vec(),
            tx,
        });
        rx
    }

    fn layers(&self) -> Vec<Layer> {
        self.layers.clone()
    }

    fn extent(&self) -> Extent {
        *self.extent.read()
    }

    fn when_layer_view<'a>(
        &'a self,
        layer: &'a Layer,
    ) -> BoxFuture<'a, Result<Arc<dyn LayerView>, FeatureQueryError>> {
        Box::pin(async move {
            let feature = layer
                .as_feature()
                .ok_or_else(|| FeatureQueryError::NotQueryable(layer.id().to_string()))?;
            let memory = feature
                .as_any()
                .downcast_ref::<MemoryFeatureLayer>()
                .ok_or_else(|| {
                    FeatureQueryError::LayerViewUnavailable(format!(
                        "layer '{}' was not created by the memory backend",
                        layer.id()
                    ))
                })?;
            Ok(memory.view() as Arc<dyn LayerView>)
        })
    }
}

// =============================================================================
// Factory
// =============================================================================

/// How surfaces built by a [`MemorySurfaceFactory`] behave.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SurfaceScript {
    /// Ready immediately.
    #[default]
    Ready,
    /// Created, but readiness fails with the given reason.
    FailReady(String),
    /// `create` itself fails with a backend error.
    RejectCreate(String),
}

/// Builds [`MemorySurface`]s and remembers what it built.
pub struct MemorySurfaceFactory {
    script: SurfaceScript,
    extent: Extent,
    surfaces: Mutex<Vec<Arc<MemorySurface>>>,
    options: Mutex<Vec<SurfaceOptions>>,
}

impl Default for MemorySurfaceFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySurfaceFactory {
    /// A factory building surfaces that are ready immediately and show the
    /// whole world.
    pub fn new() -> Self {
        Self::with_script(SurfaceScript::Ready)
    }

    pub fn with_script(script: SurfaceScript) -> Self {
        Self {
            script,
            extent: Extent::world(),
            surfaces: Mutex::new(Vec::new()),
            options: Mutex::new(Vec::new()),
        }
    }

    /// Builder: initial visible extent of created surfaces.
    pub fn with_extent(mut self, extent: Extent) -> Self {
        self.extent = extent;
        self
    }

    /// Number of surfaces created.
    pub fn created_count(&self) -> usize {
        self.surfaces.lock().len()
    }

    /// The most recently created surface.
    pub fn last_surface(&self) -> Option<Arc<MemorySurface>> {
        self.surfaces.lock().last().cloned()
    }

    /// Options passed to the most recent `create` call.
    pub fn last_options(&self) -> Option<SurfaceOptions> {
        self.options.lock().last().cloned()
    }
}

impl RenderSurfaceFactory for MemorySurfaceFactory {
    fn create(&self, options: SurfaceOptions) -> Result<Arc<dyn RenderSurface>, RenderInitError> {
        if let SurfaceScript::RejectCreate(reason) = &self.script {
            return Err(RenderInitError::Backend(reason.clone()));
        }

        let view = ViewState {
            zoom: options.zoom,
            center: options.center,
            rotation: options.rotation,
        };
        let surface = Arc::new(MemorySurface::pending(
            view,
            self.extent,
            options.map.layers.clone(),
        ));
        match &self.script {
            SurfaceScript::FailReady(reason) => {
                surface.set_ready(Err(RenderInitError::NotReady(reason.clone())))
            }
            _ => surface.set_ready(Ok(())),
        }

        let layer_ids: HashMap<&str, bool> = options
            .map
            .layers
            .iter()
            .map(|layer| (layer.id(), layer.as_feature().is_some()))
            .collect();
        debug!(
            container = %options.container,
            layers = ?layer_ids,
            "Created in-memory surface"
        );

        self.options.lock().push(options);
        self.surfaces.lock().push(Arc::clone(&surface));
        Ok(surface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{EngineHandle, Geometry, Polygon};

    #[test]
    fn test_output_layer_records_each_mutation() {
        let layer = MemoryOutputLayer::new("analysisLayer");
        layer.add_many(vec![Graphic::buffer(Polygon::opaque(EngineHandle(1)))]);
        layer.remove_all();
        layer.replace_all(vec![
            Graphic::hull(Polygon::opaque(EngineHandle(3))),
            Graphic::buffer(Polygon::opaque(EngineHandle(2))),
        ]);

        assert_eq!(
            layer.history(),
            vec![
                vec![GraphicRole::Buffer],
                vec![],
                vec![GraphicRole::Buffer, GraphicRole::Hull],
            ]
        );
        assert_eq!(layer.graphics().len(), 2);
    }

    #[tokio::test]
    async fn test_layer_view_counts_queries() {
        let layer = MemoryFeatureLayer::loaded(
            "volcanoesLayer",
            vec![Feature::new(Geometry::point(64.0, -19.0))],
        );
        let view = layer.view();

        assert!(!*view.updating().borrow());
        assert_eq!(view.query_features().await.unwrap().len(), 1);
        assert_eq!(view.query_count(), 1);

        view.fail_queries("timeout");
        assert!(view.query_features().await.is_err());
        assert_eq!(view.query_count(), 2);
    }

    #[tokio::test]
    async fn test_pending_surface_becomes_ready() {
        let surface = Arc::new(MemorySurface::pending(
            ViewState::default(),
            Extent::world(),
            Vec::new(),
        ));
        let waiter = {
            let surface = Arc::clone(&surface);
            tokio::spawn(async move { surface.when_ready().await })
        };

        tokio::task::yield_now().await;
        surface.set_ready(Ok(()));

        assert_eq!(waiter.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_watch_filters_by_property() {
        let surface = MemorySurface::new(ViewState::default(), Extent::world(), Vec::new());
        let mut zoom_only = surface.watch_view(&[ViewProperty::Zoom]);

        surface.user_rotate(10.0);
        surface.user_zoom(8.0);

        let change = zoom_only.recv().await.unwrap();
        assert_eq!(change.new_value, ViewValue::Zoom(8.0));
        assert_eq!(change.old_value, ViewValue::Zoom(6.0));
        assert!(zoom_only.try_recv().is_err());
        assert_eq!(surface.emitted_changes(), 2);
    }

    #[tokio::test]
    async fn test_layer_view_for_graphics_layer_is_refused() {
        let output: Arc<dyn OutputLayer> = Arc::new(MemoryOutputLayer::new("analysisLayer"));
        let layer = Layer::Graphics(output);
        let surface = MemorySurface::new(ViewState::default(), Extent::world(), vec![layer.clone()]);

        let result = surface.when_layer_view(&layer).await;
        assert!(matches!(result, Err(FeatureQueryError::NotQueryable(_))));
    }

    #[test]
    fn test_factory_rejects_when_scripted() {
        let factory = MemorySurfaceFactory::with_script(SurfaceScript::RejectCreate(
            "context lost".to_string(),
        ));
        let options = SurfaceOptions::seeded(
            crate::view::ContainerAnchor::new("mapView"),
            crate::view::MapModel::new("dark-gray", Vec::new()),
            &ViewState::default(),
        );

        assert!(factory.create(options).is_err());
        assert_eq!(factory.created_count(), 0);
    }
}
