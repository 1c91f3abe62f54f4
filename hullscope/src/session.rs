//! Session bootstrap.
//!
//! [`AnalysisSession`] wires the components in order:
//!
//! 1. Create the render surface through the [`ViewCoordinator`]
//! 2. Wait for `ViewCreated`
//! 3. Resolve the output layer and start snapshotting the feature layer
//! 4. Start the [`AnalysisPipeline`] and hand out its [`SliderControl`]
//!
//! The feature snapshot is taken in the background; the pipeline accepts
//! slider input immediately and runs without feature data until it lands.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::analysis::{
    AnalysisPipeline, MetricsSnapshot, PipelineConfig, PipelineEvent, ResultPresenter,
    SliderControl,
};
use crate::config::HullscopeConfig;
use crate::geometry::{GeometryEngine, TimedEngine};
use crate::layers::{feature_channel, FeatureData, FeatureSource, LayerReadinessWatcher, OutputLayer};
use crate::view::{
    view_state_channel, ContainerAnchor, MapModel, RenderInitError, RenderSurface,
    RenderSurfaceFactory, ViewCoordinator, ViewState, ViewStateReader,
};

/// Errors that can occur while starting a session.
#[derive(Debug)]
pub enum SessionError {
    /// The render surface could not be created or never became ready.
    Render(RenderInitError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Render(e) => write!(f, "Failed to create map view: {}", e),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Render(e) => Some(e),
        }
    }
}

impl From<RenderInitError> for SessionError {
    fn from(e: RenderInitError) -> Self {
        SessionError::Render(e)
    }
}

/// Everything needed to start a session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub container: ContainerAnchor,
    pub map: Option<MapModel>,
    pub view: ViewState,
    pub pipeline: PipelineConfig,
    pub feature_layer: String,
    pub output_layer: String,
    pub ready_timeout: Option<Duration>,
    pub op_timeout: Option<Duration>,
}

impl SessionSettings {
    /// Settings taken from a loaded configuration.
    pub fn from_config(config: &HullscopeConfig, container: ContainerAnchor, map: MapModel) -> Self {
        Self {
            container,
            map: Some(map),
            view: config.view_state(),
            pipeline: config.pipeline_config(),
            feature_layer: config.layers.feature_layer.clone(),
            output_layer: config.layers.output_layer.clone(),
            ready_timeout: config.ready_timeout(),
            op_timeout: config.op_timeout(),
        }
    }
}

/// A running analysis session.
pub struct AnalysisSession {
    coordinator: ViewCoordinator,
    surface: Arc<dyn RenderSurface>,
    pipeline: AnalysisPipeline,
    slider: SliderControl,
    features: FeatureSource,
    output: Option<Arc<dyn OutputLayer>>,
    snapshot_task: JoinHandle<()>,
}

impl AnalysisSession {
    /// Start a session.
    ///
    /// Every geometry call made by the pipeline is bounded by
    /// `settings.op_timeout`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Render` if the surface cannot be created or
    /// fails to become ready. A missing feature or output layer is not an
    /// error: the session runs without feature data or without drawing.
    pub async fn start(
        factory: &dyn RenderSurfaceFactory,
        engine: Arc<dyn GeometryEngine>,
        settings: SessionSettings,
    ) -> Result<Self, SessionError> {
        let (writer, _reader) = view_state_channel(settings.view);
        let mut coordinator =
            ViewCoordinator::initialize(factory, settings.container, settings.map, writer)?;

        let view_created = coordinator.take_view_created().ok_or_else(|| {
            RenderInitError::NotReady("view-created event already consumed".to_string())
        })?;
        let surface = view_created.recv().await?.surface;

        let watcher = Arc::new(LayerReadinessWatcher::new(
            Arc::clone(&surface),
            settings.ready_timeout,
        ));

        let output = watcher.resolve_output_layer(&settings.output_layer);
        if output.is_none() {
            warn!(
                layer = %settings.output_layer,
                "Output layer not found; results will not be drawn"
            );
        }

        let (sink, features) = feature_channel();
        let snapshot_task = Arc::clone(&watcher).spawn_snapshot(settings.feature_layer.clone(), sink);

        let engine: Arc<dyn GeometryEngine> = Arc::new(TimedEngine::new(engine, settings.op_timeout));
        let (pipeline, slider) = AnalysisPipeline::start(
            settings.pipeline,
            engine,
            Arc::clone(&surface),
            features.clone(),
            output.clone(),
        );

        info!(
            feature_layer = %settings.feature_layer,
            output_layer = %settings.output_layer,
            "Analysis session started"
        );

        Ok(Self {
            coordinator,
            surface,
            pipeline,
            slider,
            features,
            output,
            snapshot_task,
        })
    }

    /// A handle for feeding slider input.
    pub fn slider(&self) -> SliderControl {
        self.slider.clone()
    }

    /// The mirrored viewport.
    pub fn view_state(&self) -> ViewStateReader {
        self.coordinator.view_state()
    }

    pub fn surface(&self) -> Arc<dyn RenderSurface> {
        Arc::clone(&self.surface)
    }

    pub fn presenter(&self) -> Arc<ResultPresenter> {
        self.pipeline.presenter()
    }

    pub fn output_layer(&self) -> Option<Arc<dyn OutputLayer>> {
        self.output.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.pipeline.subscribe()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.pipeline.metrics()
    }

    /// Current state of the feature snapshot.
    pub fn feature_data(&self) -> FeatureData {
        self.features.current()
    }

    /// Wait until the feature snapshot is captured or known to be unavailable.
    pub async fn wait_for_features(&self) -> FeatureData {
        self.features.clone().settled().await
    }

    /// Close the session's slider and wait for pending analysis to settle.
    /// Returns the pipeline's final counters.
    ///
    /// Slider handles obtained through [`slider`](Self::slider) must be
    /// dropped first.
    pub async fn finish(self) -> MetricsSnapshot {
        let Self {
            pipeline,
            slider,
            snapshot_task,
            ..
        } = self;
        drop(slider);
        let metrics = pipeline.finish().await;
        snapshot_task.abort();
        info!(
            requests = metrics.requests_issued,
            committed = metrics.committed,
            "Analysis session finished"
        );
        metrics
    }

    /// Cancel all pending work.
    pub async fn shutdown(self) -> MetricsSnapshot {
        self.snapshot_task.abort();
        let metrics = self.pipeline.shutdown().await;
        info!("Analysis session stopped");
        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{GeoEngine, Geometry};
    use crate::layers::{Feature, Layer};
    use crate::memory::{MemoryFeatureLayer, MemoryOutputLayer, MemorySurfaceFactory, SurfaceScript};

    fn map_with(output: bool) -> MapModel {
        let mut layers = vec![Layer::Feature(Arc::new(MemoryFeatureLayer::loaded(
            "volcanoesLayer",
            vec![
                Feature::new(Geometry::point(63.63, -19.62)),
                Feature::new(Geometry::point(64.42, -17.33)),
            ],
        )))];
        if output {
            layers.push(Layer::Graphics(Arc::new(MemoryOutputLayer::new(
                "analysisLayer",
            ))));
        }
        MapModel::new("dark-gray", layers)
    }

    fn settings(map: MapModel) -> SessionSettings {
        SessionSettings::from_config(
            &HullscopeConfig::default(),
            ContainerAnchor::new("mapView"),
            map,
        )
    }

    #[test]
    fn test_session_error_display() {
        let err = SessionError::from(RenderInitError::MissingAnchor);
        assert_eq!(
            err.to_string(),
            "Failed to create map view: Render anchor is unavailable"
        );
    }

    #[tokio::test]
    async fn test_session_runs_end_to_end() {
        let factory = MemorySurfaceFactory::new();
        let session = AnalysisSession::start(
            &factory,
            Arc::new(GeoEngine::default()),
            settings(map_with(true)),
        )
        .await
        .unwrap();

        assert!(matches!(
            session.wait_for_features().await,
            FeatureData::Ready(s) if s.len() == 2
        ));

        session.slider().input(40.0);
        let presenter = session.presenter();
        let output = session.output_layer().unwrap();
        session.finish().await;

        assert_eq!(presenter.snapshot().filtered_count, 2);
        assert_eq!(presenter.snapshot().slider_echo, 40.0);
        assert_eq!(output.graphics().len(), 2);
    }

    #[tokio::test]
    async fn test_session_without_output_layer_still_presents() {
        let factory = MemorySurfaceFactory::new();
        let session = AnalysisSession::start(
            &factory,
            Arc::new(GeoEngine::default()),
            settings(map_with(false)),
        )
        .await
        .unwrap();
        assert!(session.output_layer().is_none());
        session.wait_for_features().await;

        session.slider().input(40.0);
        let presenter = session.presenter();
        session.finish().await;

        assert_eq!(presenter.snapshot().filtered_count, 2);
        assert!(presenter.snapshot().buffer_area > 0.0);
    }

    #[tokio::test]
    async fn test_session_fails_when_surface_never_ready() {
        let factory =
            MemorySurfaceFactory::with_script(SurfaceScript::FailReady("no tiles".to_string()));
        let result = AnalysisSession::start(
            &factory,
            Arc::new(GeoEngine::default()),
            settings(map_with(true)),
        )
        .await;

        assert!(matches!(
            result,
            Err(SessionError::Render(RenderInitError::NotReady(_)))
        ));
    }
}
