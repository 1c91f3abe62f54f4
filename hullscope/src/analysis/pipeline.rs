//! The reactive analysis pipeline.
//!
//! # Architecture
//!
//! ```text
//! SliderControl ──► echo ──► ResultPresenter.slider_echo
//!       │
//!       ▼ (unbounded channel)
//! ┌──────────────────┐
//! │  driver loop     │  TriggerFilter: 250ms quiet window, then distinct
//! └────────┬─────────┘
//!          │ AnalysisRequest { distance, generation }
//!          ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │ chain task (one per request, own CancellationToken)          │
//! │                                                              │
//! │  filter by extent ──► buffer ──┬──► buffer area ─────────┐   │
//! │                                └──► hull ──► hull area ──┤   │
//! │                                                          ▼   │
//! │                          commit (generation == latest?)      │
//! └──────────────────────────────────────────────────────────────┘
//!          │
//!          ▼
//!  OutputLayer.replace_all([buffer, hull]) + ResultPresenter.publish
//! ```
//!
//! # Supersession
//!
//! Only the most recently issued request may commit. Every chain carries
//! its generation and the commit step compares it with the latest issued
//! generation while holding the commit lock. When `cancel_superseded` is
//! set, issuing a request also cancels the previous chain's token so stale
//! chains stop at their next suspension point instead of running to
//! completion.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::events::PipelineEvent;
use super::metrics::{AnalysisMetrics, MetricsSnapshot};
use super::presenter::ResultPresenter;
use super::slider::{SliderControl, SliderRange};
use super::trigger::{TriggerConfig, TriggerFilter};
use crate::geometry::{AreaUnit, Geometry, GeometryEngine, GeometryOp, GeometryOpError, LengthUnit};
use crate::layers::{FeatureSource, Graphic, OutputLayer};
use crate::view::RenderSurface;

/// Default capacity of the event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// A value that survived the trigger stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisRequest {
    /// Buffer distance in kilometers.
    pub distance: f64,
    /// Issue order, starting at 1.
    pub generation: u64,
}

/// The outputs of one completed chain.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub generation: u64,
    pub distance: f64,
    pub filtered_count: usize,
    /// km²
    pub buffer_area: f64,
    /// km²
    pub hull_area: f64,
    pub buffer_graphic: Option<Graphic>,
    pub hull_graphic: Option<Graphic>,
}

impl AnalysisResult {
    /// Result for a request with no features in view.
    pub fn empty(generation: u64, distance: f64) -> Self {
        Self {
            generation,
            distance,
            filtered_count: 0,
            buffer_area: 0.0,
            hull_area: 0.0,
            buffer_graphic: None,
            hull_graphic: None,
        }
    }

    /// Graphics to draw, buffer first.
    pub fn graphics(&self) -> Vec<Graphic> {
        self.buffer_graphic
            .iter()
            .chain(self.hull_graphic.iter())
            .cloned()
            .collect()
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub trigger: TriggerConfig,
    pub slider: SliderRange,
    /// Cancel the in-flight chain when a newer request is issued.
    pub cancel_superseded: bool,
    pub event_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            trigger: TriggerConfig::default(),
            slider: SliderRange::default(),
            cancel_superseded: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl PipelineConfig {
    pub fn with_quiet_window(mut self, quiet_window: std::time::Duration) -> Self {
        self.trigger.quiet_window = quiet_window;
        self
    }

    pub fn with_slider(mut self, slider: SliderRange) -> Self {
        self.slider = slider;
        self
    }

    pub fn with_cancel_superseded(mut self, cancel: bool) -> Self {
        self.cancel_superseded = cancel;
        self
    }
}

/// State shared by the driver loop and chain tasks.
struct Shared {
    config: PipelineConfig,
    engine: Arc<dyn GeometryEngine>,
    surface: Arc<dyn RenderSurface>,
    features: FeatureSource,
    output: Option<Arc<dyn OutputLayer>>,
    presenter: Arc<ResultPresenter>,
    metrics: AnalysisMetrics,
    events: broadcast::Sender<PipelineEvent>,

    /// Latest issued generation. 0 before the first request.
    issued: AtomicU64,

    /// Commit lock, guarding the committed result.
    current: Mutex<Option<AnalysisResult>>,

    /// Token of the most recently issued chain.
    in_flight: Mutex<Option<CancellationToken>>,

    chains: Mutex<JoinSet<()>>,
    shutdown: CancellationToken,
}

impl Shared {
    fn latest_generation(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    fn emit(&self, event: PipelineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn issue(self: &Arc<Self>, distance: f64) {
        let generation = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let request = AnalysisRequest {
            distance,
            generation,
        };

        self.metrics.request_issued();
        info!(generation, distance_km = distance, "Analysis requested");
        self.emit(PipelineEvent::RequestIssued(request));

        let token = self.shutdown.child_token();
        let previous = self.in_flight.lock().replace(token.clone());
        if let Some(previous) = previous {
            if self.config.cancel_superseded {
                previous.cancel();
            }
        }

        let shared = Arc::clone(self);
        let mut chains = self.chains.lock();
        while chains.try_join_next().is_some() {}
        chains.spawn(shared.run_chain(request, token));
    }

    async fn drain_chains(&self) {
        let mut chains = std::mem::take(&mut *self.chains.lock());
        while let Some(joined) = chains.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Analysis chain task failed");
            }
        }
    }

    async fn run_chain(self: Arc<Self>, request: AnalysisRequest, cancel: CancellationToken) {
        let generation = request.generation;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            outcome = self.compute(request) => Some(outcome),
        };

        let Some(outcome) = outcome else {
            self.metrics.chain_cancelled();
            let latest = self.latest_generation();
            debug!(generation, latest, "Analysis chain cancelled");
            if latest != generation {
                self.emit(PipelineEvent::Superseded { generation, latest });
            }
            return;
        };

        match outcome {
            Ok(Some(result)) => self.commit(result),
            Ok(None) => self.record_missing_data(request),
            Err(error) => {
                self.metrics.chain_failed();
                warn!(
                    generation,
                    distance_km = request.distance,
                    error = %error,
                    "Analysis chain failed"
                );
                self.emit(PipelineEvent::Failed { generation, error });
            }
        }
    }

    /// Run the chain's stages. `Ok(None)` means no feature data yet.
    async fn compute(
        &self,
        request: AnalysisRequest,
    ) -> Result<Option<AnalysisResult>, GeometryOpError> {
        let generation = request.generation;
        let Some(snapshot) = self.features.snapshot() else {
            return Ok(None);
        };

        let extent = self.surface.extent();
        let in_view: Vec<Geometry> = snapshot
            .geometries()
            .iter()
            .filter(|geometry| extent.contains(geometry))
            .cloned()
            .collect();
        let filtered_count = in_view.len();
        debug!(
            generation,
            filtered_count,
            total = snapshot.len(),
            "Filtered features to visible extent"
        );

        if in_view.is_empty() {
            return Ok(Some(AnalysisResult::empty(generation, request.distance)));
        }

        let buffer = self
            .engine
            .geodesic_buffer(&in_view, request.distance, LengthUnit::Kilometers, true)
            .await?
            .into_iter()
            .next()
            .ok_or(GeometryOpError::EmptyResult(GeometryOp::Buffer))?;
        trace!(generation, buffer = %buffer.handle(), "Buffer computed");

        let hull_with_area = async {
            let hull = self.engine.convex_hull(&buffer, true).await?;
            let hull_area = self
                .engine
                .geodesic_area(&hull, AreaUnit::SquareKilometers)
                .await?;
            Ok::<_, GeometryOpError>((hull, hull_area))
        };
        let (buffer_area, (hull, hull_area)) = tokio::try_join!(
            self.engine
                .geodesic_area(&buffer, AreaUnit::SquareKilometers),
            hull_with_area
        )?;

        Ok(Some(AnalysisResult {
            generation,
            distance: request.distance,
            filtered_count,
            buffer_area,
            hull_area,
            buffer_graphic: Some(Graphic::buffer(buffer)),
            hull_graphic: Some(Graphic::hull(hull)),
        }))
    }

    fn commit(&self, result: AnalysisResult) {
        let generation = result.generation;
        let mut current = self.current.lock();

        let latest = self.latest_generation();
        if generation != latest {
            drop(current);
            self.metrics.chain_superseded();
            debug!(generation, latest, "Discarding superseded result");
            self.emit(PipelineEvent::Superseded { generation, latest });
            return;
        }

        match &self.output {
            Some(output) => output.replace_all(result.graphics()),
            None => debug!(generation, "No output layer; result not drawn"),
        }
        self.presenter.publish(&result);
        self.metrics.chain_committed();

        info!(
            generation,
            distance_km = result.distance,
            filtered_count = result.filtered_count,
            buffer_area_km2 = result.buffer_area,
            hull_area_km2 = result.hull_area,
            "Analysis committed"
        );
        self.emit(PipelineEvent::Committed {
            generation,
            distance: result.distance,
            filtered_count: result.filtered_count,
            buffer_area: result.buffer_area,
            hull_area: result.hull_area,
        });
        *current = Some(result);
    }

    fn record_missing_data(&self, request: AnalysisRequest) {
        let generation = request.generation;
        {
            let _current = self.current.lock();
            if generation == self.latest_generation() {
                self.presenter.set_filtered_count(0);
            }
        }
        self.metrics.chain_without_data();
        debug!(generation, "Feature snapshot not available; skipping analysis");
        self.emit(PipelineEvent::NoFeatureData { generation });
    }
}

/// Sleep until `deadline`, or forever if there is none.
async fn quiet_window_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Turn raw slider values into requests until the slider closes or the
/// pipeline shuts down.
async fn drive(shared: Arc<Shared>, mut inputs: mpsc::UnboundedReceiver<f64>) {
    let mut filter = TriggerFilter::new(shared.config.trigger.clone());
    debug!(
        quiet_window_ms = shared.config.trigger.quiet_window.as_millis() as u64,
        "Analysis trigger started"
    );

    loop {
        let deadline = filter.deadline();

        tokio::select! {
            biased;

            _ = shared.shutdown.cancelled() => {
                debug!("Analysis trigger shutting down");
                break;
            }

            input = inputs.recv() => match input {
                Some(value) => {
                    shared.metrics.input_received();
                    trace!(value, "Slider input");
                    filter.record(value, Instant::now());
                }
                None => {
                    if let Some(value) = filter.flush() {
                        shared.issue(value);
                    }
                    debug!("Slider closed");
                    break;
                }
            },

            _ = quiet_window_elapsed(deadline) => {
                match filter.poll(Instant::now()) {
                    Some(value) => shared.issue(value),
                    None => trace!("Repeated value dropped"),
                }
            }
        }
    }
}

/// A running analysis pipeline.
///
/// Created by [`start`](Self::start) together with the [`SliderControl`]
/// that feeds it. Stop it with [`finish`](Self::finish) (after dropping the
/// slider) or [`shutdown`](Self::shutdown).
pub struct AnalysisPipeline {
    shared: Arc<Shared>,
    driver: JoinHandle<()>,
}

impl AnalysisPipeline {
    /// Start the pipeline.
    ///
    /// `features` may still be pending; requests issued before it settles
    /// run without feature data. `output` is optional; without it results
    /// only reach the presenter.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(
        config: PipelineConfig,
        engine: Arc<dyn GeometryEngine>,
        surface: Arc<dyn RenderSurface>,
        features: FeatureSource,
        output: Option<Arc<dyn OutputLayer>>,
    ) -> (Self, SliderControl) {
        let presenter = Arc::new(ResultPresenter::new(config.slider.initial));
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (tx, rx) = mpsc::unbounded_channel();
        let slider = SliderControl::new(config.slider, Arc::clone(&presenter), tx);

        info!(
            output_layer = ?output.as_ref().map(|layer| layer.id()),
            cancel_superseded = config.cancel_superseded,
            "Starting analysis pipeline"
        );

        let shared = Arc::new(Shared {
            config,
            engine,
            surface,
            features,
            output,
            presenter,
            metrics: AnalysisMetrics::new(),
            events,
            issued: AtomicU64::new(0),
            current: Mutex::new(None),
            in_flight: Mutex::new(None),
            chains: Mutex::new(JoinSet::new()),
            shutdown: CancellationToken::new(),
        });
        let driver = tokio::spawn(drive(Arc::clone(&shared), rx));

        (Self { shared, driver }, slider)
    }

    /// Subscribe to pipeline events.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.shared.events.subscribe()
    }

    pub fn presenter(&self) -> Arc<ResultPresenter> {
        Arc::clone(&self.shared.presenter)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// The committed result, if any.
    pub fn current_result(&self) -> Option<AnalysisResult> {
        self.shared.current.lock().clone()
    }

    /// Latest issued generation. 0 before the first request.
    pub fn latest_generation(&self) -> u64 {
        self.shared.latest_generation()
    }

    /// Wait for the slider to close, then for every chain to settle.
    /// Returns the final counters.
    ///
    /// All [`SliderControl`] clones must be dropped for this to return.
    pub async fn finish(self) -> MetricsSnapshot {
        let Self { shared, driver } = self;
        if let Err(e) = driver.await {
            warn!(error = %e, "Analysis trigger task failed");
        }
        shared.drain_chains().await;
        debug!("Analysis pipeline finished");
        shared.metrics.snapshot()
    }

    /// Cancel the trigger and every in-flight chain, then wait for them.
    /// Returns the final counters.
    pub async fn shutdown(self) -> MetricsSnapshot {
        info!("Shutting down analysis pipeline");
        let Self { shared, driver } = self;
        shared.shutdown.cancel();
        if let Err(e) = driver.await {
            warn!(error = %e, "Analysis trigger task failed");
        }
        shared.drain_chains().await;
        let metrics = shared.metrics.snapshot();
        info!(
            committed = metrics.committed,
            cancelled = metrics.cancelled,
            "Analysis pipeline stopped"
        );
        metrics
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{EngineHandle, Extent, GeoEngine, Polygon};
    use crate::layers::{FeatureSnapshot, GraphicRole};
    use crate::memory::{MemoryOutputLayer, MemorySurface};
    use crate::view::ViewState;
    use std::time::Duration;

    fn iceland() -> FeatureSnapshot {
        FeatureSnapshot::new(vec![
            Geometry::point(63.63, -19.62),
            Geometry::point(64.42, -17.33),
            Geometry::point(65.03, -16.75),
        ])
    }

    fn setup(
        features: FeatureSource,
    ) -> (AnalysisPipeline, SliderControl, Arc<MemoryOutputLayer>) {
        let surface = Arc::new(MemorySurface::new(
            ViewState::default(),
            Extent::new(62.0, 68.0, -26.0, -12.0),
            Vec::new(),
        ));
        let output = Arc::new(MemoryOutputLayer::new("analysisLayer"));
        let (pipeline, slider) = AnalysisPipeline::start(
            PipelineConfig::default(),
            Arc::new(GeoEngine::default()),
            surface,
            features,
            Some(Arc::clone(&output) as Arc<dyn OutputLayer>),
        );
        (pipeline, slider, output)
    }

    #[test]
    fn test_result_graphics_order() {
        let mut result = AnalysisResult::empty(1, 30.0);
        assert!(result.graphics().is_empty());

        result.hull_graphic = Some(Graphic::hull(Polygon::opaque(EngineHandle(2))));
        result.buffer_graphic = Some(Graphic::buffer(Polygon::opaque(EngineHandle(1))));
        let roles: Vec<_> = result.graphics().iter().map(|g| g.role).collect();
        assert_eq!(roles, vec![GraphicRole::Buffer, GraphicRole::Hull]);
    }

    #[tokio::test]
    async fn test_commits_buffer_and_hull_with_geo_engine() {
        let (pipeline, slider, output) = setup(FeatureSource::ready(iceland()));

        slider.input(50.0);
        drop(slider);
        let presenter = pipeline.presenter();
        pipeline.finish().await;

        let snapshot = presenter.snapshot();
        assert_eq!(snapshot.filtered_count, 3);
        assert!(snapshot.buffer_area > 0.0);
        assert!(snapshot.hull_area >= snapshot.buffer_area);

        let roles: Vec<_> = output.graphics().iter().map(|g| g.role).collect();
        assert_eq!(roles, vec![GraphicRole::Buffer, GraphicRole::Hull]);
    }

    #[tokio::test]
    async fn test_no_feature_data_leaves_output_untouched() {
        let (_sink, source) = crate::layers::feature_channel();
        let (pipeline, slider, output) = setup(source);
        let mut events = pipeline.subscribe();

        slider.input(50.0);
        drop(slider);
        let presenter = pipeline.presenter();
        pipeline.finish().await;

        assert!(output.history().is_empty());
        assert_eq!(presenter.snapshot().filtered_count, 0);

        let mut saw_no_data = false;
        while let Ok(event) = events.try_recv() {
            saw_no_data |= matches!(event, PipelineEvent::NoFeatureData { generation: 1 });
        }
        assert!(saw_no_data);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_request_without_input() {
        let (pipeline, _slider, _output) = setup(FeatureSource::ready(iceland()));

        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(pipeline.latest_generation(), 0);
        assert_eq!(pipeline.presenter().snapshot().slider_echo, 30.0);
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_trigger() {
        let (pipeline, slider, output) = setup(FeatureSource::ready(iceland()));

        pipeline.shutdown().await;
        // Still echoed, never analysed
        assert_eq!(slider.input(100.0), Some(100.0));
        assert!(output.history().is_empty());
    }

    #[tokio::test]
    async fn test_finish_waits_for_chains_before_counting() {
        let (pipeline, slider, _output) = setup(FeatureSource::ready(iceland()));

        slider.input(80.0);
        drop(slider);
        let metrics = pipeline.finish().await;

        assert_eq!(metrics.requests_issued, 1);
        assert_eq!(metrics.committed, 1);
        assert_eq!(metrics.cancelled, 0);
    }
}
