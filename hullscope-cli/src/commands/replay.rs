//! Replay a recorded slider session.
//!
//! A scenario describes a visible extent, a set of feature locations and a
//! timed sequence of slider values. The replay runs them through a full
//! [`AnalysisSession`] on an in-process surface with the `geo`-backed
//! engine, then reports what was committed.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;
use tracing::{info, warn};

use hullscope::analysis::{MetricsSnapshot, PipelineEvent, PresenterSnapshot};
use hullscope::config::HullscopeConfig;
use hullscope::geometry::{Extent, GeoEngine, Geometry, LatLng};
use hullscope::layers::{Feature, FeatureData, Layer};
use hullscope::memory::{MemoryFeatureLayer, MemoryOutputLayer, MemorySurfaceFactory};
use hullscope::session::{AnalysisSession, SessionSettings};
use hullscope::view::{ContainerAnchor, MapModel};

use crate::error::CliError;

/// Basemap name given to the replay surface.
const REPLAY_BASEMAP: &str = "dark-gray";

/// Container id given to the replay surface.
const REPLAY_CONTAINER: &str = "viewDiv";

/// One slider movement.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ScenarioInput {
    /// Offset from the start of the replay.
    pub at_ms: u64,
    /// Raw slider value in km.
    pub value: f64,
}

/// A recorded session.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Scenario {
    #[serde(default = "Extent::world")]
    pub extent: Extent,
    pub features: Vec<LatLng>,
    pub inputs: Vec<ScenarioInput>,
}

impl Scenario {
    /// Load a scenario from a JSON file. Inputs are sorted by time.
    pub fn from_file(path: &Path) -> Result<Self, CliError> {
        let text = std::fs::read_to_string(path).map_err(|error| CliError::ScenarioRead {
            path: path.display().to_string(),
            error,
        })?;
        Self::from_json(&text).map_err(|reason| CliError::ScenarioParse {
            path: path.display().to_string(),
            reason,
        })
    }

    fn from_json(text: &str) -> Result<Self, String> {
        let mut scenario: Scenario = serde_json::from_str(text).map_err(|e| e.to_string())?;
        let extent = scenario.extent;
        if extent.min_lat > extent.max_lat || extent.min_lng > extent.max_lng {
            return Err("extent minimum exceeds maximum".to_string());
        }
        scenario.inputs.sort_by_key(|input| input.at_ms);
        Ok(scenario)
    }
}

/// One committed result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommittedRun {
    pub generation: u64,
    pub distance_km: f64,
    pub filtered_count: usize,
    pub buffer_area_km2: f64,
    pub hull_area_km2: f64,
}

/// Outcome of a replay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayReport {
    pub features_loaded: usize,
    pub committed: Vec<CommittedRun>,
    pub failed: Vec<String>,
    pub requests_issued: u64,
    pub superseded: u64,
    pub cancelled: u64,
    pub slider_echo_km: f64,
    pub filtered_count: usize,
    pub buffer_area_km2: f64,
    pub hull_area_km2: f64,
}

impl ReplayReport {
    fn new(
        features_loaded: usize,
        events: Vec<PipelineEvent>,
        metrics: MetricsSnapshot,
        presented: PresenterSnapshot,
    ) -> Self {
        let mut committed = Vec::new();
        let mut failed = Vec::new();
        for event in events {
            match event {
                PipelineEvent::Committed {
                    generation,
                    distance,
                    filtered_count,
                    buffer_area,
                    hull_area,
                } => committed.push(CommittedRun {
                    generation,
                    distance_km: distance,
                    filtered_count,
                    buffer_area_km2: buffer_area,
                    hull_area_km2: hull_area,
                }),
                PipelineEvent::Failed { generation, error } => {
                    failed.push(format!("#{}: {}", generation, error))
                }
                _ => {}
            }
        }

        Self {
            features_loaded,
            committed,
            failed,
            requests_issued: metrics.requests_issued,
            superseded: metrics.superseded,
            cancelled: metrics.cancelled,
            slider_echo_km: presented.slider_echo,
            filtered_count: presented.filtered_count,
            buffer_area_km2: presented.buffer_area,
            hull_area_km2: presented.hull_area,
        }
    }

    fn print(&self) {
        println!("Replay");
        println!("======");
        println!("  features loaded: {}", self.features_loaded);
        println!(
            "  requests: {} issued, {} committed, {} superseded, {} cancelled, {} failed",
            self.requests_issued,
            self.committed.len(),
            self.superseded,
            self.cancelled,
            self.failed.len()
        );
        println!();

        for run in &self.committed {
            println!(
                "  #{:<3} {:>6} km  {:>3} features  buffer {:>12.1} km²  hull {:>12.1} km²",
                run.generation,
                run.distance_km,
                run.filtered_count,
                run.buffer_area_km2,
                run.hull_area_km2
            );
        }
        for failure in &self.failed {
            println!("  failed {}", failure);
        }
        if !self.committed.is_empty() || !self.failed.is_empty() {
            println!();
        }

        let presented = PresenterSnapshot {
            filtered_count: self.filtered_count,
            buffer_area: self.buffer_area_km2,
            hull_area: self.hull_area_km2,
            slider_echo: self.slider_echo_km,
        };
        println!("{}", presented);
    }
}

/// Run a scenario and print its report.
pub fn run(scenario_path: &Path, json: bool, config: &HullscopeConfig) -> Result<(), CliError> {
    let scenario = Scenario::from_file(scenario_path)?;
    let runtime = tokio::runtime::Runtime::new().map_err(CliError::Runtime)?;
    let report = runtime.block_on(replay(scenario, config))?;

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => warn!(error = %e, "Failed to encode report"),
        }
    } else {
        report.print();
    }
    Ok(())
}

/// Replay `scenario` through a fresh session.
pub async fn replay(scenario: Scenario, config: &HullscopeConfig) -> Result<ReplayReport, CliError> {
    let features: Vec<Feature> = scenario
        .features
        .iter()
        .map(|at| Feature::new(Geometry::Point(*at)))
        .collect();
    let feature_layer = MemoryFeatureLayer::loaded(config.layers.feature_layer.clone(), features);
    let output_layer = MemoryOutputLayer::new(config.layers.output_layer.clone());
    let map = MapModel::new(
        REPLAY_BASEMAP,
        vec![
            Layer::Feature(Arc::new(feature_layer)),
            Layer::Graphics(Arc::new(output_layer)),
        ],
    );

    let factory = MemorySurfaceFactory::new().with_extent(scenario.extent);
    let engine = Arc::new(GeoEngine::new(config.analysis.circle_segments));
    let settings = SessionSettings::from_config(config, ContainerAnchor::new(REPLAY_CONTAINER), map);
    let session = AnalysisSession::start(&factory, engine, settings).await?;

    let features_loaded = match session.wait_for_features().await {
        FeatureData::Ready(snapshot) => snapshot.len(),
        FeatureData::Unavailable(e) => {
            warn!(error = %e, "Replaying without feature data");
            0
        }
        FeatureData::Pending => 0,
    };

    let collector = tokio::spawn(collect_events(session.subscribe()));
    let slider = session.slider();
    let started = Instant::now();
    info!(inputs = scenario.inputs.len(), "Replaying slider inputs");

    for input in &scenario.inputs {
        tokio::time::sleep_until(started + Duration::from_millis(input.at_ms)).await;
        if slider.input(input.value).is_none() {
            warn!(value = input.value, "Ignoring non-finite slider value");
        }
    }
    drop(slider);

    let presenter = session.presenter();
    let metrics = session.finish().await;

    // The event channel closes once the pipeline is gone
    let events = match collector.await {
        Ok(events) => events,
        Err(e) => {
            warn!(error = %e, "Event collector failed");
            Vec::new()
        }
    };

    Ok(ReplayReport::new(
        features_loaded,
        events,
        metrics,
        presenter.snapshot(),
    ))
}

/// Gather pipeline events until the channel closes.
async fn collect_events(mut events: broadcast::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut collected = Vec::new();
    loop {
        match events.recv().await {
            Ok(event) => collected.push(event),
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "Replay report fell behind pipeline events");
            }
            Err(RecvError::Closed) => return collected,
        }
    }
}
