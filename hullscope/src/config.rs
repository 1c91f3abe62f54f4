//! Configuration file handling for `hullscope.ini`.
//!
//! Every setting has a default; a file only needs to mention what it
//! changes. Parsing starts from [`HullscopeConfig::default`] and overlays
//! the values found in the INI.
//!
//! ```ini
//! [view]
//! zoom = 6
//! center_lat = 65
//! center_lng = -18.5
//! rotation = 180
//!
//! [slider]
//! min = 10
//! max = 300
//! step = 5
//! initial = 30
//!
//! [analysis]
//! debounce_ms = 250
//! op_timeout_secs = 10
//! cancel_superseded = true
//! circle_segments = 64
//!
//! [layers]
//! feature_layer = volcanoesLayer
//! output_layer = analysisLayer
//! ready_timeout_secs = 30
//!
//! [logging]
//! directory = ~/.local/share/hullscope/logs
//! filter = info
//! ```

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::analysis::{PipelineConfig, SliderRange, TriggerConfig, DEFAULT_EVENT_CAPACITY};
use crate::geometry::{LatLng, MAX_CIRCLE_SEGMENTS, MIN_CIRCLE_SEGMENTS};
use crate::view::ViewState;

/// Default quiet window before a slider value is analysed.
pub const DEFAULT_DEBOUNCE_MS: u64 = 250;

/// Default per-operation geometry timeout.
pub const DEFAULT_OP_TIMEOUT_SECS: u64 = 10;

/// Default limit on waiting for the feature layer to settle.
pub const DEFAULT_READY_TIMEOUT_SECS: u64 = 30;

/// Default feature layer id.
pub const DEFAULT_FEATURE_LAYER: &str = "volcanoesLayer";

/// Default output layer id.
pub const DEFAULT_OUTPUT_LAYER: &str = "analysisLayer";

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read or parse the config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Failed to parse config text
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Failed to write config file
    #[error("Failed to write config file: {0}")]
    WriteError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

/// `[view]`: initial viewport.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSettings {
    pub zoom: f64,
    pub center_lat: f64,
    pub center_lng: f64,
    pub rotation: f64,
}

impl Default for ViewSettings {
    fn default() -> Self {
        let state = ViewState::default();
        Self {
            zoom: state.zoom,
            center_lat: state.center.lat,
            center_lng: state.center.lng,
            rotation: state.rotation,
        }
    }
}

/// `[analysis]`: pipeline timing and behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSettings {
    pub debounce_ms: u64,
    /// 0 disables the timeout.
    pub op_timeout_secs: u64,
    pub cancel_superseded: bool,
    /// Sides of the polygon approximating each buffer circle.
    pub circle_segments: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            op_timeout_secs: DEFAULT_OP_TIMEOUT_SECS,
            cancel_superseded: true,
            circle_segments: crate::geometry::DEFAULT_CIRCLE_SEGMENTS,
        }
    }
}

/// `[layers]`: which layers to use.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSettings {
    pub feature_layer: String,
    pub output_layer: String,
    /// 0 disables the timeout.
    pub ready_timeout_secs: u64,
}

impl Default for LayerSettings {
    fn default() -> Self {
        Self {
            feature_layer: DEFAULT_FEATURE_LAYER.to_string(),
            output_layer: DEFAULT_OUTPUT_LAYER.to_string(),
            ready_timeout_secs: DEFAULT_READY_TIMEOUT_SECS,
        }
    }
}

/// `[logging]`: where and how much to log.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            filter: "info".to_string(),
        }
    }
}

/// The complete configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HullscopeConfig {
    pub view: ViewSettings,
    pub slider: SliderRange,
    pub analysis: AnalysisSettings,
    pub layers: LayerSettings,
    pub logging: LoggingSettings,
}

impl HullscopeConfig {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path)?;
        parse_ini(&ini)
    }

    /// Parse configuration from INI text.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigFileError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigFileError::ParseError(e.to_string()))?;
        parse_ini(&ini)
    }

    /// Save configuration to a specific path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigFileError::WriteError(e.to_string()))?;
        }
        std::fs::write(path, self.to_ini_string())
            .map_err(|e| ConfigFileError::WriteError(e.to_string()))
    }

    /// Initial viewport.
    pub fn view_state(&self) -> ViewState {
        ViewState {
            zoom: self.view.zoom,
            center: LatLng::new(self.view.center_lat, self.view.center_lng),
            rotation: self.view.rotation,
        }
    }

    /// Pipeline settings.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            trigger: TriggerConfig {
                quiet_window: Duration::from_millis(self.analysis.debounce_ms),
            },
            slider: self.slider,
            cancel_superseded: self.analysis.cancel_superseded,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Per-operation geometry timeout, if enabled.
    pub fn op_timeout(&self) -> Option<Duration> {
        seconds_or_disabled(self.analysis.op_timeout_secs)
    }

    /// Feature layer readiness timeout, if enabled.
    pub fn ready_timeout(&self) -> Option<Duration> {
        seconds_or_disabled(self.layers.ready_timeout_secs)
    }

    /// Render the effective configuration as INI.
    pub fn to_ini_string(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = write!(
            out,
            "[view]\n\
             zoom = {}\n\
             center_lat = {}\n\
             center_lng = {}\n\
             rotation = {}\n\
             \n\
             [slider]\n\
             min = {}\n\
             max = {}\n\
             step = {}\n\
             initial = {}\n\
             \n\
             [analysis]\n\
             debounce_ms = {}\n\
             ; 0 disables the timeout\n\
             op_timeout_secs = {}\n\
             cancel_superseded = {}\n\
             circle_segments = {}\n\
             \n\
             [layers]\n\
             feature_layer = {}\n\
             output_layer = {}\n\
             ; 0 disables the timeout\n\
             ready_timeout_secs = {}\n\
             \n\
             [logging]\n\
             directory = {}\n\
             filter = {}\n",
            self.view.zoom,
            self.view.center_lat,
            self.view.center_lng,
            self.view.rotation,
            self.slider.min,
            self.slider.max,
            self.slider.step,
            self.slider.initial,
            self.analysis.debounce_ms,
            self.analysis.op_timeout_secs,
            self.analysis.cancel_superseded,
            self.analysis.circle_segments,
            self.layers.feature_layer,
            self.layers.output_layer,
            self.layers.ready_timeout_secs,
            self.logging.directory.display(),
            self.logging.filter,
        );
        out
    }
}

fn seconds_or_disabled(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Directory holding the config file.
pub fn config_directory() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hullscope")
}

/// Path to the config file.
pub fn config_file_path() -> PathBuf {
    config_directory().join("hullscope.ini")
}

/// Default directory for log files.
pub fn default_log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hullscope")
        .join("logs")
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_value<T: FromStr>(
    section: &str,
    key: &str,
    value: &str,
    reason: &str,
) -> Result<T, ConfigFileError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value, reason))
}

fn parse_finite(section: &str, key: &str, value: &str) -> Result<f64, ConfigFileError> {
    let parsed: f64 = parse_value(section, key, value, "must be a number")?;
    if !parsed.is_finite() {
        return Err(invalid(section, key, value, "must be a finite number"));
    }
    Ok(parsed)
}

fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Overlay the values found in `ini` on the defaults.
fn parse_ini(ini: &Ini) -> Result<HullscopeConfig, ConfigFileError> {
    let mut config = HullscopeConfig::default();

    // [view] section
    if let Some(section) = ini.section(Some("view")) {
        if let Some(v) = section.get("zoom") {
            config.view.zoom = parse_finite("view", "zoom", v)?;
            if config.view.zoom < 0.0 {
                return Err(invalid("view", "zoom", v, "must not be negative"));
            }
        }
        if let Some(v) = section.get("center_lat") {
            config.view.center_lat = parse_finite("view", "center_lat", v)?;
            if config.view.center_lat.abs() > 90.0 {
                return Err(invalid("view", "center_lat", v, "must be within -90..90"));
            }
        }
        if let Some(v) = section.get("center_lng") {
            config.view.center_lng = parse_finite("view", "center_lng", v)?;
            if config.view.center_lng.abs() > 180.0 {
                return Err(invalid("view", "center_lng", v, "must be within -180..180"));
            }
        }
        if let Some(v) = section.get("rotation") {
            config.view.rotation = parse_finite("view", "rotation", v)?;
        }
    }

    // [slider] section
    if let Some(section) = ini.section(Some("slider")) {
        if let Some(v) = section.get("min") {
            config.slider.min = parse_finite("slider", "min", v)?;
        }
        if let Some(v) = section.get("max") {
            config.slider.max = parse_finite("slider", "max", v)?;
        }
        if let Some(v) = section.get("step") {
            config.slider.step = parse_finite("slider", "step", v)?;
        }
        if let Some(v) = section.get("initial") {
            config.slider.initial = parse_finite("slider", "initial", v)?;
        }
        if !config.slider.is_valid() {
            return Err(invalid(
                "slider",
                "range",
                &format!(
                    "{}..{} step {} initial {}",
                    config.slider.min, config.slider.max, config.slider.step, config.slider.initial
                ),
                "need 0 < min <= initial <= max",
            ));
        }
    }

    // [analysis] section
    if let Some(section) = ini.section(Some("analysis")) {
        if let Some(v) = section.get("debounce_ms") {
            config.analysis.debounce_ms = parse_value(
                "analysis",
                "debounce_ms",
                v,
                "must be a non-negative integer (milliseconds)",
            )?;
        }
        if let Some(v) = section.get("op_timeout_secs") {
            config.analysis.op_timeout_secs = parse_value(
                "analysis",
                "op_timeout_secs",
                v,
                "must be a non-negative integer (seconds, 0 disables)",
            )?;
        }
        if let Some(v) = section.get("cancel_superseded") {
            config.analysis.cancel_superseded = match v.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => true,
                "false" | "no" | "0" => false,
                _ => {
                    return Err(invalid(
                        "analysis",
                        "cancel_superseded",
                        v,
                        "must be true or false",
                    ))
                }
            };
        }
        if let Some(v) = section.get("circle_segments") {
            let reason = format!(
                "must be an integer from {} to {}",
                MIN_CIRCLE_SEGMENTS, MAX_CIRCLE_SEGMENTS
            );
            let segments: usize = parse_value("analysis", "circle_segments", v, &reason)?;
            if !(MIN_CIRCLE_SEGMENTS..=MAX_CIRCLE_SEGMENTS).contains(&segments) {
                return Err(invalid("analysis", "circle_segments", v, &reason));
            }
            config.analysis.circle_segments = segments;
        }
    }

    // [layers] section
    if let Some(section) = ini.section(Some("layers")) {
        if let Some(v) = section.get("feature_layer") {
            let v = v.trim();
            if v.is_empty() {
                return Err(invalid("layers", "feature_layer", v, "must not be empty"));
            }
            config.layers.feature_layer = v.to_string();
        }
        if let Some(v) = section.get("output_layer") {
            let v = v.trim();
            if v.is_empty() {
                return Err(invalid("layers", "output_layer", v, "must not be empty"));
            }
            config.layers.output_layer = v.to_string();
        }
        if let Some(v) = section.get("ready_timeout_secs") {
            config.layers.ready_timeout_secs = parse_value(
                "layers",
                "ready_timeout_secs",
                v,
                "must be a non-negative integer (seconds, 0 disables)",
            )?;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("filter") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.filter = v.to_string();
            }
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HullscopeConfig::default();

        assert_eq!(config.view_state(), ViewState::default());
        assert_eq!(config.slider, SliderRange::default());
        assert_eq!(config.analysis.debounce_ms, 250);
        assert!(config.analysis.cancel_superseded);
        assert_eq!(config.layers.feature_layer, "volcanoesLayer");
        assert_eq!(config.layers.output_layer, "analysisLayer");
        assert_eq!(config.op_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.ready_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.ini");

        let config = HullscopeConfig::load_from(&config_path).unwrap();
        assert_eq!(config, HullscopeConfig::default());
    }

    #[test]
    fn test_partial_file_overlays_defaults() {
        let config = HullscopeConfig::from_ini_str(
            "[analysis]\n\
             debounce_ms = 100\n\
             op_timeout_secs = 0\n\
             cancel_superseded = false\n\
             [layers]\n\
             feature_layer = lakesLayer\n",
        )
        .unwrap();

        assert_eq!(config.analysis.debounce_ms, 100);
        assert_eq!(config.op_timeout(), None);
        assert!(!config.analysis.cancel_superseded);
        assert_eq!(config.layers.feature_layer, "lakesLayer");
        assert_eq!(config.layers.output_layer, "analysisLayer");
        assert_eq!(config.view, ViewSettings::default());

        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.trigger.quiet_window, Duration::from_millis(100));
        assert!(!pipeline.cancel_superseded);
    }

    #[test]
    fn test_invalid_number_is_reported() {
        let err = HullscopeConfig::from_ini_str("[view]\nzoom = close\n").unwrap_err();
        match err {
            ConfigFileError::InvalidValue {
                section,
                key,
                value,
                ..
            } => {
                assert_eq!(section, "view");
                assert_eq!(key, "zoom");
                assert_eq!(value, "close");
            }
            other => panic!("Expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_slider_range_is_rejected() {
        let err = HullscopeConfig::from_ini_str("[slider]\nmin = 50\nmax = 20\n").unwrap_err();
        assert!(matches!(err, ConfigFileError::InvalidValue { ref section, .. } if section == "slider"));
    }

    #[test]
    fn test_invalid_bool_is_rejected() {
        let err =
            HullscopeConfig::from_ini_str("[analysis]\ncancel_superseded = maybe\n").unwrap_err();
        assert!(err.to_string().contains("cancel_superseded"));
    }

    #[test]
    fn test_circle_segments_out_of_range_is_rejected() {
        for text in [
            "[analysis]\ncircle_segments = 1000000000\n",
            "[analysis]\ncircle_segments = 3\n",
        ] {
            let err = HullscopeConfig::from_ini_str(text).unwrap_err();
            assert!(matches!(err, ConfigFileError::InvalidValue { ref key, .. } if key == "circle_segments"));
        }

        let config =
            HullscopeConfig::from_ini_str("[analysis]\ncircle_segments = 1024\n").unwrap();
        assert_eq!(config.analysis.circle_segments, MAX_CIRCLE_SEGMENTS);
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("hullscope.ini");

        let mut config = HullscopeConfig::default();
        config.view.zoom = 8.0;
        config.slider.initial = 100.0;
        config.layers.ready_timeout_secs = 0;
        config.logging.directory = temp_dir.path().join("logs");
        config.save_to(&path).unwrap();

        let reloaded = HullscopeConfig::load_from(&path).unwrap();
        assert_eq!(reloaded, config);
        assert_eq!(reloaded.ready_timeout(), None);
    }
}
