//! Configuration for a streaming run.
//!
//! Settings are loaded with figment from:
//! 1. a TOML file (`config/default.toml` unless another path is given)
//! 2. environment variables prefixed with `TEMP_STREAM_`, using `__` to
//!    separate sections, e.g. `TEMP_STREAM_STREAM__SAMPLES_PER_POINT=10`
//!
//! # Example
//! ```no_run
//! use temp_stream::config::StreamSettings;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = StreamSettings::load_from("config/default.toml")?;
//! settings.validate()?;
//! let params = settings.stream_params()?;
//! println!("{} raw reads per point", params.samples_per_point);
//! # Ok(())
//! # }
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::data::aggregator::LostSamplePolicy;
use crate::error::{AppResult, DaqError};

/// Default multiplier applied to the averaged voltage.
pub const DEFAULT_TEMP_SCALE: f64 = 50.0;

/// Default offset added after scaling.
pub const DEFAULT_VOLTAGE_OFFSET: f64 = 0.0;

/// Highest scan rate a stream may request, in Hz.
///
/// The rate doubles as the scans-per-read count, so it also bounds the size
/// of every batch.
pub const MAX_SAMPLING_RATE: f64 = 100_000.0;

/// Top-level settings file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamSettings {
    /// Which device to open
    #[serde(default)]
    pub device: DeviceSettings,
    /// Aggregation and output parameters
    pub stream: StreamSection,
    /// Log output
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Parameters of the simulated source
    #[serde(default)]
    pub simulation: SimulationSettings,
}

/// Device selection, passed verbatim to the source's `open`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Device model, e.g. "T7"
    #[serde(default = "default_any")]
    pub kind: String,
    /// "USB", "ETHERNET" or "ANY"
    #[serde(default = "default_any")]
    pub connection: String,
    /// Serial number, IP address or "ANY"
    #[serde(default = "default_any")]
    pub identifier: String,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            kind: "T7".to_string(),
            connection: default_any(),
            identifier: default_any(),
        }
    }
}

/// The `[stream]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSection {
    /// Raw reads averaged into one output point
    pub samples_per_point: usize,
    /// Output points buffered before each flush
    pub points_per_write: usize,
    /// Requested scan rate in Hz
    pub sampling_rate: f64,
    /// Channel names, in scan order
    pub address_names: Vec<String>,
    /// Prefix of every output file name
    pub fname_preamble: String,
    /// Directory the hourly files are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Degrees per volt
    #[serde(default = "default_temp_scale")]
    pub temp_scale: f64,
    /// Added after scaling
    #[serde(default)]
    pub voltage_offset: f64,
    /// Whether sentinel values take part in the batch mean
    #[serde(default)]
    pub lost_samples: LostSamplePolicy,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            samples_per_point: 2,
            points_per_write: 1,
            sampling_rate: 1.0,
            address_names: vec!["AIN1".to_string()],
            fname_preamble: "testing_temp".to_string(),
            output_dir: default_output_dir(),
            temp_scale: DEFAULT_TEMP_SCALE,
            voltage_offset: DEFAULT_VOLTAGE_OFFSET,
            lost_samples: LostSamplePolicy::default(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human-oriented output
    #[default]
    Pretty,
    /// One line per event
    Compact,
    /// Newline-delimited JSON
    Json,
}

/// The `[logging]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// trace, debug, info, warn or error
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// The `[simulation]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Mean voltage produced on every channel
    #[serde(default = "default_base_voltage")]
    pub base_voltage: f64,
    /// Peak deviation of the uniform noise around `base_voltage`
    #[serde(default = "default_noise_amplitude")]
    pub noise_amplitude: f64,
    /// Chance that any single sample is reported as lost
    #[serde(default)]
    pub lost_sample_probability: f64,
    /// Pace reads to the requested scan rate
    #[serde(default = "default_realtime")]
    pub realtime: bool,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            base_voltage: default_base_voltage(),
            noise_amplitude: default_noise_amplitude(),
            lost_sample_probability: 0.0,
            realtime: default_realtime(),
        }
    }
}

fn default_any() -> String {
    "ANY".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_temp_scale() -> f64 {
    DEFAULT_TEMP_SCALE
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_base_voltage() -> f64 {
    0.45
}

fn default_noise_amplitude() -> f64 {
    0.01
}

fn default_realtime() -> bool {
    true
}

impl StreamSettings {
    /// Load settings from `config/default.toml` and the environment.
    pub fn load() -> AppResult<Self> {
        Self::load_from("config/default.toml")
    }

    /// Load settings from a specific file path, layered over built-in defaults.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let settings = Figment::from(Serialized::defaults(StreamSettings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("TEMP_STREAM_").split("__"))
            .extract()?;
        Ok(settings)
    }

    /// Validate the loaded values.
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        let p = self.simulation.lost_sample_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(DaqError::Configuration(format!(
                "lost_sample_probability must be within [0, 1], got {p}"
            )));
        }

        self.stream_params()?.validate()
    }

    /// Extract the parameters the stream controller needs.
    pub fn stream_params(&self) -> AppResult<StreamParams> {
        let s = &self.stream;
        let params = StreamParams::new(
            s.samples_per_point,
            s.points_per_write,
            s.sampling_rate,
            s.address_names.clone(),
            s.fname_preamble.clone(),
        )
        .with_output_dir(s.output_dir.clone())
        .with_temp_scale(s.temp_scale)
        .with_voltage_offset(s.voltage_offset)
        .with_lost_samples(s.lost_samples);
        params.validate()?;
        Ok(params)
    }
}

/// Validated parameters of one streaming run.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamParams {
    /// Reads averaged into one point
    pub samples_per_point: usize,
    /// Points buffered per flush
    pub points_per_write: usize,
    /// Requested scan rate in Hz, also used as scans per read
    pub sampling_rate: f64,
    /// Channel names, in scan order
    pub address_names: Vec<String>,
    /// Output file prefix
    pub fname_preamble: String,
    /// Output directory
    pub output_dir: PathBuf,
    /// Degrees per volt
    pub temp_scale: f64,
    /// Added after scaling
    pub voltage_offset: f64,
    /// Treatment of lost samples in the batch mean
    pub lost_samples: LostSamplePolicy,
}

impl StreamParams {
    /// Create parameters with the default scale, offset and output directory.
    pub fn new(
        samples_per_point: usize,
        points_per_write: usize,
        sampling_rate: f64,
        address_names: Vec<String>,
        fname_preamble: impl Into<String>,
    ) -> Self {
        Self {
            samples_per_point,
            points_per_write,
            sampling_rate,
            address_names,
            fname_preamble: fname_preamble.into(),
            output_dir: default_output_dir(),
            temp_scale: DEFAULT_TEMP_SCALE,
            voltage_offset: DEFAULT_VOLTAGE_OFFSET,
            lost_samples: LostSamplePolicy::default(),
        }
    }

    /// Set the directory output files are written to.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set the voltage-to-temperature multiplier.
    pub fn with_temp_scale(mut self, scale: f64) -> Self {
        self.temp_scale = scale;
        self
    }

    /// Set the voltage-to-temperature offset.
    pub fn with_voltage_offset(mut self, offset: f64) -> Self {
        self.voltage_offset = offset;
        self
    }

    /// Choose whether lost samples take part in the batch mean.
    pub fn with_lost_samples(mut self, policy: LostSamplePolicy) -> Self {
        self.lost_samples = policy;
        self
    }

    /// Number of channels in one scan.
    pub fn num_channels(&self) -> usize {
        self.address_names.len()
    }

    /// Check the invariants the controller relies on.
    pub fn validate(&self) -> AppResult<()> {
        if self.samples_per_point == 0 {
            return Err(DaqError::Configuration(
                "samples_per_point must be at least 1".to_string(),
            ));
        }
        if self.points_per_write == 0 {
            return Err(DaqError::Configuration(
                "points_per_write must be at least 1".to_string(),
            ));
        }
        if !self.sampling_rate.is_finite() || self.sampling_rate <= 0.0 {
            return Err(DaqError::Configuration(format!(
                "Invalid sampling rate: {}",
                self.sampling_rate
            )));
        }
        if self.sampling_rate > MAX_SAMPLING_RATE {
            return Err(DaqError::Configuration(format!(
                "Sampling rate {} Hz exceeds the maximum of {} Hz",
                self.sampling_rate, MAX_SAMPLING_RATE
            )));
        }
        if self.address_names.is_empty() {
            return Err(DaqError::Configuration(
                "At least one channel address is required".to_string(),
            ));
        }
        if self.fname_preamble.is_empty() {
            return Err(DaqError::Configuration(
                "fname_preamble must not be empty".to_string(),
            ));
        }
        if !self.temp_scale.is_finite() || !self.voltage_offset.is_finite() {
            return Err(DaqError::Configuration(
                "temp_scale and voltage_offset must be finite".to_string(),
            ));
        }
        Ok(())
    }
}
