//! Configuration
//!
//! Two layers:
//! - [`PipelineConfig`]: immutable per-view constants handed to every
//!   constructor in the batch path. Derived values (edge threshold, history
//!   lengths) are computed from it, never stored separately.
//! - [`PulseoxConfig`]: the user-facing TOML file with environment overrides.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use pulseox_signals::physio::edge_threshold;
use pulseox_signals::{HeartRateConfig, Spo2Config};

use crate::domain::{DATASETS_PER_PACKET, SAMPLE_PERIOD_S};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

// ============================================================================
// View presets
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// ~9 s window, fast refresh
    #[default]
    Short,
    /// ~72 s window for trend viewing
    Long,
}

impl ViewMode {
    pub const ALL: [ViewMode; 2] = [ViewMode::Short, ViewMode::Long];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewMode::Short => "short",
            ViewMode::Long => "long",
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ViewMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short" => Ok(ViewMode::Short),
            "long" => Ok(ViewMode::Long),
            other => Err(ConfigError::Validation(format!(
                "unknown view mode '{}', expected 'short' or 'long'",
                other
            ))),
        }
    }
}

/// Constants of one acquisition/processing setup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineConfig {
    pub view: ViewMode,
    /// Samples held by the ring buffer (`B`)
    pub buffer_capacity: usize,
    /// Points a renderer draws per trace
    pub plot_points: usize,
    /// Decimation step between plotted samples
    pub plot_step: usize,
    /// Samples between batch evaluations
    pub samples_per_refresh: usize,
    pub display_width: f64,
    pub display_height: f64,
    pub sample_period_s: f64,
    /// Hysteresis of the beat detector on the detection trace
    pub detector_delta: f64,
}

impl PipelineConfig {
    pub fn for_view(view: ViewMode) -> Self {
        let (buffer_capacity, plot_points, plot_step, samples_per_refresh, display_width) =
            match view {
                ViewMode::Short => (1500, 500, 3, 45, 780.0),
                ViewMode::Long => (12000, 1000, 12, 120, 1210.0),
            };

        Self {
            view,
            buffer_capacity,
            plot_points,
            plot_step,
            samples_per_refresh,
            display_width,
            display_height: 680.0,
            sample_period_s: SAMPLE_PERIOD_S,
            detector_delta: 0.15,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_capacity == 0 {
            return Err(ConfigError::Validation(
                "buffer_capacity must be > 0".to_string(),
            ));
        }
        if self.samples_per_refresh == 0 || self.samples_per_refresh % DATASETS_PER_PACKET != 0 {
            return Err(ConfigError::Validation(format!(
                "samples_per_refresh must be a positive multiple of {}",
                DATASETS_PER_PACKET
            )));
        }
        if self.samples_per_refresh > self.buffer_capacity {
            return Err(ConfigError::Validation(
                "samples_per_refresh must be <= buffer_capacity".to_string(),
            ));
        }
        if self.plot_step == 0 {
            return Err(ConfigError::Validation("plot_step must be >= 1".to_string()));
        }
        if !(self.sample_period_s > 0.0) {
            return Err(ConfigError::Validation(
                "sample_period_s must be positive".to_string(),
            ));
        }
        if !(self.display_width > 0.0) {
            return Err(ConfigError::Validation(
                "display_width must be positive".to_string(),
            ));
        }
        if !(self.detector_delta > 0.0) {
            return Err(ConfigError::Validation(
                "detector_delta must be positive".to_string(),
            ));
        }
        if self.heart_rate_history_len() == 0 || self.spo2_history_len() == 0 {
            return Err(ConfigError::Validation(
                "refresh interval too long for a non-empty history".to_string(),
            ));
        }
        Ok(())
    }

    pub fn samples_per_second(&self) -> f64 {
        1.0 / self.sample_period_s
    }

    /// Time covered by one transport packet.
    pub fn read_period(&self) -> Duration {
        let micros = self.sample_period_s * DATASETS_PER_PACKET as f64 * 1e6;
        Duration::from_micros(micros.round() as u64)
    }

    /// Wall-clock time between batch evaluations.
    pub fn refresh_period_s(&self) -> f64 {
        self.sample_period_s * self.samples_per_refresh as f64
    }

    pub fn edge_threshold(&self) -> usize {
        edge_threshold(self.buffer_capacity, self.samples_per_second())
    }

    /// Batches in ~3 s.
    pub fn heart_rate_history_len(&self) -> usize {
        (3.0 / self.refresh_period_s()).round() as usize
    }

    /// Batches in ~20 s.
    pub fn spo2_history_len(&self) -> usize {
        (20.0 / self.refresh_period_s()).round() as usize
    }

    pub fn heart_rate_config(&self) -> HeartRateConfig {
        HeartRateConfig {
            sample_period_s: self.sample_period_s,
            history_len: self.heart_rate_history_len(),
            ..Default::default()
        }
    }

    pub fn spo2_config(&self) -> Spo2Config {
        Spo2Config {
            history_len: self.spo2_history_len(),
            ..Default::default()
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::for_view(ViewMode::default())
    }
}

// ============================================================================
// File configuration
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseoxConfig {
    pub view: ViewMode,
    pub acquisition: AcquisitionConfig,
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Upper bound on one blocking packet read
    pub io_timeout_ms: u64,
    /// Sleep between elapsed-time checks of the read loop
    pub poll_interval_us: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            io_timeout_ms: 800,
            poll_interval_us: 500,
        }
    }
}

impl AcquisitionConfig {
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }
}

/// Parameters of the synthetic sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub heart_rate_bpm: f64,
    pub spo2_percent: f64,
    /// Standard deviation of additive intensity noise, in counts
    pub noise_std: f64,
    /// Device counter value of the first sample
    pub start_seq: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            heart_rate_bpm: 72.0,
            spo2_percent: 97.0,
            noise_std: 0.0,
            start_seq: 0,
        }
    }
}

impl PulseoxConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: PulseoxConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with `PULSEOX_*` environment overrides
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. User config file (if exists)
    /// 3. Default config file
    /// 4. Built-in defaults (lowest priority)
    pub fn load_layered(
        default_path: Option<&Path>,
        user_path: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut config = PulseoxConfig::default();

        if let Some(path) = default_path {
            if path.exists() {
                config = Self::from_file(path)?;
            }
        }

        // A user file replaces the default file wholesale
        if let Some(path) = user_path {
            if path.exists() {
                config = Self::from_file(path)?;
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Apply `PULSEOX_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: FromStr>(key: &str, val: &str) -> Result<T, ConfigError> {
            val.trim()
                .parse()
                .map_err(|_| ConfigError::Validation(format!("Invalid {}", key)))
        }

        if let Some(val) = lookup("PULSEOX_VIEW") {
            self.view = val.parse()?;
        }
        if let Some(val) = lookup("PULSEOX_IO_TIMEOUT_MS") {
            self.acquisition.io_timeout_ms = parse("PULSEOX_IO_TIMEOUT_MS", &val)?;
        }
        if let Some(val) = lookup("PULSEOX_POLL_INTERVAL_US") {
            self.acquisition.poll_interval_us = parse("PULSEOX_POLL_INTERVAL_US", &val)?;
        }
        if let Some(val) = lookup("PULSEOX_SIM_BPM") {
            self.simulation.heart_rate_bpm = parse("PULSEOX_SIM_BPM", &val)?;
        }
        if let Some(val) = lookup("PULSEOX_SIM_SPO2") {
            self.simulation.spo2_percent = parse("PULSEOX_SIM_SPO2", &val)?;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.acquisition.io_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "acquisition.io_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.acquisition.poll_interval_us == 0 || self.acquisition.poll_interval_us > 100_000 {
            return Err(ConfigError::Validation(
                "acquisition.poll_interval_us must be in [1, 100000]".to_string(),
            ));
        }

        let sim = &self.simulation;
        if !(30.0..=240.0).contains(&sim.heart_rate_bpm) {
            return Err(ConfigError::Validation(
                "simulation.heart_rate_bpm must be in [30, 240]".to_string(),
            ));
        }
        if !(sim.spo2_percent > 85.0 && sim.spo2_percent < 100.0) {
            return Err(ConfigError::Validation(
                "simulation.spo2_percent must be in (85, 100)".to_string(),
            ));
        }
        if !(sim.noise_std >= 0.0) || !sim.noise_std.is_finite() {
            return Err(ConfigError::Validation(
                "simulation.noise_std must be finite and >= 0".to_string(),
            ));
        }

        self.pipeline().validate()
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig::for_view(self.view)
    }

    /// Export configuration to TOML string
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = self
            .to_toml_string()
            .map_err(|e| ConfigError::Validation(format!("TOML serialization error: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }
}
