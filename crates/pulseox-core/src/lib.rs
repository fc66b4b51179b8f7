//! # pulseox-core
//!
//! Runtime around the `pulseox-signals` estimators:
//!
//! - **domain**: device samples and the 60-byte transport packet
//! - **buffer**: ring storage with chronological unrolling
//! - **config**: view presets and the TOML/env configuration
//! - **pipeline**: per-packet ingest and per-batch evaluation
//! - **shared_state**: snapshot handoff to a concurrent consumer
//! - **transport** / **simulation**: packet sources
//! - **acquisition**: the polling worker thread
//!
//! ## Example
//!
//! ```ignore
//! use pulseox_core::{AcquisitionLoop, AcquisitionSettings, PipelineConfig, SimulatedSensor};
//! use pulseox_core::config::SimulationConfig;
//!
//! let config = PipelineConfig::default();
//! let mut acquisition = AcquisitionLoop::new(config.clone(), AcquisitionSettings::default())?;
//! let sensor = SimulatedSensor::from_config(&SimulationConfig::default(), config.sample_period_s);
//! acquisition.start(Box::new(sensor))?;
//!
//! let shared = acquisition.shared();
//! for _ in shared.display_events().iter().take(10) {
//!     let snap = shared.snapshot();
//!     println!("HR {} SpO2 {}", snap.heart_rate_label, snap.spo2_label);
//! }
//! acquisition.stop();
//! ```

pub mod acquisition;
pub mod buffer;
pub mod config;
pub mod domain;
mod error;
pub mod pipeline;
pub mod shared_state;
pub mod simulation;
pub mod transport;

pub use acquisition::{
    AcquisitionLoop, AcquisitionSettings, CancellationToken, LoopMetricsSnapshot, LoopState,
};
pub use buffer::{CircularSampleBuffer, UnrolledSamples};
pub use config::{ConfigError, PipelineConfig, PulseoxConfig, ViewMode};
pub use domain::{decode_packet, encode_packet, Packet, Sample, PACKET_LEN};
pub use error::{AcquisitionError, TransportError};
pub use pipeline::{BatchProcessor, Pipeline, TickOutcome};
pub use shared_state::{ResultSnapshot, SharedResultState};
pub use simulation::{SimulatedSensor, SyntheticPpg};
pub use transport::{PacketTransport, ScriptedTransport};

pub use pulseox_signals as signals;
