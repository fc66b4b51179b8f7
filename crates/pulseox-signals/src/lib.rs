//! # pulseox-signals
//!
//! Signal processing for two-wavelength photoplethysmography.
//!
//! This crate provides:
//! - **DSP**: absorbance conditioning, hysteresis peak/trough detection, rolling medians
//! - **Physiology**: beat-marker alignment, heart rate and SpO2 estimation
//!
//! Everything here is a pure function of its inputs or of an estimator's own
//! history; threading and I/O live in `pulseox-core`.
//!
//! ## Example
//!
//! ```ignore
//! use pulseox_signals::{PeakTroughDetector, SignalConditioner};
//!
//! let conditioner = SignalConditioner::new(780.0);
//! let waveform = conditioner.condition(&seq, &red, &ir)?;
//!
//! let detector = PeakTroughDetector::new(0.15)?;
//! let extrema = detector.detect_array(&waveform.detection);
//! println!("{} beats in window", extrema.maxima.len());
//! ```

mod error;

pub mod dsp;
pub mod physio;

pub use error::{Channel, SignalError};

pub use dsp::{
    detect_extrema, median, ConditionedWaveform, Extrema, PeakTroughDetector, RollingMedian,
    SignalConditioner,
};
pub use physio::{
    ratio_for_spo2, spo2_from_ratio, BeatMarkers, HeartRateConfig, HeartRateEstimate,
    HeartRateEstimator, Spo2Config, Spo2Estimator, Spo2Outcome,
};
