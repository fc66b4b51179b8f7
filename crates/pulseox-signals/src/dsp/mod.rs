//! DSP (Digital Signal Processing) module
//!
//! Building blocks shared by the physiological estimators:
//! - `SignalConditioner` - raw intensity to normalized absorbance
//! - `PeakTroughDetector` - hysteresis extremum detection on any numeric trace
//! - `RollingMedian` - fixed-window median smoothing of per-batch estimates

mod conditioning;
mod peak_detect;
mod rolling;

pub use conditioning::{absorbance, time_axis, ConditionedWaveform, SignalConditioner};
pub use peak_detect::{detect_extrema, Extrema, PeakTroughDetector};
pub use rolling::{median, RollingMedian};
