//! Physiological estimators
//!
//! - `BeatMarkers` - systole/diastole points cleaned up for estimation
//! - `HeartRateEstimator` - peak spacing to smoothed BPM
//! - `Spo2Estimator` - ratio-of-ratios to smoothed saturation

mod beats;
mod heart_rate;
mod spo2;

pub use beats::{edge_threshold, BeatMarkers, MIN_BEATS};
pub use heart_rate::{HeartRateConfig, HeartRateEstimate, HeartRateEstimator};
pub use spo2::{
    ratio_for_spo2, spo2_from_ratio, Spo2Config, Spo2Estimator, Spo2Outcome, CALIBRATION_K,
};
