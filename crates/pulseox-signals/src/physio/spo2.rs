//! SpO2 from the ratio of ratios.
//!
//! For each beat, red and IR modulation are measured as
//! `ln(I_diastole / I_systole)`; their ratio `R` tracks oxygen saturation.
//! The two-wavelength absorption model (660 nm / 940 nm) is
//!
//! ```text
//! SpO2 = 100 * (0.81 - 0.18 R') / (0.63 + 0.11 R'),   R' = R + K
//! ```
//!
//! where `K` is an empirical offset fitted against a reference oximeter.
//! Readings outside the plausible band are motion or contact artifacts and
//! are discarded before smoothing.

use crate::dsp::{median, RollingMedian};
use crate::physio::BeatMarkers;

/// Calibration offset added to `R` before the absorption model.
pub const CALIBRATION_K: f64 = -0.024542;

#[derive(Debug, Clone)]
pub struct Spo2Config {
    pub calibration_k: f64,
    /// Exclusive lower bound of accepted readings (%)
    pub accept_min: f64,
    /// Exclusive upper bound of accepted readings (%)
    pub accept_max: f64,
    /// Samples on each side of systole averaged for its intensity
    pub window_half_width: usize,
    /// Number of batch medians kept (~20 s of batches)
    pub history_len: usize,
    /// Value the history starts filled with. `None` starts empty.
    pub history_seed: Option<f64>,
}

impl Default for Spo2Config {
    fn default() -> Self {
        Self {
            calibration_k: CALIBRATION_K,
            accept_min: 85.0,
            accept_max: 100.0,
            window_half_width: 2,
            history_len: 74,
            history_seed: Some(98.0),
        }
    }
}

/// Absorption model: calibrated ratio `R'` to saturation (%).
pub fn spo2_from_ratio(r_prime: f64) -> f64 {
    100.0 * (0.81 - 0.18 * r_prime) / (0.63 + 0.11 * r_prime)
}

/// Inverse of [`spo2_from_ratio`]: the calibrated ratio `R'` that yields `spo2`.
pub fn ratio_for_spo2(spo2: f64) -> f64 {
    (81.0 - 0.63 * spo2) / (18.0 + 0.11 * spo2)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Spo2Outcome {
    Reading {
        /// Median of the readings accepted in this batch
        batch_median: f64,
        /// Median over the history, the user-facing value
        smoothed: f64,
    },
    /// No beat in this batch produced a plausible reading
    NoCurrentReading,
}

impl Spo2Outcome {
    pub fn smoothed(&self) -> Option<f64> {
        match self {
            Spo2Outcome::Reading { smoothed, .. } => Some(*smoothed),
            Spo2Outcome::NoCurrentReading => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Spo2Outcome::Reading { smoothed, .. } => {
                format!("{:.1}", (smoothed * 10.0).round() / 10.0)
            }
            Spo2Outcome::NoCurrentReading => "--".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Spo2Estimator {
    cfg: Spo2Config,
    history: RollingMedian,
}

impl Spo2Estimator {
    pub fn new() -> Self {
        Self::with_config(Spo2Config::default())
    }

    pub fn with_config(cfg: Spo2Config) -> Self {
        let history = match cfg.history_seed {
            Some(seed) => RollingMedian::seeded(cfg.history_len, seed),
            None => RollingMedian::new(cfg.history_len),
        };
        Self { cfg, history }
    }

    pub fn config(&self) -> &Spo2Config {
        &self.cfg
    }

    pub fn reset(&mut self) {
        *self = Self::with_config(self.cfg.clone());
    }

    pub fn accepts(&self, spo2: f64) -> bool {
        spo2 > self.cfg.accept_min && spo2 < self.cfg.accept_max
    }

    /// Uncalibrated `R` for one systole/diastole pair, from raw intensities.
    ///
    /// Systole intensity is the mean over a small window so a single noisy
    /// sample at the trough does not dominate. The window is clipped at the
    /// batch edges.
    pub fn ratio_of_ratios(
        &self,
        systole: usize,
        diastole: usize,
        red: &[u32],
        ir: &[u32],
    ) -> Option<f64> {
        let len = red.len().min(ir.len());
        if systole >= len || diastole >= len {
            return None;
        }

        let lo = systole.saturating_sub(self.cfg.window_half_width);
        let hi = (systole + self.cfg.window_half_width).min(len - 1);

        let r_red = (red[diastole] as f64 / window_mean(&red[lo..=hi])).ln();
        let r_ir = (ir[diastole] as f64 / window_mean(&ir[lo..=hi])).ln();
        let r = r_red / r_ir;

        r.is_finite().then_some(r)
    }

    /// Every accepted per-beat reading in a batch, in beat order.
    pub fn batch_readings(&self, markers: &BeatMarkers, red: &[u32], ir: &[u32]) -> Vec<f64> {
        markers
            .pairs()
            .filter_map(|(s, d)| self.ratio_of_ratios(s, d, red, ir))
            .map(|r| spo2_from_ratio(r + self.cfg.calibration_k))
            .filter(|&spo2| self.accepts(spo2))
            .collect()
    }

    /// Estimate this batch and fold it into the history.
    ///
    /// A batch with no accepted reading leaves the history untouched, so the
    /// next good batch is smoothed against whatever was stored last.
    pub fn update(&mut self, markers: &BeatMarkers, red: &[u32], ir: &[u32]) -> Spo2Outcome {
        let readings = self.batch_readings(markers, red, ir);
        let Some(batch_median) = median(&readings) else {
            log::trace!("no plausible SpO2 reading among {} beats", markers.diastole.len());
            return Spo2Outcome::NoCurrentReading;
        };

        self.history.push(batch_median);
        match self.history.median() {
            Some(smoothed) => Spo2Outcome::Reading {
                batch_median,
                smoothed,
            },
            None => Spo2Outcome::NoCurrentReading,
        }
    }

    pub fn history(&self) -> &RollingMedian {
        &self.history
    }
}

impl Default for Spo2Estimator {
    fn default() -> Self {
        Self::new()
    }
}

fn window_mean(window: &[u32]) -> f64 {
    window.iter().map(|&v| v as f64).sum::<f64>() / window.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Beat train with exact exponential absorbance and a flat top at systole.
    fn beat_train(r: f64, beats: usize, period: usize) -> (BeatMarkers, Vec<u32>, Vec<u32>) {
        let a_ir = 0.02;
        let a_red = r * a_ir;
        let len = beats * period + period;
        let mut red = vec![0u32; len];
        let mut ir = vec![0u32; len];
        let mut systole = Vec::new();
        let mut diastole = Vec::new();

        for k in 0..len {
            // Systole plateau of 5 samples centered on n*period + 10
            let phase = k % period;
            let p = if (8..=12).contains(&phase) { 1.0 } else { 0.0 };
            red[k] = (800_000.0 * (-a_red * p).exp()).round() as u32;
            ir[k] = (1_000_000.0 * (-a_ir * p).exp()).round() as u32;
        }
        for n in 0..beats {
            systole.push(n * period + 10);
            diastole.push(n * period + period / 2);
        }
        (BeatMarkers { systole, diastole }, red, ir)
    }

    #[test]
    fn test_model_at_zero_ratio_is_out_of_band() {
        let spo2 = spo2_from_ratio(0.0);
        assert_relative_eq!(spo2, 128.571_428, epsilon = 1e-4);
        assert!(!Spo2Estimator::new().accepts(spo2));
    }

    #[test]
    fn test_inverse_model() {
        for target in [88.0, 92.5, 97.0, 99.5] {
            assert_relative_eq!(spo2_from_ratio(ratio_for_spo2(target)), target, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_band_is_exclusive() {
        let est = Spo2Estimator::new();
        assert!(!est.accepts(85.0));
        assert!(!est.accepts(100.0));
        assert!(est.accepts(85.01));
        assert!(est.accepts(99.99));
    }

    #[test]
    fn test_ratio_recovered_from_beat_train() {
        let (markers, red, ir) = beat_train(0.7, 6, 100);
        let est = Spo2Estimator::new();
        let r = est.ratio_of_ratios(markers.systole[0], markers.diastole[0], &red, &ir).unwrap();
        assert_relative_eq!(r, 0.7, epsilon = 1e-3);
    }

    #[test]
    fn test_batch_reading_matches_target() {
        let target = 97.0;
        let r = ratio_for_spo2(target) - CALIBRATION_K;
        let (markers, red, ir) = beat_train(r, 6, 100);

        let mut est = Spo2Estimator::with_config(Spo2Config {
            history_seed: None,
            ..Default::default()
        });
        let readings = est.batch_readings(&markers, &red, &ir);
        assert_eq!(readings.len(), 6);

        let outcome = est.update(&markers, &red, &ir);
        assert_eq!(outcome.label(), "97.0");
    }

    #[test]
    fn test_rejected_batch_keeps_history() {
        // R' = 0 lands at 128.6 %, outside the band
        let (markers, red, ir) = beat_train(-CALIBRATION_K, 4, 100);
        let mut est = Spo2Estimator::new();
        let before = est.history().values().to_vec();

        let outcome = est.update(&markers, &red, &ir);
        assert_eq!(outcome, Spo2Outcome::NoCurrentReading);
        assert_eq!(outcome.label(), "--");
        assert_eq!(est.history().values(), before.as_slice());
    }

    #[test]
    fn test_window_clipped_at_batch_start() {
        let est = Spo2Estimator::new();
        let red = vec![90u32, 90, 90, 100, 100];
        let ir = vec![80u32, 80, 80, 100, 100];
        let r = est.ratio_of_ratios(0, 4, &red, &ir).unwrap();
        assert_relative_eq!(r, (100.0f64 / 90.0).ln() / (100.0f64 / 80.0).ln(), epsilon = 1e-12);
        assert!(est.ratio_of_ratios(0, 9, &red, &ir).is_none());
    }

    #[test]
    fn test_seeded_history_smooths_toward_seed() {
        let r = ratio_for_spo2(95.0) - CALIBRATION_K;
        let (markers, red, ir) = beat_train(r, 6, 100);
        let mut est = Spo2Estimator::new();

        let outcome = est.update(&markers, &red, &ir);
        match outcome {
            Spo2Outcome::Reading { batch_median, smoothed } => {
                assert_relative_eq!(batch_median, 95.0, epsilon = 0.01);
                assert_relative_eq!(smoothed, 98.0);
            }
            Spo2Outcome::NoCurrentReading => panic!("expected a reading"),
        }
    }
}
