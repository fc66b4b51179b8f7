//! Heart rate from systole spacing.
//!
//! Elapsed time comes from device sequence numbers rather than buffer
//! indices, so a dropped packet stretches the interval instead of silently
//! compressing it.

use crate::dsp::RollingMedian;

#[derive(Debug, Clone)]
pub struct HeartRateConfig {
    /// Seconds between consecutive device samples.
    pub sample_period_s: f64,
    /// Number of batch estimates kept for the median (~3 s of batches).
    pub history_len: usize,
    /// Value the history starts filled with. `None` starts empty.
    pub history_seed: Option<f64>,
}

impl Default for HeartRateConfig {
    fn default() -> Self {
        Self {
            sample_period_s: 0.006,
            history_len: 11,
            history_seed: Some(60.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeartRateEstimate {
    /// Rate measured in this batch alone.
    pub instantaneous_bpm: f64,
    /// Median over the history, the user-facing value.
    pub smoothed_bpm: f64,
}

impl HeartRateEstimate {
    pub fn label(&self) -> String {
        format!("{}", self.smoothed_bpm.round() as i64)
    }
}

#[derive(Debug, Clone)]
pub struct HeartRateEstimator {
    cfg: HeartRateConfig,
    history: RollingMedian,
}

impl HeartRateEstimator {
    pub fn new() -> Self {
        Self::with_config(HeartRateConfig::default())
    }

    pub fn with_config(cfg: HeartRateConfig) -> Self {
        let history = match cfg.history_seed {
            Some(seed) => RollingMedian::seeded(cfg.history_len, seed),
            None => RollingMedian::new(cfg.history_len),
        };
        Self { cfg, history }
    }

    pub fn config(&self) -> &HeartRateConfig {
        &self.cfg
    }

    pub fn reset(&mut self) {
        *self = Self::with_config(self.cfg.clone());
    }

    /// Beats per minute across a run of systole points.
    ///
    /// # Arguments
    /// * `systole` - Ascending sample indices of detected beats
    /// * `seq` - Device sequence numbers of the batch
    /// * `sample_period_s` - Seconds per sequence step
    ///
    /// # Returns
    /// `None` with fewer than two beats, an index outside `seq`, or no
    /// elapsed time.
    pub fn beats_per_minute(systole: &[usize], seq: &[u32], sample_period_s: f64) -> Option<f64> {
        if systole.len() < 2 {
            return None;
        }
        let first = *seq.get(*systole.first()?)?;
        let last = *seq.get(*systole.last()?)?;

        let elapsed_s = sample_period_s * last.wrapping_sub(first) as f64;
        if !(elapsed_s > 0.0) {
            return None;
        }

        Some(60.0 * (systole.len() - 1) as f64 / elapsed_s)
    }

    /// Measure this batch and fold it into the history.
    ///
    /// The history is only touched when the batch yields a rate.
    pub fn update(&mut self, systole: &[usize], seq: &[u32]) -> Option<HeartRateEstimate> {
        let bpm = Self::beats_per_minute(systole, seq, self.cfg.sample_period_s)?;
        self.history.push(bpm);
        let smoothed_bpm = self.history.median()?;

        Some(HeartRateEstimate {
            instantaneous_bpm: bpm,
            smoothed_bpm,
        })
    }

    pub fn history(&self) -> &RollingMedian {
        &self.history
    }
}

impl Default for HeartRateEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn seq_from(start: u32, len: usize) -> Vec<u32> {
        (0..len as u32).map(|k| start.wrapping_add(k)).collect()
    }

    #[test]
    fn test_even_train_at_125_samples() {
        // 125 samples * 6 ms = 0.75 s per beat
        let seq = seq_from(40_000, 1500);
        let peaks: Vec<usize> = (0..5).map(|n| 100 + 125 * n).collect();

        let bpm = HeartRateEstimator::beats_per_minute(&peaks, &seq, 0.006).unwrap();
        assert_relative_eq!(bpm, 80.0, epsilon = 1e-9);
    }

    #[test]
    fn test_train_near_sixty_bpm() {
        let seq = seq_from(7, 1500);
        let peaks = vec![10, 176, 343, 509, 676];

        let bpm = HeartRateEstimator::beats_per_minute(&peaks, &seq, 0.006).unwrap();
        assert_eq!(bpm.round(), 60.0);
    }

    #[test]
    fn test_sequence_wrap_inside_batch() {
        let seq = seq_from(u32::MAX - 200, 1500);
        let peaks = vec![100, 350, 600];

        let bpm = HeartRateEstimator::beats_per_minute(&peaks, &seq, 0.006).unwrap();
        assert_relative_eq!(bpm, 40.0, epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_inputs() {
        let seq = vec![5u32; 100];
        assert!(HeartRateEstimator::beats_per_minute(&[10], &seq, 0.006).is_none());
        assert!(HeartRateEstimator::beats_per_minute(&[10, 20], &seq, 0.006).is_none());
        assert!(HeartRateEstimator::beats_per_minute(&[10, 200], &seq, 0.006).is_none());
    }

    #[test]
    fn test_seeded_history_lags_then_follows() {
        let mut est = HeartRateEstimator::with_config(HeartRateConfig {
            history_len: 3,
            ..Default::default()
        });
        let seq = seq_from(0, 1500);
        let peaks: Vec<usize> = (0..5).map(|n| 125 * n).collect();

        let first = est.update(&peaks, &seq).unwrap();
        assert_relative_eq!(first.instantaneous_bpm, 80.0, epsilon = 1e-9);
        assert_eq!(first.label(), "60");

        let second = est.update(&peaks, &seq).unwrap();
        assert_eq!(second.label(), "80");
    }

    #[test]
    fn test_failed_batch_leaves_history_alone() {
        let mut est = HeartRateEstimator::new();
        let before = est.history().values().to_vec();
        assert!(est.update(&[3], &seq_from(0, 10)).is_none());
        assert_eq!(est.history().values(), before.as_slice());
    }

    #[test]
    fn test_label_rounds_to_nearest() {
        let e = HeartRateEstimate {
            instantaneous_bpm: 71.6,
            smoothed_bpm: 71.5,
        };
        assert_eq!(e.label(), "72");
    }
}
