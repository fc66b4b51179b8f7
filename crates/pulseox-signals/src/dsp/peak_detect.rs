//! Hysteresis peak/trough detection
//!
//! Classic lookahead zig-zag detector: a point is a maximum once the signal
//! has fallen at least `delta` below it, and a minimum once the signal has
//! risen at least `delta` above it.
//!
//! The scan runs from the newest sample back to the oldest. On a live,
//! right-growing stream the trailing edge is the least settled part of the
//! window, and starting there keeps its half-formed beat from shifting the
//! detections in the settled part.

use std::collections::VecDeque;

use ndarray::Array1;

use crate::error::SignalError;

/// Detected extrema as ascending sample indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extrema {
    pub maxima: Vec<usize>,
    pub minima: Vec<usize>,
}

impl Extrema {
    /// True when both sequences hold at least `count` points.
    pub fn has_at_least(&self, count: usize) -> bool {
        self.maxima.len() >= count && self.minima.len() >= count
    }
}

/// Detector with a validated threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakTroughDetector {
    delta: f64,
}

impl PeakTroughDetector {
    /// Create a detector.
    ///
    /// # Errors
    /// `InvalidThreshold` if `delta` is not strictly positive (NaN included).
    pub fn new(delta: f64) -> Result<Self, SignalError> {
        if !(delta > 0.0) {
            return Err(SignalError::InvalidThreshold(delta));
        }
        Ok(Self { delta })
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Detect extrema in any numeric slice.
    pub fn detect<T: Copy + Into<f64>>(&self, values: &[T]) -> Extrema {
        scan(values.iter().map(|&v| v.into()), self.delta)
    }

    /// Detect extrema in a conditioned trace.
    pub fn detect_array(&self, values: &Array1<f64>) -> Extrema {
        scan(values.iter().copied(), self.delta)
    }
}

/// One-shot detection with threshold validation.
pub fn detect_extrema<T: Copy + Into<f64>>(
    values: &[T],
    delta: f64,
) -> Result<Extrema, SignalError> {
    Ok(PeakTroughDetector::new(delta)?.detect(values))
}

fn scan<I>(values: I, delta: f64) -> Extrema
where
    I: DoubleEndedIterator<Item = f64> + ExactSizeIterator,
{
    let len = values.len();

    let mut maxima = VecDeque::new();
    let mut minima = VecDeque::new();

    let mut max = f64::NEG_INFINITY;
    let mut min = f64::INFINITY;
    let mut max_pos: Option<usize> = None;
    let mut min_pos: Option<usize> = None;
    let mut seeking_max = true;

    for (offset, value) in values.rev().enumerate() {
        let index = len - 1 - offset;

        if value > max {
            max = value;
            max_pos = Some(index);
        }
        if value < min {
            min = value;
            min_pos = Some(index);
        }

        if seeking_max {
            if value < max - delta {
                if let Some(pos) = max_pos {
                    maxima.push_front(pos);
                }
                min = value;
                min_pos = Some(index);
                seeking_max = false;
            }
        } else if value > min + delta {
            if let Some(pos) = min_pos {
                minima.push_front(pos);
            }
            max = value;
            max_pos = Some(index);
            seeking_max = true;
        }
    }

    Extrema {
        maxima: maxima.into(),
        minima: minima.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::f64::consts::PI;

    fn cosine(period: usize, len: usize) -> Vec<f64> {
        (0..len)
            .map(|k| (2.0 * PI * k as f64 / period as f64).cos())
            .collect()
    }

    #[test]
    fn test_rejects_non_positive_threshold() {
        assert_eq!(
            PeakTroughDetector::new(0.0),
            Err(SignalError::InvalidThreshold(0.0))
        );
        assert_eq!(
            detect_extrema(&[1.0f64, 2.0, 1.0], -1.0),
            Err(SignalError::InvalidThreshold(-1.0))
        );
        assert!(PeakTroughDetector::new(f64::NAN).is_err());
    }

    #[test]
    fn test_sinusoid_extrema_are_one_period_apart() {
        let period = 40;
        // Ends exactly on a trough so neither edge yields a partial detection
        let signal = cosine(period, 10 * period + period / 2 + 1);

        let extrema = detect_extrema(&signal, 0.5).unwrap();

        let expected_max: Vec<usize> = (1..=10).map(|n| n * period).collect();
        let expected_min: Vec<usize> = (0..10).map(|n| n * period + period / 2).collect();
        assert_eq!(extrema.maxima, expected_max);
        assert_eq!(extrema.minima, expected_min);

        for w in extrema.maxima.windows(2) {
            assert_eq!(w[1] - w[0], period);
        }
    }

    #[test]
    fn test_trailing_rise_reports_edge_maximum() {
        // Window ending mid-upstroke: newest sample is the running max
        let period = 40;
        let signal = cosine(period, 10 * period);

        let extrema = detect_extrema(&signal, 0.5).unwrap();
        assert_eq!(extrema.maxima.last(), Some(&(10 * period - 1)));
        assert_eq!(extrema.maxima[0], period);
    }

    #[test]
    fn test_integer_input() {
        let raw: Vec<u32> = vec![10, 50, 10, 50, 10, 50, 10];
        let extrema = detect_extrema(&raw, 20.0).unwrap();
        assert_eq!(extrema.maxima, vec![1, 3, 5]);
        assert_eq!(extrema.minima, vec![2, 4]);
    }

    #[test]
    fn test_small_wiggles_are_ignored() {
        let signal = vec![0.0, 1.0, 0.95, 1.0, 0.0, 0.05, 0.0, 1.0, 0.0];
        let extrema = detect_extrema(&signal, 0.5).unwrap();
        assert_eq!(extrema.maxima, vec![3, 7]);
        assert_eq!(extrema.minima, vec![6]);
    }

    #[test]
    fn test_array_and_slice_agree() {
        let signal = cosine(30, 200);
        let detector = PeakTroughDetector::new(0.3).unwrap();
        let from_slice = detector.detect(&signal);
        let from_array = detector.detect_array(&Array1::from(signal));
        assert_eq!(from_slice, from_array);
    }

    #[test]
    fn test_empty_and_constant_input() {
        let detector = PeakTroughDetector::new(0.1).unwrap();
        assert_eq!(detector.detect::<f64>(&[]), Extrema::default());
        assert_eq!(detector.detect(&[3.0f64; 50]), Extrema::default());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_extrema_ascend_and_alternate(
            values in prop::collection::vec(-10.0f64..10.0, 0..300),
            delta in 0.01f64..5.0,
        ) {
            let extrema = detect_extrema(&values, delta).unwrap();

            prop_assert!(extrema.maxima.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(extrema.minima.windows(2).all(|w| w[0] < w[1]));

            let mut merged: Vec<(usize, bool)> = extrema
                .maxima
                .iter()
                .map(|&i| (i, true))
                .chain(extrema.minima.iter().map(|&i| (i, false)))
                .collect();
            merged.sort_unstable();
            prop_assert!(merged.windows(2).all(|w| w[0].0 < w[1].0 && w[0].1 != w[1].1));
        }

        #[test]
        fn prop_extrema_clear_threshold_in_scan_direction(
            values in prop::collection::vec(-10.0f64..10.0, 2..300),
            delta in 0.01f64..5.0,
        ) {
            let extrema = detect_extrema(&values, delta).unwrap();
            // The scan runs backwards, so the confirming swing lies earlier in time
            for &peak in &extrema.maxima {
                let earlier_min = values[..peak].iter().copied().fold(f64::INFINITY, f64::min);
                prop_assert!(values[peak] - earlier_min >= delta);
            }
            for &trough in &extrema.minima {
                let earlier_max = values[..trough].iter().copied().fold(f64::NEG_INFINITY, f64::max);
                prop_assert!(earlier_max - values[trough] >= delta);
            }
        }
    }
}
