//! Beat markers
//!
//! Systole is an absorbance peak (intensity trough, most blood in the light
//! path); diastole is an absorbance trough. Detector output is turned into
//! markers the estimators can trust:
//!
//! 1. At least `MIN_BEATS` of each, otherwise the batch has no reading.
//! 2. A point past the edge threshold is dropped; the detector commits the
//!    newest sample as an extremum whenever the window ends mid-stroke.
//! 3. Diastole must start after the first systole so the pairs line up.

use crate::dsp::Extrema;

/// Minimum number of peaks and of troughs for a usable batch.
pub const MIN_BEATS: usize = 3;

/// Index past which trailing detections are unreliable.
///
/// Half a beat at 60 BPM is `samples_per_second / 2` samples.
pub fn edge_threshold(buffer_capacity: usize, samples_per_second: f64) -> usize {
    buffer_capacity.saturating_sub((samples_per_second / 2.0).round() as usize)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BeatMarkers {
    pub systole: Vec<usize>,
    pub diastole: Vec<usize>,
}

impl BeatMarkers {
    /// Build markers from detector output, or `None` when the batch holds
    /// too few beats.
    ///
    /// # Arguments
    /// * `extrema` - Maxima become systole, minima become diastole
    /// * `edge_threshold` - See [`edge_threshold`]
    pub fn from_extrema(extrema: &Extrema, edge_threshold: usize) -> Option<Self> {
        if !extrema.has_at_least(MIN_BEATS) {
            return None;
        }

        let mut systole = extrema.maxima.clone();
        let mut diastole = extrema.minima.clone();

        drop_trailing_edge(&mut systole, edge_threshold);
        drop_trailing_edge(&mut diastole, edge_threshold);

        if let (Some(&d), Some(&s)) = (diastole.first(), systole.first()) {
            if d <= s {
                diastole.remove(0);
            }
        }

        Some(Self { systole, diastole })
    }

    /// `(systole, diastole)` pairs, each diastole matched with the systole
    /// immediately before it. Diastole points with no earlier systole are skipped.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.diastole.iter().filter_map(move |&d| {
            let before = self.systole.partition_point(|&s| s < d);
            before.checked_sub(1).map(|i| (self.systole[i], d))
        })
    }
}

fn drop_trailing_edge(points: &mut Vec<usize>, edge_threshold: usize) {
    if points.last().is_some_and(|&last| last > edge_threshold) {
        points.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extrema(maxima: &[usize], minima: &[usize]) -> Extrema {
        Extrema {
            maxima: maxima.to_vec(),
            minima: minima.to_vec(),
        }
    }

    #[test]
    fn test_edge_threshold_at_six_ms() {
        assert_eq!(edge_threshold(1500, 1.0 / 0.006), 1417);
        assert_eq!(edge_threshold(12000, 1.0 / 0.006), 11917);
        assert_eq!(edge_threshold(10, 1.0 / 0.006), 0);
    }

    #[test]
    fn test_too_few_beats() {
        assert!(BeatMarkers::from_extrema(&extrema(&[10, 20], &[15, 25, 35]), 100).is_none());
        assert!(BeatMarkers::from_extrema(&extrema(&[10, 20, 30], &[15, 25]), 100).is_none());
    }

    #[test]
    fn test_trailing_edge_points_are_dropped() {
        let m = BeatMarkers::from_extrema(&extrema(&[100, 200, 300, 499], &[150, 250, 350, 498]), 450)
            .unwrap();
        assert_eq!(m.systole, vec![100, 200, 300]);
        assert_eq!(m.diastole, vec![150, 250, 350]);
    }

    #[test]
    fn test_leading_diastole_is_aligned() {
        let m = BeatMarkers::from_extrema(&extrema(&[100, 200, 300], &[50, 150, 250]), 450).unwrap();
        assert_eq!(m.diastole, vec![150, 250]);
        assert_eq!(m.pairs().collect::<Vec<_>>(), vec![(100, 150), (200, 250)]);
    }

    #[test]
    fn test_pairs_use_preceding_systole() {
        let m = BeatMarkers {
            systole: vec![100, 200],
            diastole: vec![150, 250, 260],
        };
        assert_eq!(
            m.pairs().collect::<Vec<_>>(),
            vec![(100, 150), (200, 250), (200, 260)]
        );
    }
}
