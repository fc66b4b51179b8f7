//! Absorbance conditioning
//!
//! Converts unrolled sensor intensities into the plotted photoplethysmogram.
//!
//! More blood in the light path absorbs more light, so a heartbeat shows up as
//! an intensity trough. Taking `-ln(I / max(I))` flips it into an absorbance
//! peak and removes the per-channel DC gain.
//!
//! Both channels are scaled by one shared factor. The SpO2 ratio-of-ratios
//! depends on the red/IR amplitude relation, so plotting must not hide it.

use ndarray::Array1;

use crate::error::{Channel, SignalError};

/// Per-batch conditioned waveform, all arrays share the batch length.
#[derive(Debug, Clone)]
pub struct ConditionedWaveform {
    /// Sample positions scaled to `[0, display_width]` from sequence deltas
    pub time_axis: Array1<f64>,
    /// Red absorbance over the shared normalization factor
    pub normalized_red: Array1<f64>,
    /// IR absorbance over the shared normalization factor
    pub normalized_ir: Array1<f64>,
    /// Sum of the two channels, each scaled to its own maximum (range `[0, 2]`).
    /// Beat detection runs on this so one threshold fits every batch.
    pub detection: Array1<f64>,
}

impl ConditionedWaveform {
    pub fn len(&self) -> usize {
        self.time_axis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time_axis.is_empty()
    }
}

/// Stateless conditioner bound to a display width.
#[derive(Debug, Clone, Copy)]
pub struct SignalConditioner {
    display_width: f64,
}

impl SignalConditioner {
    pub fn new(display_width: f64) -> Self {
        Self { display_width }
    }

    pub fn display_width(&self) -> f64 {
        self.display_width
    }

    /// Condition one unrolled batch.
    ///
    /// # Arguments
    /// * `seq` - Device sequence numbers, oldest first
    /// * `red` - Red intensities aligned with `seq`
    /// * `ir` - IR intensities aligned with `seq`
    ///
    /// # Errors
    /// * `LengthMismatch` if the three slices differ in length
    /// * `DegenerateBatch` if no time elapsed or both channels are flat
    /// * `ZeroIntensity` if any sample reads zero
    pub fn condition(
        &self,
        seq: &[u32],
        red: &[u32],
        ir: &[u32],
    ) -> Result<ConditionedWaveform, SignalError> {
        if seq.len() != red.len() || seq.len() != ir.len() {
            return Err(SignalError::LengthMismatch {
                seq: seq.len(),
                red: red.len(),
                ir: ir.len(),
            });
        }

        let time_axis = time_axis(seq, self.display_width)?;
        let abs_red = absorbance(red, Channel::Red)?;
        let abs_ir = absorbance(ir, Channel::Infrared)?;

        let max_red = max_of(&abs_red);
        let max_ir = max_of(&abs_ir);
        let norm = max_red.max(max_ir);
        if !(norm > 0.0) {
            return Err(SignalError::DegenerateBatch("flat absorbance on both channels"));
        }

        let detection = scaled(&abs_red, max_red) + &scaled(&abs_ir, max_ir);

        Ok(ConditionedWaveform {
            time_axis,
            normalized_red: abs_red.mapv(|a| a / norm),
            normalized_ir: abs_ir.mapv(|a| a / norm),
            detection,
        })
    }
}

/// Map sequence numbers onto `[0, width]`.
///
/// Differences use wrapping arithmetic, so a counter rollover inside the
/// batch does not break the axis.
pub fn time_axis(seq: &[u32], width: f64) -> Result<Array1<f64>, SignalError> {
    let (first, last) = match (seq.first(), seq.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return Err(SignalError::DegenerateBatch("empty batch")),
    };

    let span = last.wrapping_sub(first);
    if span == 0 {
        return Err(SignalError::DegenerateBatch("no time elapsed across batch"));
    }

    let span = span as f64;
    Ok(seq
        .iter()
        .map(|&s| width * s.wrapping_sub(first) as f64 / span)
        .collect())
}

/// `-ln(I / max(I))` for one channel.
pub fn absorbance(intensity: &[u32], channel: Channel) -> Result<Array1<f64>, SignalError> {
    if let Some(index) = intensity.iter().position(|&v| v == 0) {
        return Err(SignalError::ZeroIntensity { channel, index });
    }

    let max = match intensity.iter().copied().max() {
        Some(max) => max as f64,
        None => return Err(SignalError::DegenerateBatch("empty batch")),
    };

    Ok(intensity.iter().map(|&v| -(v as f64 / max).ln()).collect())
}

fn max_of(values: &Array1<f64>) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

// A flat channel contributes nothing to the detection trace.
fn scaled(values: &Array1<f64>, max: f64) -> Array1<f64> {
    if max > 0.0 {
        values.mapv(|v| v / max)
    } else {
        Array1::zeros(values.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn pulse_batch(n: usize, base_red: f64, base_ir: f64) -> (Vec<u32>, Vec<u32>, Vec<u32>) {
        let seq: Vec<u32> = (0..n as u32).map(|k| 1_000 + k).collect();
        let p: Vec<f64> = (0..n)
            .map(|k| 0.5 - 0.5 * (2.0 * PI * k as f64 / 50.0).cos())
            .collect();
        let red = p.iter().map(|p| (base_red * (-0.02 * p).exp()).round() as u32).collect();
        let ir = p.iter().map(|p| (base_ir * (-0.03 * p).exp()).round() as u32).collect();
        (seq, red, ir)
    }

    #[test]
    fn test_time_axis_spans_display_width() {
        let seq: Vec<u32> = (0..11).map(|k| 500 + 2 * k).collect();
        let t = time_axis(&seq, 780.0).unwrap();

        assert_relative_eq!(t[0], 0.0);
        assert_relative_eq!(t[5], 390.0, epsilon = 1e-9);
        assert_relative_eq!(t[10], 780.0, epsilon = 1e-9);
    }

    #[test]
    fn test_time_axis_survives_counter_wrap() {
        let seq = vec![u32::MAX - 1, u32::MAX, 0, 1];
        let t = time_axis(&seq, 3.0).unwrap();
        assert_relative_eq!(t[2], 2.0, epsilon = 1e-9);
        assert_relative_eq!(t[3], 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_no_elapsed_time_is_degenerate() {
        let conditioner = SignalConditioner::new(780.0);
        let err = conditioner
            .condition(&[7, 8, 7], &[10, 11, 12], &[10, 11, 12])
            .unwrap_err();
        assert!(matches!(err, SignalError::DegenerateBatch(_)));
    }

    #[test]
    fn test_zero_intensity_is_reported() {
        let conditioner = SignalConditioner::new(780.0);
        let err = conditioner
            .condition(&[1, 2, 3], &[10, 11, 12], &[10, 0, 12])
            .unwrap_err();
        assert_eq!(
            err,
            SignalError::ZeroIntensity {
                channel: Channel::Infrared,
                index: 1
            }
        );
    }

    #[test]
    fn test_length_mismatch() {
        let conditioner = SignalConditioner::new(780.0);
        let err = conditioner.condition(&[1, 2, 3], &[10, 11], &[10, 11, 12]).unwrap_err();
        assert!(matches!(err, SignalError::LengthMismatch { .. }));
    }

    #[test]
    fn test_flat_batch_is_degenerate() {
        let conditioner = SignalConditioner::new(780.0);
        let err = conditioner
            .condition(&[1, 2, 3], &[500, 500, 500], &[900, 900, 900])
            .unwrap_err();
        assert!(matches!(err, SignalError::DegenerateBatch(_)));
    }

    #[test]
    fn test_shared_normalization_preserves_channel_ratio() {
        let (seq, red, ir) = pulse_batch(200, 800_000.0, 1_000_000.0);
        let w = SignalConditioner::new(780.0).condition(&seq, &red, &ir).unwrap();

        // IR has the larger modulation, so it owns the normalization factor
        let max_ir = w.normalized_ir.iter().copied().fold(f64::MIN, f64::max);
        let max_red = w.normalized_red.iter().copied().fold(f64::MIN, f64::max);
        assert_relative_eq!(max_ir, 1.0, epsilon = 1e-12);
        assert_relative_eq!(max_red, 2.0 / 3.0, epsilon = 1e-3);

        // Absorbance is non-negative by construction
        assert!(w.normalized_red.iter().all(|&v| v >= 0.0));
        assert!(w.normalized_ir.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_detection_trace_scales_each_channel() {
        let (seq, red, ir) = pulse_batch(200, 800_000.0, 1_000_000.0);
        let w = SignalConditioner::new(780.0).condition(&seq, &red, &ir).unwrap();

        let max_det = w.detection.iter().copied().fold(f64::MIN, f64::max);
        assert_relative_eq!(max_det, 2.0, epsilon = 1e-3);
        assert_eq!(w.len(), 200);
    }

    #[test]
    fn test_single_flat_channel_still_conditions() {
        let seq = vec![1, 2, 3, 4];
        let red = vec![100, 90, 100, 90];
        let ir = vec![400, 400, 400, 400];
        let w = SignalConditioner::new(10.0).condition(&seq, &red, &ir).unwrap();

        assert!(w.normalized_ir.iter().all(|&v| v == 0.0));
        assert_relative_eq!(w.detection[1], 1.0, epsilon = 1e-12);
    }
}
