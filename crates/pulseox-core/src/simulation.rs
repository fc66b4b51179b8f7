//! Synthetic sensor
//!
//! Stands in for the finger probe when no hardware is attached. Each beat is
//! a raised-cosine blood-volume pulse `p ∈ [0, 1]`; detected light follows
//! Beer-Lambert, `I = base · exp(-a · p)`. The red/IR absorption ratio is
//! solved from the requested saturation, so a clean stream reads back the
//! configured SpO2.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::PI;
use std::time::Duration;

use pulseox_signals::physio::CALIBRATION_K;
use pulseox_signals::ratio_for_spo2;

use crate::config::SimulationConfig;
use crate::domain::{encode_packet, Packet, Sample, DATASETS_PER_PACKET};
use crate::error::TransportError;
use crate::transport::PacketTransport;

const BASE_RED: f64 = 800_000.0;
const BASE_IR: f64 = 1_000_000.0;
/// IR pulsatile absorbance at full pulse
const PULSE_ABSORBANCE_IR: f64 = 0.02;

/// Sample-by-sample PPG generator.
#[derive(Debug, Clone)]
pub struct SyntheticPpg {
    sample_period_s: f64,
    beat_period_s: f64,
    absorbance_red: f64,
    absorbance_ir: f64,
    noise: Option<Normal<f64>>,
    seq: u32,
    elapsed_s: f64,
    rng: StdRng,
}

impl SyntheticPpg {
    pub fn new(cfg: &SimulationConfig, sample_period_s: f64) -> Self {
        Self::with_rng(cfg, sample_period_s, StdRng::from_entropy())
    }

    /// Reproducible noise.
    pub fn with_seed(cfg: &SimulationConfig, sample_period_s: f64, seed: u64) -> Self {
        Self::with_rng(cfg, sample_period_s, StdRng::seed_from_u64(seed))
    }

    fn with_rng(cfg: &SimulationConfig, sample_period_s: f64, rng: StdRng) -> Self {
        // Uncalibrated ratio that the estimator maps back onto the target
        let ratio = ratio_for_spo2(cfg.spo2_percent) - CALIBRATION_K;

        Self {
            sample_period_s,
            beat_period_s: 60.0 / cfg.heart_rate_bpm,
            absorbance_red: ratio * PULSE_ABSORBANCE_IR,
            absorbance_ir: PULSE_ABSORBANCE_IR,
            noise: noise_distribution(cfg.noise_std),
            seq: cfg.start_seq,
            elapsed_s: 0.0,
            rng,
        }
    }

    /// Blood-volume pulse at `t`, 0 at diastole and 1 at systole.
    pub fn pulse(&self, t: f64) -> f64 {
        let phase = (t / self.beat_period_s).fract();
        0.5 * (1.0 - (2.0 * PI * phase).cos())
    }

    pub fn next_sample(&mut self) -> Sample {
        let p = self.pulse(self.elapsed_s);
        let red = BASE_RED * (-self.absorbance_red * p).exp() + self.noise();
        let ir = BASE_IR * (-self.absorbance_ir * p).exp() + self.noise();

        let sample = Sample::new(to_count(red), to_count(ir), self.seq);
        self.seq = self.seq.wrapping_add(1);
        self.elapsed_s += self.sample_period_s;
        sample
    }

    pub fn next_packet(&mut self) -> Packet {
        let mut packet = [Sample::new(0, 0, 0); DATASETS_PER_PACKET];
        for sample in packet.iter_mut() {
            *sample = self.next_sample();
        }
        packet
    }

    /// Sequence number the next sample will carry.
    pub fn next_seq(&self) -> u32 {
        self.seq
    }

    /// Whether samples carry additive noise.
    pub fn is_noisy(&self) -> bool {
        self.noise.is_some()
    }

    fn noise(&mut self) -> f64 {
        match &self.noise {
            Some(dist) => dist.sample(&mut self.rng),
            None => 0.0,
        }
    }
}

/// Zero-mean Gaussian with the given deviation, or `None` for a clean signal.
///
/// A deviation that is not a finite positive number disables noise;
/// [`SimulationConfig`] validation rejects those before they get here.
fn noise_distribution(std_dev: f64) -> Option<Normal<f64>> {
    if std_dev == 0.0 {
        return None;
    }
    if !(std_dev.is_finite() && std_dev > 0.0) {
        log::warn!("ignoring invalid noise deviation {}", std_dev);
        return None;
    }
    Normal::new(0.0, std_dev).ok()
}

/// The device reports a zero count when it fails to measure, so a real
/// reading is clamped to at least 1.
fn to_count(intensity: f64) -> u32 {
    intensity.round().clamp(1.0, u32::MAX as f64) as u32
}

/// [`PacketTransport`] backed by a [`SyntheticPpg`].
///
/// Reads return immediately; pacing is the acquisition loop's job.
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    ppg: SyntheticPpg,
    packets: u64,
}

impl SimulatedSensor {
    pub fn new(ppg: SyntheticPpg) -> Self {
        Self { ppg, packets: 0 }
    }

    pub fn from_config(cfg: &SimulationConfig, sample_period_s: f64) -> Self {
        Self::new(SyntheticPpg::new(cfg, sample_period_s))
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets
    }

    pub fn generator(&self) -> &SyntheticPpg {
        &self.ppg
    }
}

impl PacketTransport for SimulatedSensor {
    fn read_packet(&mut self, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.packets += 1;
        Ok(encode_packet(&self.ppg.next_packet()))
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
