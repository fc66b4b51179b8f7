//! Result handoff between the acquisition worker and a consumer.
//!
//! # Usage
//! ```ignore
//! use pulseox_core::{PipelineConfig, ResultSnapshot, SharedResultState};
//!
//! let state = SharedResultState::new(ResultSnapshot::placeholder(&PipelineConfig::default()));
//!
//! // Clone the handle for the consumer thread
//! let handle = state.clone();
//! let events = handle.display_events();
//! std::thread::spawn(move || {
//!     for batch in events.iter() {
//!         let snap = handle.snapshot();
//!         println!("#{} HR {} SpO2 {}", batch, snap.heart_rate_label, snap.spo2_label);
//!     }
//! });
//! ```

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use ndarray::Array1;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

use pulseox_signals::PeakTroughDetector;

use crate::config::{PipelineConfig, ViewMode};

/// Label shown when a batch has too few beats for any reading.
pub const NOT_AVAILABLE: &str = "NA";

/// Label shown when beats were found but no SpO2 reading was plausible.
pub const NO_SPO2: &str = "--";

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSnapshot {
    /// Batches evaluated before this one was published (0 = placeholder)
    pub batch: u64,
    pub view: ViewMode,
    pub time_axis: Vec<f64>,
    pub normalized_red: Vec<f64>,
    pub normalized_ir: Vec<f64>,
    /// Systole indices; `None` when the batch had too few beats
    pub peaks: Option<Vec<usize>>,
    /// Diastole indices; `None` when the batch had too few beats
    pub troughs: Option<Vec<usize>>,
    pub heart_rate_label: String,
    pub spo2_label: String,
    /// Smoothed heart rate behind `heart_rate_label`
    pub heart_rate_bpm: Option<f64>,
    /// Smoothed SpO2 behind `spo2_label`
    pub spo2_percent: Option<f64>,
}

impl ResultSnapshot {
    /// Idle frame shown before the first batch: a unit sine with markers,
    /// so the display has a recognizable shape while the ring fills.
    pub fn placeholder(cfg: &PipelineConfig) -> Self {
        let len = cfg.buffer_capacity.max(2);
        let span = (len - 1) as f64;

        let time_axis = Array1::from_shape_fn(len, |k| cfg.display_width * k as f64 / span);
        let wave = Array1::from_shape_fn(len, |k| {
            0.5 * (2.0 * std::f64::consts::PI * k as f64 / 150.0).sin() + 0.5
        });

        let extrema = PeakTroughDetector::new(0.25)
            .map(|d| d.detect_array(&wave))
            .unwrap_or_default();
        let mut peaks = extrema.maxima;
        peaks.pop();

        Self {
            batch: 0,
            view: cfg.view,
            time_axis: time_axis.to_vec(),
            normalized_red: wave.to_vec(),
            normalized_ir: wave.to_vec(),
            peaks: Some(peaks),
            troughs: Some(extrema.minima),
            heart_rate_label: NOT_AVAILABLE.to_string(),
            spo2_label: NOT_AVAILABLE.to_string(),
            heart_rate_bpm: None,
            spo2_percent: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.batch == 0
    }

    /// Every `step`-th `(t, red, ir)` point, for decimated drawing.
    pub fn plot_points(&self, step: usize) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
        self.time_axis
            .iter()
            .zip(&self.normalized_red)
            .zip(&self.normalized_ir)
            .step_by(step.max(1))
            .map(|((&t, &r), &i)| (t, r, i))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

struct Inner {
    latest: Mutex<Arc<ResultSnapshot>>,
    display_tx: Sender<u64>,
    display_rx: Receiver<u64>,
}

/// Thread-safe holder of the latest [`ResultSnapshot`].
///
/// Cloning yields another handle to the same state. The lock is held only
/// long enough to swap or clone an `Arc`; it never escapes this type.
#[derive(Clone)]
pub struct SharedResultState {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SharedResultState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.latest.try_lock() {
            Some(guard) => write!(f, "SharedResultState(batch {})", guard.batch),
            None => write!(f, "SharedResultState(<locked>)"),
        }
    }
}

impl SharedResultState {
    pub fn new(initial: ResultSnapshot) -> Self {
        let (display_tx, display_rx) = bounded(1);
        Self {
            inner: Arc::new(Inner {
                latest: Mutex::new(Arc::new(initial)),
                display_tx,
                display_rx,
            }),
        }
    }

    /// Replace the current snapshot.
    pub fn publish(&self, snapshot: ResultSnapshot) {
        let snapshot = Arc::new(snapshot);
        *self.inner.latest.lock() = snapshot;
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<ResultSnapshot> {
        Arc::clone(&self.inner.latest.lock())
    }

    /// Tell the consumer a new frame is ready to draw.
    ///
    /// Returns `false` if a notification is already pending; the consumer
    /// will pick up the newest snapshot when it wakes either way.
    pub fn signal_display(&self, batch: u64) -> bool {
        match self.inner.display_tx.try_send(batch) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Receiver of display notifications, each carrying the batch number.
    pub fn display_events(&self) -> Receiver<u64> {
        self.inner.display_rx.clone()
    }
}
