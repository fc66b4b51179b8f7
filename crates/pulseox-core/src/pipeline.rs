//! Batch pipeline
//!
//! `BatchProcessor` turns one unrolled window into a [`ResultSnapshot`]:
//! condition → detect → beat markers → heart rate + SpO2. `Pipeline` adds the
//! ring buffer in front and decides, packet by packet, whether to evaluate a
//! batch or to release the previous one for display.

use pulseox_signals::{
    BeatMarkers, HeartRateEstimator, PeakTroughDetector, SignalConditioner, SignalError,
    Spo2Estimator,
};

use crate::buffer::{CircularSampleBuffer, UnrolledSamples};
use crate::config::PipelineConfig;
use crate::domain::{decode_packet, Packet};
use crate::error::AcquisitionError;
use crate::shared_state::{ResultSnapshot, SharedResultState, NOT_AVAILABLE};

/// What one packet did to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Stored, nothing else due
    Buffered,
    /// Refresh boundary: a new snapshot was published
    Published { batch: u64 },
    /// The previously published snapshot was released for display
    DisplaySignaled { batch: u64 },
    /// Refresh boundary, but the window could not be evaluated; the previous
    /// snapshot stays current
    BatchSkipped(SignalError),
}

#[derive(Debug, Clone)]
pub struct BatchProcessor {
    config: PipelineConfig,
    conditioner: SignalConditioner,
    detector: PeakTroughDetector,
    heart_rate: HeartRateEstimator,
    spo2: Spo2Estimator,
    batches: u64,
}

impl BatchProcessor {
    /// # Errors
    /// `Config` if the preset fails validation, `Signal` for a bad detector
    /// threshold.
    pub fn new(config: PipelineConfig) -> Result<Self, AcquisitionError> {
        config.validate()?;
        let detector = PeakTroughDetector::new(config.detector_delta)?;

        Ok(Self {
            conditioner: SignalConditioner::new(config.display_width),
            detector,
            heart_rate: HeartRateEstimator::with_config(config.heart_rate_config()),
            spo2: Spo2Estimator::with_config(config.spo2_config()),
            batches: 0,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Batches evaluated so far.
    pub fn batches(&self) -> u64 {
        self.batches
    }

    pub fn heart_rate(&self) -> &HeartRateEstimator {
        &self.heart_rate
    }

    pub fn spo2(&self) -> &Spo2Estimator {
        &self.spo2
    }

    /// Evaluate one window.
    ///
    /// A window with too few beats still yields a snapshot (waveform only,
    /// labels "NA") and leaves both histories untouched.
    ///
    /// # Errors
    /// Conditioning failures; estimator state is unchanged on error.
    pub fn process(&mut self, samples: &UnrolledSamples) -> Result<ResultSnapshot, SignalError> {
        let waveform = self
            .conditioner
            .condition(&samples.seq, &samples.red, &samples.ir)?;
        let extrema = self.detector.detect_array(&waveform.detection);
        self.batches += 1;

        let mut snapshot = ResultSnapshot {
            batch: self.batches,
            view: self.config.view,
            time_axis: waveform.time_axis.to_vec(),
            normalized_red: waveform.normalized_red.to_vec(),
            normalized_ir: waveform.normalized_ir.to_vec(),
            peaks: None,
            troughs: None,
            heart_rate_label: NOT_AVAILABLE.to_string(),
            spo2_label: NOT_AVAILABLE.to_string(),
            heart_rate_bpm: None,
            spo2_percent: None,
        };

        let Some(markers) = BeatMarkers::from_extrema(&extrema, self.config.edge_threshold())
        else {
            log::debug!(
                "batch {}: {} peaks / {} troughs, not enough beats",
                self.batches,
                extrema.maxima.len(),
                extrema.minima.len()
            );
            return Ok(snapshot);
        };

        if let Some(hr) = self.heart_rate.update(&markers.systole, &samples.seq) {
            snapshot.heart_rate_label = hr.label();
            snapshot.heart_rate_bpm = Some(hr.smoothed_bpm);
        }

        let spo2 = self.spo2.update(&markers, &samples.red, &samples.ir);
        snapshot.spo2_label = spo2.label();
        snapshot.spo2_percent = spo2.smoothed();

        log::debug!(
            "batch {}: {} beats, HR {} SpO2 {}",
            self.batches,
            markers.systole.len(),
            snapshot.heart_rate_label,
            snapshot.spo2_label
        );

        snapshot.peaks = Some(markers.systole);
        snapshot.troughs = Some(markers.diastole);
        Ok(snapshot)
    }
}

/// Ring buffer plus processor: the state that survives loop restarts.
#[derive(Debug, Clone)]
pub struct Pipeline {
    buffer: CircularSampleBuffer,
    processor: BatchProcessor,
    /// Published batch not yet released for display
    pending_display: Option<u64>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, AcquisitionError> {
        let buffer = CircularSampleBuffer::from_config(&config);
        let processor = BatchProcessor::new(config)?;
        Ok(Self {
            buffer,
            processor,
            // The placeholder counts as published
            pending_display: Some(0),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        self.processor.config()
    }

    pub fn buffer(&self) -> &CircularSampleBuffer {
        &self.buffer
    }

    pub fn processor(&self) -> &BatchProcessor {
        &self.processor
    }

    pub fn pending_display(&self) -> Option<u64> {
        self.pending_display
    }

    pub fn placeholder(&self) -> ResultSnapshot {
        ResultSnapshot::placeholder(self.config())
    }

    /// Decode raw transport bytes and ingest them.
    ///
    /// # Errors
    /// `MalformedPacket`; the buffer is untouched.
    pub fn ingest_packet(
        &mut self,
        bytes: &[u8],
        shared: &SharedResultState,
    ) -> Result<TickOutcome, AcquisitionError> {
        let packet = decode_packet(bytes)?;
        Ok(self.ingest(&packet, shared))
    }

    /// Store one packet and run whatever is due.
    ///
    /// Evaluation and display release alternate: a batch published on this
    /// tick is signaled on the next non-boundary tick, so the consumer never
    /// redraws in the same slot as the heavy processing.
    pub fn ingest(&mut self, packet: &Packet, shared: &SharedResultState) -> TickOutcome {
        if self.buffer.write(packet) {
            match self.processor.process(&self.buffer.unroll()) {
                Ok(snapshot) => {
                    let batch = snapshot.batch;
                    shared.publish(snapshot);
                    self.pending_display = Some(batch);
                    TickOutcome::Published { batch }
                }
                Err(err) => {
                    log::warn!("skipping batch at cursor {}: {}", self.buffer.cursor(), err);
                    TickOutcome::BatchSkipped(err)
                }
            }
        } else if let Some(batch) = self.pending_display.take() {
            shared.signal_display(batch);
            TickOutcome::DisplaySignaled { batch }
        } else {
            TickOutcome::Buffered
        }
    }
}
