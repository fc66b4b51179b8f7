//! Acquisition loop
//!
//! A dedicated worker thread polls the transport once per read period,
//! feeds the [`Pipeline`] and publishes through [`SharedResultState`].
//!
//! Timing is a poll on elapsed wall-clock time rather than a periodic timer:
//! a timer callback delayed by most of a period can be followed almost
//! immediately by the next one, which would read the same device data twice.
//!
//! Lifecycle: `Idle → Running → Idle`, with `Reconfiguring` while a view
//! change swaps the pipeline. The worker owns the transport and pipeline
//! while running and hands both back when joined.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::{AcquisitionConfig, PipelineConfig, ViewMode};
use crate::error::AcquisitionError;
use crate::pipeline::{Pipeline, TickOutcome};
use crate::shared_state::SharedResultState;
use crate::transport::PacketTransport;

// ============================================================================
// Cancellation
// ============================================================================

/// Cooperative stop flag shared with the worker.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Settings and metrics
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Reconfiguring,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionSettings {
    /// Upper bound handed to every transport read
    pub io_timeout: Duration,
    /// Sleep between elapsed-time checks
    pub poll_interval: Duration,
    /// Overrides the pipeline's packet period (replay and tests)
    pub read_period: Option<Duration>,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self::from_config(&AcquisitionConfig::default())
    }
}

impl AcquisitionSettings {
    pub fn from_config(cfg: &AcquisitionConfig) -> Self {
        Self {
            io_timeout: cfg.io_timeout(),
            poll_interval: cfg.poll_interval(),
            read_period: None,
        }
    }

    fn read_period_for(&self, pipeline: &PipelineConfig) -> Duration {
        self.read_period.unwrap_or_else(|| pipeline.read_period())
    }
}

/// Loop counters, updated by the worker.
#[derive(Debug, Default)]
pub struct LoopMetrics {
    /// Successful transport reads, malformed packets included
    pub packets_read: AtomicU64,
    pub transport_errors: AtomicU64,
    pub malformed_packets: AtomicU64,
    pub batches_published: AtomicU64,
    pub batches_skipped: AtomicU64,
    pub display_signals: AtomicU64,
}

impl LoopMetrics {
    pub fn snapshot(&self) -> LoopMetricsSnapshot {
        LoopMetricsSnapshot {
            packets_read: self.packets_read.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            malformed_packets: self.malformed_packets.load(Ordering::Relaxed),
            batches_published: self.batches_published.load(Ordering::Relaxed),
            batches_skipped: self.batches_skipped.load(Ordering::Relaxed),
            display_signals: self.display_signals.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: &TickOutcome) {
        let counter = match outcome {
            TickOutcome::Buffered => return,
            TickOutcome::Published { .. } => &self.batches_published,
            TickOutcome::DisplaySignaled { .. } => &self.display_signals,
            TickOutcome::BatchSkipped(_) => &self.batches_skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopMetricsSnapshot {
    pub packets_read: u64,
    pub transport_errors: u64,
    pub malformed_packets: u64,
    pub batches_published: u64,
    pub batches_skipped: u64,
    pub display_signals: u64,
}

// ============================================================================
// Loop
// ============================================================================

/// What the worker returns on exit.
struct WorkerOutput {
    transport: Box<dyn PacketTransport>,
    pipeline: Pipeline,
}

struct Worker {
    token: CancellationToken,
    handle: thread::JoinHandle<WorkerOutput>,
}

pub struct AcquisitionLoop {
    config: PipelineConfig,
    settings: AcquisitionSettings,
    shared: SharedResultState,
    metrics: Arc<LoopMetrics>,
    /// Present while idle; the worker owns it while running
    pipeline: Option<Pipeline>,
    worker: Option<Worker>,
    state: LoopState,
}

impl AcquisitionLoop {
    /// Build an idle loop and publish the placeholder snapshot.
    ///
    /// # Errors
    /// `Config` or `Signal` if the pipeline preset is invalid.
    pub fn new(
        config: PipelineConfig,
        settings: AcquisitionSettings,
    ) -> Result<Self, AcquisitionError> {
        let pipeline = Pipeline::new(config.clone())?;
        let shared = SharedResultState::new(pipeline.placeholder());

        Ok(Self {
            config,
            settings,
            shared,
            metrics: Arc::new(LoopMetrics::default()),
            pipeline: Some(pipeline),
            worker: None,
            state: LoopState::Idle,
        })
    }

    /// Handle for consumers. Stays valid across restarts and reconfiguration.
    pub fn shared(&self) -> SharedResultState {
        self.shared.clone()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn settings(&self) -> &AcquisitionSettings {
        &self.settings
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn metrics(&self) -> LoopMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Spawn the worker over `transport`.
    ///
    /// # Errors
    /// `AlreadyRunning` if a worker is active; the transport is dropped.
    pub fn start(&mut self, transport: Box<dyn PacketTransport>) -> Result<(), AcquisitionError> {
        if self.worker.is_some() {
            return Err(AcquisitionError::AlreadyRunning);
        }

        let pipeline = match self.pipeline.take() {
            Some(pipeline) => pipeline,
            // Lost with a panicked worker
            None => Pipeline::new(self.config.clone())?,
        };

        let token = CancellationToken::new();
        let ctx = WorkerContext {
            shared: self.shared.clone(),
            metrics: Arc::clone(&self.metrics),
            token: token.clone(),
            io_timeout: self.settings.io_timeout,
            poll_interval: self.settings.poll_interval,
            read_period: self.settings.read_period_for(&self.config),
        };

        log::info!(
            "starting acquisition on {} ({} view, read period {:?})",
            transport.name(),
            self.config.view,
            ctx.read_period
        );

        let handle = thread::spawn(move || ctx.run(transport, pipeline));
        self.worker = Some(Worker { token, handle });
        self.state = LoopState::Running;
        Ok(())
    }

    /// Cancel and join the worker.
    ///
    /// Returns the transport for a later restart, or `None` if the loop was
    /// not running or the worker panicked.
    pub fn stop(&mut self) -> Option<Box<dyn PacketTransport>> {
        match self.join_worker() {
            Ok(transport) => transport,
            Err(err) => {
                log::error!("{}", err);
                None
            }
        }
    }

    /// Switch view preset.
    ///
    /// Stops a running worker, rebuilds the pipeline (fresh buffer and
    /// histories), republishes the placeholder and restarts on the same
    /// transport.
    ///
    /// # Errors
    /// `WorkerPanicked` if the running worker had died. The new view is
    /// still applied; the loop stays idle until `start` is given a transport.
    pub fn reconfigure(&mut self, view: ViewMode) -> Result<(), AcquisitionError> {
        self.state = LoopState::Reconfiguring;

        let joined = self.join_worker();
        let rebuilt = self.rebuild(view);
        self.state = LoopState::Idle;
        rebuilt?;
        log::info!("reconfigured for {} view", view);

        match joined? {
            Some(transport) => self.start(transport),
            None => Ok(()),
        }
    }

    fn rebuild(&mut self, view: ViewMode) -> Result<(), AcquisitionError> {
        let config = PipelineConfig::for_view(view);
        let pipeline = Pipeline::new(config.clone())?;
        self.shared.publish(pipeline.placeholder());

        self.config = config;
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn join_worker(&mut self) -> Result<Option<Box<dyn PacketTransport>>, AcquisitionError> {
        let Some(worker) = self.worker.take() else {
            return Ok(None);
        };

        worker.token.cancel();
        let joined = worker.handle.join();
        self.state = LoopState::Idle;

        match joined {
            Ok(output) => {
                self.pipeline = Some(output.pipeline);
                log::info!("acquisition stopped after {} packets", self.metrics().packets_read);
                Ok(Some(output.transport))
            }
            Err(_) => Err(AcquisitionError::WorkerPanicked),
        }
    }
}

impl Drop for AcquisitionLoop {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.token.cancel();
            let _ = worker.handle.join();
        }
    }
}

struct WorkerContext {
    shared: SharedResultState,
    metrics: Arc<LoopMetrics>,
    token: CancellationToken,
    io_timeout: Duration,
    poll_interval: Duration,
    read_period: Duration,
}

impl WorkerContext {
    fn run(self, mut transport: Box<dyn PacketTransport>, mut pipeline: Pipeline) -> WorkerOutput {
        let mut last_read: Option<Instant> = None;

        while !self.token.is_cancelled() {
            let due = last_read.map_or(true, |t| t.elapsed() >= self.read_period);
            if !due {
                thread::sleep(self.poll_interval);
                continue;
            }

            // Period is measured from read start, so a slow read does not
            // push the schedule back
            last_read = Some(Instant::now());
            self.tick(transport.as_mut(), &mut pipeline);
        }

        WorkerOutput {
            transport,
            pipeline,
        }
    }

    fn tick(&self, transport: &mut dyn PacketTransport, pipeline: &mut Pipeline) {
        let bytes = match transport.read_packet(self.io_timeout) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.metrics.transport_errors.fetch_add(1, Ordering::Relaxed);
                log::warn!("{}", AcquisitionError::from(err));
                return;
            }
        };
        self.metrics.packets_read.fetch_add(1, Ordering::Relaxed);

        match pipeline.ingest_packet(&bytes, &self.shared) {
            Ok(outcome) => self.metrics.record(&outcome),
            Err(err) => {
                self.metrics.malformed_packets.fetch_add(1, Ordering::Relaxed);
                log::warn!("{}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ScriptedTransport;

    fn fast_settings() -> AcquisitionSettings {
        AcquisitionSettings {
            io_timeout: Duration::from_millis(10),
            poll_interval: Duration::from_micros(100),
            read_period: Some(Duration::from_micros(200)),
        }
    }

    #[test]
    fn test_token_is_shared() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_settings_from_config() {
        let settings = AcquisitionSettings::default();
        assert_eq!(settings.io_timeout, Duration::from_millis(800));
        assert_eq!(settings.poll_interval, Duration::from_micros(500));
        assert_eq!(
            settings.read_period_for(&PipelineConfig::default()),
            Duration::from_millis(30)
        );
    }

    #[test]
    fn test_new_loop_is_idle_with_placeholder() {
        let lp = AcquisitionLoop::new(PipelineConfig::default(), fast_settings()).unwrap();
        assert_eq!(lp.state(), LoopState::Idle);
        assert!(!lp.is_running());
        assert!(lp.shared().snapshot().is_placeholder());
    }

    #[test]
    fn test_double_start_rejected() {
        let mut lp = AcquisitionLoop::new(PipelineConfig::default(), fast_settings()).unwrap();
        lp.start(Box::new(ScriptedTransport::new())).unwrap();
        assert!(matches!(
            lp.start(Box::new(ScriptedTransport::new())),
            Err(AcquisitionError::AlreadyRunning)
        ));
        assert_eq!(lp.state(), LoopState::Running);
        assert!(lp.stop().is_some());
        assert_eq!(lp.state(), LoopState::Idle);
        assert!(lp.stop().is_none());
    }

    #[test]
    fn test_metrics_count_outcomes() {
        let m = LoopMetrics::default();
        m.record(&TickOutcome::Buffered);
        m.record(&TickOutcome::Published { batch: 1 });
        m.record(&TickOutcome::DisplaySignaled { batch: 1 });
        let snap = m.snapshot();
        assert_eq!(snap.packets_read, 0);
        assert_eq!(snap.batches_published, 1);
        assert_eq!(snap.display_signals, 1);
        assert_eq!(snap.batches_skipped, 0);
    }
}
