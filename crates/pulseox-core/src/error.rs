use std::time::Duration;

use pulseox_signals::SignalError;
use thiserror::Error;

use crate::config::ConfigError;

/// Failure reported by a packet source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("no packet within {0:?}")]
    Timeout(Duration),
    #[error("transport disconnected: {0}")]
    Disconnected(String),
}

#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("transport read timed out after {0:?}")]
    TransportTimeout(Duration),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("malformed packet: expected {expected} bytes, got {actual}")]
    MalformedPacket { expected: usize, actual: usize },
    #[error("signal processing error: {0}")]
    Signal(#[from] SignalError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("acquisition loop is already running")]
    AlreadyRunning,
    #[error("acquisition worker panicked")]
    WorkerPanicked,
}

impl From<TransportError> for AcquisitionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(after) => AcquisitionError::TransportTimeout(after),
            TransportError::Disconnected(reason) => AcquisitionError::Transport(reason),
        }
    }
}
