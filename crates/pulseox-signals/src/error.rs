use std::fmt;
use thiserror::Error;

/// Optical channel a sample came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Red,
    Infrared,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Red => write!(f, "red"),
            Channel::Infrared => write!(f, "IR"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalError {
    /// Hysteresis threshold must be strictly positive.
    #[error("detector threshold must be positive, got {0}")]
    InvalidThreshold(f64),
    /// The batch carries no usable time span or amplitude.
    #[error("degenerate batch: {0}")]
    DegenerateBatch(&'static str),
    /// A zero intensity cannot be converted to absorbance.
    #[error("zero {channel} intensity at sample {index}")]
    ZeroIntensity { channel: Channel, index: usize },
    #[error("channel length mismatch: seq={seq}, red={red}, ir={ir}")]
    LengthMismatch { seq: usize, red: usize, ir: usize },
}
