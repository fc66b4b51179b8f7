//! Device samples and the transport packet format.
//!
//! The sensor board streams packets of five datasets. Each dataset is three
//! little-endian `u32` words: red intensity, IR intensity, sample number.

use serde::{Deserialize, Serialize};

use crate::error::AcquisitionError;

/// Seconds between consecutive device samples.
pub const SAMPLE_PERIOD_S: f64 = 0.006;

/// Datasets carried by one transport packet.
pub const DATASETS_PER_PACKET: usize = 5;

/// Bytes in one dataset (red, IR, seq).
pub const DATASET_LEN: usize = 12;

/// Bytes in one transport packet.
pub const PACKET_LEN: usize = DATASETS_PER_PACKET * DATASET_LEN;

/// One two-channel reading from the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub red: u32,
    pub ir: u32,
    /// Device counter; wraps at 32 bits, only meaningful as a difference
    pub seq: u32,
}

impl Sample {
    pub fn new(red: u32, ir: u32, seq: u32) -> Self {
        Self { red, ir, seq }
    }
}

pub type Packet = [Sample; DATASETS_PER_PACKET];

/// Parse one transport packet.
///
/// # Errors
/// `MalformedPacket` unless `bytes` is exactly [`PACKET_LEN`] long.
pub fn decode_packet(bytes: &[u8]) -> Result<Packet, AcquisitionError> {
    if bytes.len() != PACKET_LEN {
        return Err(AcquisitionError::MalformedPacket {
            expected: PACKET_LEN,
            actual: bytes.len(),
        });
    }

    let mut packet = [Sample::new(0, 0, 0); DATASETS_PER_PACKET];
    for (sample, chunk) in packet.iter_mut().zip(bytes.chunks_exact(DATASET_LEN)) {
        *sample = Sample {
            red: read_u32_le(&chunk[0..4]),
            ir: read_u32_le(&chunk[4..8]),
            seq: read_u32_le(&chunk[8..12]),
        };
    }
    Ok(packet)
}

/// Serialize samples in the device wire format.
pub fn encode_packet(packet: &Packet) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(PACKET_LEN);
    for sample in packet {
        bytes.extend_from_slice(&sample.red.to_le_bytes());
        bytes.extend_from_slice(&sample.ir.to_le_bytes());
        bytes.extend_from_slice(&sample.seq.to_le_bytes());
    }
    bytes
}

fn read_u32_le(word: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(word);
    u32::from_le_bytes(buf)
}
