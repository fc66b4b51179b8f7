//! Packet sources
//!
//! The acquisition loop only sees [`PacketTransport`]: something that hands
//! over one raw packet per call, or fails within the given timeout.

use std::collections::VecDeque;
use std::time::Duration;

use crate::domain::{encode_packet, Packet};
use crate::error::TransportError;

pub trait PacketTransport: Send {
    /// Block for at most `timeout` and return one raw packet.
    fn read_packet(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Short human-readable name for logs.
    fn name(&self) -> &str {
        "transport"
    }
}

/// Replays a queue of canned read results.
///
/// Once the queue is empty every read times out immediately.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: VecDeque<Result<Vec<u8>, TransportError>>,
    reads: usize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_packets<I>(packets: I) -> Self
    where
        I: IntoIterator<Item = Packet>,
    {
        let mut transport = Self::new();
        for packet in packets {
            transport.push_packet(&packet);
        }
        transport
    }

    pub fn push_packet(&mut self, packet: &Packet) -> &mut Self {
        self.script.push_back(Ok(encode_packet(packet)));
        self
    }

    /// Queue raw bytes, malformed or not.
    pub fn push_bytes(&mut self, bytes: Vec<u8>) -> &mut Self {
        self.script.push_back(Ok(bytes));
        self
    }

    pub fn push_error(&mut self, err: TransportError) -> &mut Self {
        self.script.push_back(Err(err));
        self
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }

    /// Reads served so far, including errors and post-script timeouts.
    pub fn reads(&self) -> usize {
        self.reads
    }
}

impl PacketTransport for ScriptedTransport {
    fn read_packet(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.reads += 1;
        self.script
            .pop_front()
            .unwrap_or(Err(TransportError::Timeout(timeout)))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
