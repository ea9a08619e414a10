//! Error types for the JIT queue, the concentrator seam and configuration loading.

use crate::packet::DownlinkPacket;
use thiserror::Error;

/// Result codes of the JIT queue operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JitError {
    /// Malformed call: bad packet or out-of-range index.
    #[error("invalid request")]
    Invalid,

    /// No slot left for this packet.
    #[error("queue is full")]
    Full,

    /// Dequeue or peek on an empty queue.
    #[error("queue is empty")]
    Empty,

    /// Not enough lead time left to program the radio.
    #[error("too late to schedule packet")]
    TooLate,

    /// Timestamp implausibly far in the future.
    #[error("too early to schedule packet")]
    TooEarly,

    /// Overlaps a data downlink already in the queue.
    #[error("collides with a queued packet")]
    CollisionPacket,

    /// Overlaps a beacon already in the queue.
    #[error("collides with a queued beacon")]
    CollisionBeacon,
}

/// Rejected enqueue: carries the packet back so the caller can retry or drop it.
#[derive(Error, Debug)]
#[error("downlink rejected: {kind}")]
pub struct EnqueueError {
    pub kind: JitError,
    pub packet: DownlinkPacket,
}

impl EnqueueError {
    pub(crate) fn new(kind: JitError, packet: DownlinkPacket) -> Self {
        Self { kind, packet }
    }

    pub fn kind(&self) -> JitError {
        self.kind
    }

    /// Recover the rejected packet.
    pub fn into_packet(self) -> DownlinkPacket {
        self.packet
    }
}

/// Failures reported by a concentrator when asked to transmit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConcentratorError {
    /// The radio is already emitting.
    #[error("concentrator is busy emitting")]
    Busy,

    /// The HAL refused the frame.
    #[error("transmission rejected: {0}")]
    Rejected(String),
}

/// Configuration loading error.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Values parsed but inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
