//! F1 25 UDP telemetry: wire format, decoding and the socket listener

mod decode;
mod encode;
mod listener;
pub mod packet;
mod simulator;
mod wire;

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use thiserror::Error;

pub use decode::{decode, decode_header};
pub use encode::encode;
pub use listener::{ListenerConfig, TelemetryListener, ingest};
pub use simulator::{SessionSimulator, SimulatorConfig, run_simulation};
pub use packet::{
    EventDetail, PacketHeader, PacketKind, Payload, SUPPORTED_FORMAT, TelemetryPacket, Wheel,
};

/// Reasons a datagram cannot be decoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Datagram length does not match the pinned layout; `kind` is `None`
    /// when even the header is incomplete
    #[error("malformed {kind:?} packet: expected {expected} bytes, got {actual}")]
    Malformed {
        kind: Option<PacketKind>,
        expected: usize,
        actual: usize,
    },

    /// Read past the end of the buffer
    #[error("truncated read of {needed} bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },
}

/// Listener counters, shared with whoever wants to report them
#[derive(Debug, Default)]
pub struct TelemetryStats {
    received: AtomicU64,
    decoded: AtomicU64,
    dropped_malformed: AtomicU64,
    opaque: AtomicU64,
    frame_regressions: AtomicU64,
}

/// Point-in-time copy of `TelemetryStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub decoded: u64,
    pub dropped_malformed: u64,
    pub opaque: u64,
    pub frame_regressions: u64,
}

impl TelemetryStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decoded(&self) {
        self.decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.dropped_malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_opaque(&self) {
        self.opaque.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_regression(&self) {
        self.frame_regressions.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            decoded: self.decoded.load(Ordering::Relaxed),
            dropped_malformed: self.dropped_malformed.load(Ordering::Relaxed),
            opaque: self.opaque.load(Ordering::Relaxed),
            frame_regressions: self.frame_regressions.load(Ordering::Relaxed),
        }
    }
}
