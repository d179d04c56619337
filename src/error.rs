//! Error taxonomy for the detection pipeline.
//!
//! Packet-level errors are recoverable: the offending packet is dropped and the
//! stream continues.  Configuration errors are fatal and surface at startup.

use std::io;

use thiserror::Error;

/// Errors raised while decoding a packet or cutting a snippet out of it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// The buffer does not have the fixed packet length.
    #[error("malformed packet: expected {expected} bytes, got {actual}")]
    Malformed { expected: usize, actual: usize },

    /// The window around an electrode reaches outside the packet buffer.
    ///
    /// `start` is the first byte index read and `end` the last (inclusive),
    /// both relative to the packet buffer.
    #[error("window for electrode {electrode} reads bytes {start}..={end} outside the packet")]
    WindowOutOfBounds {
        electrode: usize,
        start: i64,
        end: i64,
    },
}

/// Startup configuration problems.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one electrode location is required")]
    NoElectrodes,

    /// An electrode sits so close to a segment edge that its window would read
    /// outside the packet.
    #[error(
        "electrode {electrode} at sample {location} (segment offset {offset}) \
         needs bytes {start}..={end}, packet holds 0..{packet_length}"
    )]
    LocationOutOfBounds {
        electrode: usize,
        location: usize,
        offset: usize,
        start: i64,
        end: i64,
        packet_length: usize,
    },

    /// The arena indexes electrodes with a single actuator byte.
    #[error("{0} electrodes configured, at most 256 can be signalled")]
    TooManyElectrodes(usize),
}

/// Per-packet failures reported by [`crate::pipeline::PacketPipeline`].
///
/// None of these stop the stream; the binary logs them and moves on.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Packet(#[from] PacketError),

    /// A per-electrode task panicked or was aborted.
    #[error("electrode task failed: {0}")]
    TaskFailed(String),

    #[error("actuator write failed: {0}")]
    Actuator(#[source] io::Error),

    #[error("recorder write failed: {0}")]
    Recorder(#[from] RecorderError),
}

/// Failures writing one of the CSV or capture sinks.
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
