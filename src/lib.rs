//! # particle-detect
//!
//! Async Rust detector for transient particle impacts on a multi-electrode
//! sensor array that streams fixed-size packets over TCP.
//!
//! For every electrode the crate keeps a slowly adapting per-pixel baseline
//! (a hierarchical running average, the "remedian"), a short history of
//! background-subtracted snippets, and a scalar weight.  When several
//! electrodes cross the threshold in the same packet, the averaging window is
//! narrowed until one remains.  The winner's index is written as one byte to
//! an actuator.
//!
//! ## Quick start
//!
//! ```no_run
//! use particle_detect::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let link = SensorLink::bind(&config.listen).await?;
//!     let stream = link.accept().await?;
//!     let (packets, _reader) = spawn_reader(stream, config.queue);
//!
//!     let mut pipeline = PacketPipeline::new(
//!         &config.locations,
//!         Arbiter::new(config.threshold),
//!         LogActuator,
//!         Recorder::disabled(),
//!     )?;
//!     let stats = pipeline.run(packets).await;
//!     println!("{} detections", stats.detections);
//!     Ok(())
//! }
//! ```
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`prelude`] | One-line glob import of the commonly needed types |
//! | [`protocol`] | Packet geometry and detector constants |
//! | [`parse`] | Packet decoding and electrode window extraction |
//! | [`remedian`] | Per-pixel hierarchical baseline estimator |
//! | [`detection`] | Per-electrode snippet history and weight |
//! | [`arbiter`] | Threshold and narrowing tie-break across electrodes |
//! | [`pipeline`] | Per-packet concurrency, barrier, and signalling |
//! | [`link`] | TCP ingest and actuator output |
//! | [`recorder`] | CSV and raw capture sinks |
//! | [`config`] | Command line and validated configuration |
//! | [`types`] | Data types shared by the modules above |
//! | [`error`] | Error types |

pub mod arbiter;
pub mod config;
pub mod detection;
pub mod error;
pub mod link;
pub mod parse;
pub mod pipeline;
pub mod protocol;
pub mod recorder;
pub mod remedian;
pub mod types;

// ── Prelude ───────────────────────────────────────────────────────────────────

/// Convenience re-exports for downstream crates.
pub mod prelude {
    // ── Pipeline ──────────────────────────────────────────────────────────────
    pub use crate::arbiter::Arbiter;
    pub use crate::pipeline::{PacketPipeline, PipelineState, PipelineStats};

    // ── Links and sinks ───────────────────────────────────────────────────────
    pub use crate::link::{spawn_reader, Actuator, LogActuator, SensorLink, SerialActuator};
    pub use crate::recorder::{Recorder, RecorderConfig};

    // ── Configuration ─────────────────────────────────────────────────────────
    pub use crate::config::{Cli, Config};

    // ── Data types ────────────────────────────────────────────────────────────
    pub use crate::error::{ConfigError, PacketError, PipelineError};
    pub use crate::types::{DetectionResult, PacketContext, PacketOutcome, Snippet};

    // ── Protocol constants ────────────────────────────────────────────────────
    pub use crate::protocol::{PACKET_LENGTH, SNIPPET_DEPTH, THRESHOLD, WIDTH, WINDOW_WIDTH};
}
