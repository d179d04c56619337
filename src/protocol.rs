//! Packet geometry and detector constants for the electrode array link.
//!
//! Every packet on the wire has the same fixed length and layout:
//!
//! ```text
//! bytes 0..4   frame id        (u32, big-endian)
//! byte  4      segment id      (u8, 1-based)
//! byte  5      sensor id       (u8)
//! bytes 6..8   LED config      (u16, big-endian)
//! bytes 8..    sample pairs    (i16, low byte first)
//! ```
//!
//! A frame of the sensor is split over several segments; each segment carries
//! [`SEGMENT_BYTES`] bytes of sample payload.

// ── Wire format ──────────────────────────────────────────────────────────────

/// Length of every packet on the wire, in bytes.
pub const PACKET_LENGTH: usize = 1036;

/// Number of header bytes at the start of each packet.
pub const HEADER_LENGTH: usize = 8;

/// Bytes of sample payload covered by one segment.
///
/// Electrode locations are converted to byte offsets (two bytes per sample)
/// and normalized against this stride to find the segment that carries them.
pub const SEGMENT_BYTES: usize = 1024;

/// Bytes per raw sample.
pub const BYTES_PER_SAMPLE: usize = 2;

// ── Snippet geometry ─────────────────────────────────────────────────────────

/// Radius, in samples, of the window extracted around each electrode center.
pub const WIDTH: usize = 15;

/// Number of samples in one snippet (`2 * WIDTH + 1`).
pub const WINDOW_WIDTH: usize = WIDTH * 2 + 1;

/// Number of background-subtracted snippets retained per electrode.
pub const SNIPPET_DEPTH: usize = 30;

// ── Remedian geometry ────────────────────────────────────────────────────────

/// Length of each remedian shift register.
pub const DEPTH: usize = 10;

/// Number of remedian layers per pixel.
pub const LAYERS: usize = 3;

// ── Detection ────────────────────────────────────────────────────────────────

/// Minimum `|weight|` for an electrode to count as a detection candidate.
pub const THRESHOLD: i16 = 1000;

/// Largest window-narrowing offset tried by the arbiter (`WIDTH - 2`).
pub const MAX_NARROWING_OFFSET: usize = WIDTH - 2;

// ── Defaults ─────────────────────────────────────────────────────────────────

/// Electrode sample locations used when none are configured.
pub const DEFAULT_ELECTRODE_LOCATIONS: [usize; 4] = [500, 750, 1000, 1250];

/// TCP port the sensor connects to.
pub const DEFAULT_PORT: u16 = 12345;

/// Combine two bytes into a signed 16-bit sample (`(msb << 8) | lsb`).
///
/// ```
/// # use particle_detect::protocol::twos;
/// assert_eq!(twos(0xFF, 0xFE), -2);
/// assert_eq!(twos(0x01, 0x00), 256);
/// ```
pub fn twos(msb: u8, lsb: u8) -> i16 {
    i16::from_be_bytes([msb, lsb])
}
