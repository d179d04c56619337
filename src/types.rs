use crate::protocol::WINDOW_WIDTH;

/// One value per pixel of an electrode window.
pub type PixelRow = [i16; WINDOW_WIDTH];

/// A decoded packet from the sensor array.
///
/// Built once by [`crate::parse::decode_packet`] and then shared read-only
/// (behind an `Arc`) by every per-electrode task spawned for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketContext {
    /// Frame counter from bytes 0–3 (big-endian).
    pub frame_id: u32,
    /// Segment of the frame carried by this packet (byte 4, 1-based).
    pub segment: u8,
    /// Sensor identifier (byte 5).
    pub sensor: u8,
    /// LED configuration word from bytes 6–7 (big-endian).
    pub led_config: u16,
    /// The verbatim packet bytes, header included.
    ///
    /// Snippet offsets index this buffer directly.
    pub raw: Vec<u8>,
}

/// The pixel window around one electrode, cut from one packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    /// Electrode index in the arena.
    pub electrode: usize,
    /// Frame id of the packet it came from.
    pub frame_id: u32,
    /// Raw samples, left edge first; the electrode center is at index `WIDTH`.
    pub samples: PixelRow,
}

/// The electrode chosen by the arbiter for one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionResult {
    /// Index of the winning electrode; also the byte sent to the actuator.
    pub electrode: usize,
    /// Frame id of the packet that triggered the detection.
    pub frame_id: u32,
    /// Offset-0 weight of the winning electrode.
    pub weight: i16,
    /// `true` when several electrodes crossed the threshold and narrowing
    /// (or the max-weight fallback) picked the winner.
    pub resolved_by_narrowing: bool,
}

/// Summary of one processed packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketOutcome {
    pub frame_id: u32,
    pub segment: u8,
    /// Electrodes whose window fell inside this packet, ascending.
    pub electrodes: Vec<usize>,
    /// Present when the arbiter selected an electrode.
    pub detection: Option<DetectionResult>,
}
