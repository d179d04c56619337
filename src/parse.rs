//! Decoders for sensor packets and the electrode windows inside them.
//!
//! All functions here are pure: no I/O, no shared state.  They are called from
//! the pipeline before any per-electrode work is spawned.
//!
//! | Function | Purpose |
//! |---|---|
//! | [`decode_packet`] | validate length and split out the header fields |
//! | [`decode_samples`] | every sample pair of a packet, for the full-segment sink |
//! | [`segment_offset`] | byte offset of an electrode relative to one segment |
//! | [`extract_snippet`] | cut the `WINDOW_WIDTH` window around one electrode |
//! | [`validate_location`] | startup check that a window always stays in bounds |

use crate::error::{ConfigError, PacketError};
use crate::protocol::{twos, BYTES_PER_SAMPLE, PACKET_LENGTH, SEGMENT_BYTES, WIDTH, WINDOW_WIDTH};
use crate::types::{PacketContext, Snippet};

// ── Packet ───────────────────────────────────────────────────────────────────

/// Decode one wire packet into a [`PacketContext`].
///
/// | Bytes | Field | Encoding |
/// |---|---|---|
/// | 0–3 | frame id | u32 BE |
/// | 4 | segment | u8 |
/// | 5 | sensor | u8 |
/// | 6–7 | LED config | u16 BE |
///
/// Returns [`PacketError::Malformed`] unless `buffer` is exactly
/// [`PACKET_LENGTH`] bytes long.
pub fn decode_packet(buffer: &[u8]) -> Result<PacketContext, PacketError> {
    if buffer.len() != PACKET_LENGTH {
        return Err(PacketError::Malformed {
            expected: PACKET_LENGTH,
            actual: buffer.len(),
        });
    }
    Ok(PacketContext {
        frame_id: u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]),
        segment: buffer[4],
        sensor: buffer[5],
        led_config: u16::from_be_bytes([buffer[6], buffer[7]]),
        raw: buffer.to_vec(),
    })
}

/// Decode the whole packet buffer as consecutive sample pairs, low byte first.
///
/// The header is included; the full-segment dump keeps it so offsets in the
/// CSV line up with byte offsets in the packet.
pub fn decode_samples(context: &PacketContext) -> Vec<i16> {
    context
        .raw
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| twos(pair[1], pair[0]))
        .collect()
}

// ── Electrode windows ────────────────────────────────────────────────────────

/// Byte offset of `location` (in samples) relative to the start of `segment`.
///
/// Negative or `>= SEGMENT_BYTES` means the electrode is not in that segment.
pub fn segment_offset(location: usize, segment: u8) -> i64 {
    let absolute = (location * BYTES_PER_SAMPLE) as i64;
    absolute - (segment as i64 - 1) * SEGMENT_BYTES as i64
}

/// First and last (inclusive) byte read for a window centered at `offset`.
fn window_span(offset: i64) -> (i64, i64) {
    let reach = (WIDTH * BYTES_PER_SAMPLE) as i64;
    (offset - reach, offset + reach + 1)
}

/// Extract the window around electrode `electrode` at sample `location`.
///
/// Returns `Ok(None)` when the electrode lies outside the packet's segment.
/// When it is inside, sample `i` of the window is read from bytes
/// `offset - 2*WIDTH + 2*i` (low) and `+1` (high) of the packet buffer.
///
/// [`PacketError::WindowOutOfBounds`] means the location was never validated
/// with [`validate_location`].
pub fn extract_snippet(
    electrode: usize,
    location: usize,
    context: &PacketContext,
) -> Result<Option<Snippet>, PacketError> {
    let offset = segment_offset(location, context.segment);
    if !(0..SEGMENT_BYTES as i64).contains(&offset) {
        return Ok(None);
    }

    let (start, end) = window_span(offset);
    if start < 0 || end >= context.raw.len() as i64 {
        return Err(PacketError::WindowOutOfBounds {
            electrode,
            start,
            end,
        });
    }

    let start = start as usize;
    let mut samples = [0i16; WINDOW_WIDTH];
    for (i, sample) in samples.iter_mut().enumerate() {
        let byte = start + i * BYTES_PER_SAMPLE;
        *sample = twos(context.raw[byte + 1], context.raw[byte]);
    }

    Ok(Some(Snippet {
        electrode,
        frame_id: context.frame_id,
        samples,
    }))
}

/// Check that the window of an electrode at `location` fits in a packet.
///
/// An electrode is present in exactly one segment, at offset
/// `(2 * location) mod SEGMENT_BYTES`; the window around that offset must
/// start at or after byte 0 and end before [`PACKET_LENGTH`].
pub fn validate_location(electrode: usize, location: usize) -> Result<(), ConfigError> {
    let offset = (location * BYTES_PER_SAMPLE) % SEGMENT_BYTES;
    let (start, end) = window_span(offset as i64);
    if start < 0 || end >= PACKET_LENGTH as i64 {
        return Err(ConfigError::LocationOutOfBounds {
            electrode,
            location,
            offset,
            start,
            end,
            packet_length: PACKET_LENGTH,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DEFAULT_ELECTRODE_LOCATIONS;

    fn packet(frame: u32, segment: u8) -> Vec<u8> {
        let mut buf = vec![0u8; PACKET_LENGTH];
        buf[..4].copy_from_slice(&frame.to_be_bytes());
        buf[4] = segment;
        buf[5] = 7;
        buf[6..8].copy_from_slice(&0x0102u16.to_be_bytes());
        buf
    }

    #[test]
    fn decodes_header_fields() {
        let ctx = decode_packet(&packet(0xDEAD_BEEF, 2)).unwrap();
        assert_eq!(ctx.frame_id, 0xDEAD_BEEF);
        assert_eq!(ctx.segment, 2);
        assert_eq!(ctx.sensor, 7);
        assert_eq!(ctx.led_config, 0x0102);
        assert_eq!(ctx.raw.len(), PACKET_LENGTH);
    }

    #[test]
    fn rejects_wrong_length() {
        let short = vec![0u8; PACKET_LENGTH - 1];
        assert_eq!(
            decode_packet(&short),
            Err(PacketError::Malformed {
                expected: PACKET_LENGTH,
                actual: PACKET_LENGTH - 1
            })
        );
        assert!(decode_packet(&vec![0u8; PACKET_LENGTH + 1]).is_err());
    }

    #[test]
    fn samples_are_low_byte_first() {
        let mut buf = packet(1, 1);
        buf[8] = 0xFE;
        buf[9] = 0xFF;
        buf[10] = 0x34;
        buf[11] = 0x12;
        let samples = decode_samples(&decode_packet(&buf).unwrap());
        assert_eq!(samples.len(), PACKET_LENGTH / 2);
        assert_eq!(samples[4], -2);
        assert_eq!(samples[5], 0x1234);
    }

    #[test]
    fn extracts_window_centered_on_electrode() {
        // Location 500 → byte 1000 of segment 1.
        let mut buf = packet(3, 1);
        let start = 1000 - 2 * WIDTH;
        for i in 0..WINDOW_WIDTH {
            let value = (i as i16) - 15;
            let [hi, lo] = value.to_be_bytes();
            buf[start + 2 * i] = lo;
            buf[start + 2 * i + 1] = hi;
        }
        let ctx = decode_packet(&buf).unwrap();
        let snippet = extract_snippet(0, 500, &ctx).unwrap().unwrap();
        assert_eq!(snippet.frame_id, 3);
        assert_eq!(snippet.samples[0], -15);
        assert_eq!(snippet.samples[WIDTH], 0);
        assert_eq!(snippet.samples[WINDOW_WIDTH - 1], 15);
    }

    #[test]
    fn skips_electrode_outside_segment() {
        let ctx = decode_packet(&packet(1, 1)).unwrap();
        // 512 samples → byte 1024, one past the end of segment 1.
        assert_eq!(segment_offset(512, 1), 1024);
        assert_eq!(extract_snippet(0, 512, &ctx).unwrap(), None);
        // 750 samples belongs to segment 2.
        assert_eq!(extract_snippet(1, 750, &ctx).unwrap(), None);
        let ctx2 = decode_packet(&packet(1, 2)).unwrap();
        assert!(extract_snippet(1, 750, &ctx2).unwrap().is_some());
    }

    #[test]
    fn out_of_bounds_window_is_an_error() {
        let ctx = decode_packet(&packet(1, 1)).unwrap();
        // Location 5 → byte 10, the window would start before byte 0.
        assert!(matches!(
            extract_snippet(0, 5, &ctx),
            Err(PacketError::WindowOutOfBounds { electrode: 0, .. })
        ));
    }

    #[test]
    fn default_locations_are_valid() {
        for (i, &loc) in DEFAULT_ELECTRODE_LOCATIONS.iter().enumerate() {
            validate_location(i, loc).unwrap();
        }
    }

    #[test]
    fn rejects_locations_near_segment_edges() {
        assert!(validate_location(0, 0).is_err());
        assert!(validate_location(0, 14).is_err());
        assert!(validate_location(0, 15).is_ok());
        // Offset 1004: last byte read is 1035, the final byte of the packet.
        assert!(validate_location(0, 502).is_ok());
        assert!(validate_location(0, 503).is_err());
    }
}
