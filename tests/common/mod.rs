#![allow(dead_code)]

use particle_detect::protocol::{PACKET_LENGTH, WIDTH, WINDOW_WIDTH};

/// Builds wire packets with flat windows around chosen electrode locations.
pub struct PacketBuilder {
    buf: Vec<u8>,
}

impl PacketBuilder {
    pub fn new(frame: u32, segment: u8) -> Self {
        let mut buf = vec![0u8; PACKET_LENGTH];
        buf[..4].copy_from_slice(&frame.to_be_bytes());
        buf[4] = segment;
        buf[5] = 1;
        Self { buf }
    }

    /// Fill the window of the electrode at `location` with `value`.
    ///
    /// `location` must fall inside this packet's segment.
    pub fn window(mut self, location: usize, value: i16) -> Self {
        let segment = self.buf[4] as usize;
        let offset = location * 2 - (segment - 1) * 1024;
        let start = offset - 2 * WIDTH;
        let [hi, lo] = value.to_be_bytes();
        for i in 0..WINDOW_WIDTH {
            self.buf[start + 2 * i] = lo;
            self.buf[start + 2 * i + 1] = hi;
        }
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

/// Electrode A (index 0) and B (index 1), both in segment 1.
pub const A: usize = 100;
pub const B: usize = 300;

/// A sustained signal on A and a one-packet burst on B in the last packet.
///
/// Both cross the threshold on the final packet, but only A survives
/// narrowing because B's energy sits in the newest frame alone.
pub fn sustained_vs_burst() -> Vec<Vec<u8>> {
    let count = 18;
    (0..count)
        .map(|frame| {
            let packet = PacketBuilder::new(frame, 1).window(A, 2000);
            if frame == count - 1 {
                packet.window(B, 31000).build()
            } else {
                packet.build()
            }
        })
        .collect()
}
