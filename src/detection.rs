//! Per-electrode history of background-subtracted snippets and its weight.

use crate::protocol::{SNIPPET_DEPTH, WINDOW_WIDTH};
use crate::types::PixelRow;

/// The last `SNIPPET_DEPTH` background-subtracted snippets of one electrode,
/// newest first.
///
/// The window always holds exactly `SNIPPET_DEPTH` frames; before enough
/// snippets have arrived the oldest frames are all zeros.
#[derive(Debug, Clone)]
pub struct DetectionWindow {
    frames: Box<[PixelRow; SNIPPET_DEPTH]>,
    weight: i16,
}

impl Default for DetectionWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionWindow {
    pub fn new() -> Self {
        Self {
            frames: Box::new([[0; WINDOW_WIDTH]; SNIPPET_DEPTH]),
            weight: 0,
        }
    }

    /// Subtract `baseline` from `samples`, push the result as the newest frame
    /// and return the full-window weight.
    ///
    /// The weight is also kept as [`DetectionWindow::weight`].
    pub fn ingest(&mut self, samples: &PixelRow, baseline: &PixelRow) -> i16 {
        let mut subtracted = [0i16; WINDOW_WIDTH];
        for ((out, &raw), &base) in subtracted.iter_mut().zip(samples).zip(baseline) {
            *out = (raw as i32 - base as i32).abs() as i16;
        }

        self.frames.copy_within(0..SNIPPET_DEPTH - 1, 1);
        self.frames[0] = subtracted;

        // Offset 0 never yields an empty range.
        self.weight = self.weight_at(0).unwrap_or_default();
        self.weight
    }

    /// Two-stage average over frames `offset..SNIPPET_DEPTH - offset`.
    ///
    /// Each frame is averaged over all `WINDOW_WIDTH` pixels, then the frame
    /// averages are averaged over the frames in range.  Both divisions
    /// truncate.  Returns `None` when `offset >= SNIPPET_DEPTH / 2`, which
    /// leaves no frame to average.
    pub fn weight_at(&self, offset: usize) -> Option<i16> {
        if offset >= SNIPPET_DEPTH / 2 {
            return None;
        }
        let rows = &self.frames[offset..SNIPPET_DEPTH - offset];
        let total: i32 = rows
            .iter()
            .map(|row| row.iter().map(|&v| v as i32).sum::<i32>() / WINDOW_WIDTH as i32)
            .sum();
        Some((total / rows.len() as i32) as i16)
    }

    /// Weight computed by the most recent [`DetectionWindow::ingest`].
    pub fn weight(&self) -> i16 {
        self.weight
    }

    /// All retained frames, newest first.
    pub fn frames(&self) -> &[PixelRow; SNIPPET_DEPTH] {
        &self.frames
    }

    /// Number of retained frames (always `SNIPPET_DEPTH`).
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
