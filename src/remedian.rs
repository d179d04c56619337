//! Hierarchical running-average baseline ("remedian") per electrode pixel.
//!
//! Each pixel owns `LAYERS` shift registers of `DEPTH` slots.  Raw samples
//! enter layer 0; whenever a layer becomes full its average is pushed into the
//! next layer and the shallower layers restart, so layer `k` gains one slot
//! every `DEPTH^k` samples.  The baseline is the average of the deepest
//! register.
//!
//! A slot holding `0` counts as empty: "full" means no zero left in the
//! register.  There is no separate fill counter.
//!
//! # Numeric behaviour
//!
//! Registers hold `i16`.  Averages are summed in `i32`, divided by `DEPTH`
//! with truncation, and narrowed back to `i16` with wrapping.  Inputs large
//! enough to wrap are not detected; callers that expect extreme magnitudes
//! must scale them beforehand.
//!
//! Until the deepest register fills, its zero slots pull the baseline towards
//! zero: the first deepest slot lands after `DEPTH^2` samples and the register
//! is full after `DEPTH^3`.  That startup bias is expected and not corrected.

use crate::protocol::{DEPTH, LAYERS, WINDOW_WIDTH};
use crate::types::PixelRow;

/// One shift register of a remedian layer, newest value first.
pub type Register = [i16; DEPTH];

fn insert_at_start(register: &mut Register, value: i16) {
    register.copy_within(0..DEPTH - 1, 1);
    register[0] = value;
}

fn is_full(register: &Register) -> bool {
    register.iter().all(|&v| v != 0)
}

/// Truncating average over the whole register, zeros included.
pub fn register_average(register: &Register) -> i16 {
    let sum: i32 = register.iter().map(|&v| v as i32).sum();
    (sum / DEPTH as i32) as i16
}

/// Remedian state for a single pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelRemedian {
    layers: [Register; LAYERS],
}

impl Default for PixelRemedian {
    fn default() -> Self {
        Self::new()
    }
}

impl PixelRemedian {
    pub fn new() -> Self {
        Self {
            layers: [[0; DEPTH]; LAYERS],
        }
    }

    /// Register of layer `k` (0 = raw samples).
    ///
    /// # Panics
    /// Panics if `k >= LAYERS`.
    pub fn layer(&self, k: usize) -> &Register {
        &self.layers[k]
    }

    /// Current baseline: the average of the deepest register.
    pub fn baseline(&self) -> i16 {
        register_average(&self.layers[LAYERS - 1])
    }

    /// Feed one raw sample and return the updated baseline.
    ///
    /// A full layer pushes its average into the next one; the cascade stops
    /// at the first layer that is still not full after its push, or at the
    /// deepest layer.  Every layer shallower than the deepest one reached is
    /// then zeroed and starts accumulating again.
    pub fn push(&mut self, value: i16) -> i16 {
        insert_at_start(&mut self.layers[0], value);

        if is_full(&self.layers[0]) {
            let mut average = register_average(&self.layers[0]);
            let mut reached = 0;

            for k in 1..LAYERS {
                insert_at_start(&mut self.layers[k], average);
                reached = k;
                if k == LAYERS - 1 || !is_full(&self.layers[k]) {
                    break;
                }
                average = register_average(&self.layers[k]);
            }

            for layer in &mut self.layers[..reached] {
                *layer = [0; DEPTH];
            }
        }

        self.baseline()
    }
}

/// Baseline estimator for every pixel of one electrode window.
#[derive(Debug, Clone)]
pub struct BaselineEstimator {
    pixels: Box<[PixelRemedian; WINDOW_WIDTH]>,
    baseline: PixelRow,
}

impl Default for BaselineEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl BaselineEstimator {
    pub fn new() -> Self {
        Self {
            pixels: Box::new(std::array::from_fn(|_| PixelRemedian::new())),
            baseline: [0; WINDOW_WIDTH],
        }
    }

    /// Update the remedian of `pixel` with `raw` and return its new baseline.
    ///
    /// # Panics
    /// Panics if `pixel >= WINDOW_WIDTH`.
    pub fn update(&mut self, pixel: usize, raw: i16) -> i16 {
        let value = self.pixels[pixel].push(raw);
        self.baseline[pixel] = value;
        value
    }

    /// Update every pixel from one snippet and return the new baseline vector.
    pub fn update_snippet(&mut self, samples: &PixelRow) -> PixelRow {
        for (pixel, &raw) in samples.iter().enumerate() {
            self.update(pixel, raw);
        }
        self.baseline
    }

    /// Per-pixel baseline as of the last update.
    pub fn baseline(&self) -> &PixelRow {
        &self.baseline
    }

    /// Remedian state of one pixel.
    pub fn pixel(&self, pixel: usize) -> &PixelRemedian {
        &self.pixels[pixel]
    }
}
