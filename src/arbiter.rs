//! Selects at most one electrode per packet from the electrode weights.
//!
//! | Candidates over threshold | Outcome | `resolved_by_narrowing` |
//! |---|---|---|
//! | 0 | no detection | - |
//! | 1 | that electrode | `false` |
//! | > 1 | narrow the window until one survives, else largest `\|weight\|` | `true` |

use log::debug;

use crate::protocol::{MAX_NARROWING_OFFSET, THRESHOLD};
use crate::types::DetectionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arbiter {
    /// Minimum `|weight|` for a candidate; equality counts.
    pub threshold: i16,
    /// Largest narrowing offset tried, inclusive.
    pub max_offset: usize,
}

impl Default for Arbiter {
    fn default() -> Self {
        Self {
            threshold: THRESHOLD,
            max_offset: MAX_NARROWING_OFFSET,
        }
    }
}

impl Arbiter {
    pub fn new(threshold: i16) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    fn passes(&self, weight: i16) -> bool {
        weight.unsigned_abs() >= self.threshold.unsigned_abs()
    }

    /// Pick the detecting electrode, if any.
    ///
    /// `weights[e]` is the offset-0 weight of electrode `e`.  `narrowed(e, o)`
    /// returns the weight of electrode `e` restricted by offset `o`; `None`
    /// (empty range) counts as below threshold.  It is only called for
    /// electrodes that are still candidates.
    pub fn arbitrate<F>(&self, frame_id: u32, weights: &[i16], narrowed: F) -> Option<DetectionResult>
    where
        F: Fn(usize, usize) -> Option<i16>,
    {
        let mut candidates: Vec<usize> = weights
            .iter()
            .enumerate()
            .filter(|(_, &w)| self.passes(w))
            .map(|(e, _)| e)
            .collect();

        let (electrode, resolved_by_narrowing) = match candidates.len() {
            0 => return None,
            1 => (candidates[0], false),
            _ => {
                let mut offset = 1;
                while candidates.len() > 1 && offset <= self.max_offset {
                    candidates.retain(|&e| narrowed(e, offset).is_some_and(|w| self.passes(w)));
                    debug!("frame {frame_id}: offset {offset} leaves candidates {candidates:?}");
                    offset += 1;
                }
                match candidates.as_slice() {
                    [single] => (*single, true),
                    _ => (strongest(weights)?, true),
                }
            }
        };

        Some(DetectionResult {
            electrode,
            frame_id,
            weight: weights[electrode],
            resolved_by_narrowing,
        })
    }
}

/// Index of the largest `|weight|`; the first index wins ties.
fn strongest(weights: &[i16]) -> Option<usize> {
    let mut best: Option<(usize, u16)> = None;
    for (e, w) in weights.iter().enumerate() {
        let magnitude = w.unsigned_abs();
        if best.map_or(true, |(_, m)| magnitude > m) {
            best = Some((e, magnitude));
        }
    }
    best.map(|(e, _)| e)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn never(_: usize, _: usize) -> Option<i16> {
        panic!("narrowing must not run")
    }

    #[test]
    fn nothing_over_threshold() {
        let arbiter = Arbiter::default();
        assert_eq!(arbiter.arbitrate(1, &[999, -999, 0, 12], never), None);
    }

    #[test]
    fn single_candidate_fast_path() {
        let arbiter = Arbiter::default();
        let result = arbiter.arbitrate(9, &[1500, 200, 300, 100], never).unwrap();
        assert_eq!(
            result,
            DetectionResult {
                electrode: 0,
                frame_id: 9,
                weight: 1500,
                resolved_by_narrowing: false,
            }
        );
    }

    #[test]
    fn threshold_is_inclusive_and_signless() {
        let arbiter = Arbiter::default();
        let result = arbiter.arbitrate(1, &[0, THRESHOLD], never).unwrap();
        assert_eq!(result.electrode, 1);
        let result = arbiter.arbitrate(1, &[0, 0, -THRESHOLD], never).unwrap();
        assert_eq!(result.electrode, 2);
        assert!(arbiter.arbitrate(1, &[THRESHOLD - 1], never).is_none());
    }

    #[test]
    fn narrowing_picks_the_survivor() {
        let arbiter = Arbiter::default();
        let narrowed = |e: usize, offset: usize| match (e, offset) {
            (1, _) => Some(1800),
            (3, 1) => Some(1100),
            (3, _) => Some(400),
            _ => panic!("electrode {e} is not a candidate"),
        };
        let result = arbiter.arbitrate(4, &[10, 1200, 20, 1900], narrowed).unwrap();
        assert_eq!(result.electrode, 1);
        assert_eq!(result.weight, 1200);
        assert!(result.resolved_by_narrowing);
    }

    #[test]
    fn narrowing_stops_once_one_remains() {
        let arbiter = Arbiter::default();
        let narrowed = |e: usize, offset: usize| {
            assert_eq!(offset, 1, "loop must stop after the first offset");
            Some(if e == 0 { 1000 } else { 0 })
        };
        let result = arbiter.arbitrate(1, &[1000, 1000, 1000], narrowed).unwrap();
        assert_eq!(result.electrode, 0);
        assert!(result.resolved_by_narrowing);
    }

    #[test]
    fn full_tie_falls_back_to_strongest() {
        let arbiter = Arbiter::default();
        let result = arbiter
            .arbitrate(2, &[1200, -1700, 1700, 50], |_, _| Some(5000))
            .unwrap();
        // |-1700| == |1700|; the lower index wins.
        assert_eq!(result.electrode, 1);
        assert_eq!(result.weight, -1700);
        assert!(result.resolved_by_narrowing);
    }

    #[test]
    fn all_dropped_falls_back_to_strongest() {
        let arbiter = Arbiter::default();
        let result = arbiter
            .arbitrate(2, &[1200, 1300, 1100], |_, _| None)
            .unwrap();
        assert_eq!(result.electrode, 1);
        assert!(result.resolved_by_narrowing);
    }

    #[test]
    fn strongest_prefers_first_index() {
        assert_eq!(strongest(&[3, -7, 7, 2]), Some(1));
        assert_eq!(strongest(&[]), None);
        assert_eq!(strongest(&[i16::MIN, i16::MAX]), Some(0));
    }
}
