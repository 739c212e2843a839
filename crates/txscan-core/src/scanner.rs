//! Range scanner — computes the next bounded, overlap-adjusted block window.
//!
//! Each run processes one window. The window is bounded by `chunk_size` so
//! RPC volume and wall-clock time stay within what a scheduled invocation
//! can afford, and its leading edge backs up by `overlap` blocks so that
//! recently seen blocks are re-examined in case a shallow reorg replaced
//! them.

use serde::{Deserialize, Serialize};

/// An inclusive block range `[from, to]` to scan in a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWindow {
    pub from: u64,
    pub to: u64,
}

impl ScanWindow {
    /// Number of blocks covered by the window.
    pub fn len(&self) -> u64 {
        self.to - self.from + 1
    }

    pub fn is_empty(&self) -> bool {
        false // from <= to is guaranteed by construction
    }
}

/// Compute the next window after a cursor at `last`, given the chain `head`.
///
/// `from = last − overlap + 1` (saturating, so the overlap only widens the
/// window once `last > overlap`), `to = min(from + chunk_size − 1, head)`.
///
/// Returns `None` when `last >= head`: there is nothing to scan, and the
/// caller persists `last_block_number = head` so the checkpoint still
/// reflects that no blocks were missed.
pub fn next_window(last: u64, head: u64, chunk_size: u64, overlap: u64) -> Option<ScanWindow> {
    if last >= head || chunk_size == 0 {
        return None;
    }
    let from = last.saturating_sub(overlap) + 1;
    let to = from.saturating_add(chunk_size - 1).min(head);
    Some(ScanWindow { from, to })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_fits_inside_chunk() {
        // head=1_000_000, last=999_000, chunk=4_000, no overlap:
        // the whole remaining range fits in one window.
        let w = next_window(999_000, 1_000_000, 4_000, 0).unwrap();
        assert_eq!(w.from, 999_001);
        assert_eq!(w.to, 1_000_000);
        assert_eq!(w.len(), 1_000);
    }

    #[test]
    fn fresh_cursor_starts_at_block_one() {
        // head=2_000_000, last=0, chunk=2_000: first window is [1..2000];
        // catching up takes ~1000 successive runs.
        let w = next_window(0, 2_000_000, 2_000, 10).unwrap();
        assert_eq!(w.from, 1);
        assert_eq!(w.to, 2_000);
    }

    #[test]
    fn overlap_rescans_trailing_blocks() {
        let w = next_window(10_000, 20_000, 500, 10).unwrap();
        assert_eq!(w.from, 9_991);
        assert_eq!(w.to, 10_490);
    }

    #[test]
    fn overlap_applies_only_past_the_overlap_depth() {
        // last <= overlap: saturating subtraction pins from at 1.
        let w = next_window(5, 1_000, 100, 10).unwrap();
        assert_eq!(w.from, 1);
    }

    #[test]
    fn caught_up_cursor_yields_no_window() {
        assert!(next_window(1_000, 1_000, 500, 10).is_none());
        assert!(next_window(1_001, 1_000, 500, 10).is_none());
    }

    #[test]
    fn window_clamped_to_head() {
        let w = next_window(95, 100, 1_000, 0).unwrap();
        assert_eq!(w.from, 96);
        assert_eq!(w.to, 100);
    }
}
