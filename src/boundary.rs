//! Fold-and-reflect mapping of proposed positions back into the habitat.
//!
//! A coordinate is folded modulo twice the extent; the upper half of the fold
//! is mirrored back. The result behaves like a billiard ball bouncing off the
//! edges, however far the proposal overshoots, and needs no loop over
//! successive reflections.

use movement_common::Vec2;

/// Maps one coordinate into `[0, extent)`.
#[inline(always)]
pub fn reflect(x: f64, extent: f64) -> f64 {
    let folded = x.rem_euclid(2.0 * extent);
    if folded < extent {
        folded
    } else {
        (-folded).rem_euclid(extent)
    }
}

/// Maps a proposed position into `[0, range.x) × [0, range.y)`, axis by axis.
#[inline(always)]
pub fn map_into(pos: Vec2, range: Vec2) -> Vec2 {
    Vec2::new(reflect(pos.x, range.x), reflect(pos.y, range.y))
}
