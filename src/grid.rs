use movement_common::Vec2;

/// Number of cells of side `cell_side` needed to cover `range` on each axis.
#[inline]
pub fn grid_dims(range: Vec2, cell_side: f64) -> (usize, usize) {
    let nx = (range.x / cell_side).ceil() as usize;
    let ny = (range.y / cell_side).ceil() as usize;
    (nx.max(1), ny.max(1))
}

// Calculates the (x, y) grid cell containing a position.
// Truncates after floor division and clamps to the grid, so positions on or
// past the far edge land in the last cell.
#[inline(always)]
pub fn cell_index(pos: Vec2, cell_side: f64, dims: (usize, usize)) -> (usize, usize) {
    // `as` saturates: negative and NaN coordinates become 0
    let gx = (pos.x / cell_side).floor() as usize;
    let gy = (pos.y / cell_side).floor() as usize;
    (gx.min(dims.0 - 1), gy.min(dims.1 - 1))
}

/// Row-major flat index of a cell.
#[inline(always)]
pub fn flat_index(cell: (usize, usize), dims: (usize, usize)) -> usize {
    cell.0 * dims.1 + cell.1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dims_cover_partial_cells() {
        assert_eq!(grid_dims(Vec2::new(20.0, 20.0), 0.4), (50, 50));
        assert_eq!(grid_dims(Vec2::new(20.0, 10.0), 3.0), (7, 4));
        assert_eq!(grid_dims(Vec2::new(1.0, 1.0), 5.0), (1, 1));
    }

    #[test]
    fn index_truncates_and_clamps() {
        let dims = (5, 5);
        assert_eq!(cell_index(Vec2::new(0.0, 0.0), 2.0, dims), (0, 0));
        assert_eq!(cell_index(Vec2::new(3.99, 4.0), 2.0, dims), (1, 2));
        assert_eq!(cell_index(Vec2::new(10.0, 55.0), 2.0, dims), (4, 4));
        assert_eq!(cell_index(Vec2::new(-0.5, f64::NAN), 2.0, dims), (0, 0));
    }

    #[test]
    fn flat_index_is_row_major() {
        assert_eq!(flat_index((0, 0), (3, 4)), 0);
        assert_eq!(flat_index((1, 0), (3, 4)), 4);
        assert_eq!(flat_index((2, 3), (3, 4)), 11);
    }
}
