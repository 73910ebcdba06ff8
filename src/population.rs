use ndarray::{ArrayView2, ArrayViewMut2};

/// Current positions of every simulated individual, stored as separate x and
/// y columns so the step loop walks two contiguous slices.
#[derive(Debug, Clone)]
pub struct PopulationState {
    pub positions_x: Vec<f64>,
    pub positions_y: Vec<f64>,
}

impl PopulationState {
    /// Takes the first `num` rows of an `[n, 2]` point array.
    /// The caller checks that enough rows exist.
    pub fn from_points(points: ArrayView2<f64>, num: usize) -> Self {
        let rows = points.rows().into_iter().take(num);
        let (positions_x, positions_y) = rows.map(|p| (p[0], p[1])).unzip();
        PopulationState { positions_x, positions_y }
    }

    /// Copies the current positions into one time slice `[individuals, 2]`
    /// of a trajectory buffer.
    #[inline]
    pub fn write_into(&self, mut slice: ArrayViewMut2<f64>) {
        for (idx, mut row) in slice.rows_mut().into_iter().enumerate() {
            row[0] = self.positions_x[idx];
            row[1] = self.positions_y[idx];
        }
    }
}
