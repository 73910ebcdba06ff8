//! Population metrics extracted from recorded trajectories.

use crate::error::SimulationError;
use crate::grid::{cell_index, flat_index, grid_dims};
use crate::trajectory::Trajectory;
use movement_common::Vec2;

/// A statistic computed from a trajectory, either one value per individual
/// or a single population-wide value.
pub trait TrajectoryMetric {
    fn extract(&self, trajectory: &Trajectory) -> Vec<f64>;
}

/// Mean distance travelled per day by each individual.
///
/// Uses the recorded path, so displacements folded back by the habitat edge
/// count with their mapped length.
#[derive(Debug, Clone, Copy, Default)]
pub struct VelocityMetric;

impl TrajectoryMetric for VelocityMetric {
    fn extract(&self, trajectory: &Trajectory) -> Vec<f64> {
        let steps = trajectory.num_steps();
        if steps < 2 {
            return vec![0.0; trajectory.num_individuals()];
        }
        let days = (steps - 1) as f64 / trajectory.steps_per_day() as f64;
        (0..trajectory.num_individuals())
            .map(|i| {
                let path = trajectory.individual(i);
                let length: f64 = path
                    .outer_iter()
                    .zip(path.outer_iter().skip(1))
                    .map(|(a, b)| Vec2::new(a[0], a[1]).distance(Vec2::new(b[0], b[1])))
                    .sum();
                length / days
            })
            .collect()
    }
}

/// Area of the grid cells each individual visited, on a grid of side
/// `cell_side` laid over the habitat.
#[derive(Debug, Clone, Copy)]
pub struct HomeRangeMetric {
    cell_side: f64,
}

impl HomeRangeMetric {
    pub fn new(cell_side: f64) -> Result<Self, SimulationError> {
        Ok(HomeRangeMetric { cell_side: checked_cell_side(cell_side)? })
    }

    pub fn cell_side(&self) -> f64 {
        self.cell_side
    }
}

impl TrajectoryMetric for HomeRangeMetric {
    fn extract(&self, trajectory: &Trajectory) -> Vec<f64> {
        let dims = grid_dims(trajectory.range(), self.cell_side);
        let cell_area = self.cell_side * self.cell_side;
        // stamp[c] == i + 1 marks cell c as already counted for individual i
        let mut stamp = vec![0usize; dims.0 * dims.1];
        (0..trajectory.num_individuals())
            .map(|i| {
                let mut visited = 0usize;
                for point in trajectory.individual(i).outer_iter() {
                    let pos = Vec2::new(point[0], point[1]);
                    let cell = flat_index(cell_index(pos, self.cell_side, dims), dims);
                    if stamp[cell] != i + 1 {
                        stamp[cell] = i + 1;
                        visited += 1;
                    }
                }
                visited as f64 * cell_area
            })
            .collect()
    }
}

/// Fraction of the habitat's grid cells visited by at least one individual.
/// Yields a single value.
#[derive(Debug, Clone, Copy)]
pub struct OccupancyMetric {
    cell_side: f64,
}

impl OccupancyMetric {
    pub fn new(cell_side: f64) -> Result<Self, SimulationError> {
        Ok(OccupancyMetric { cell_side: checked_cell_side(cell_side)? })
    }

    pub fn cell_side(&self) -> f64 {
        self.cell_side
    }
}

impl TrajectoryMetric for OccupancyMetric {
    fn extract(&self, trajectory: &Trajectory) -> Vec<f64> {
        let dims = grid_dims(trajectory.range(), self.cell_side);
        let total = dims.0 * dims.1;
        let mut visited = vec![false; total];
        let mut count = 0usize;
        for point in trajectory.positions().rows() {
            let pos = Vec2::new(point[0], point[1]);
            let cell = flat_index(cell_index(pos, self.cell_side, dims), dims);
            if !visited[cell] {
                visited[cell] = true;
                count += 1;
            }
        }
        vec![count as f64 / total as f64]
    }
}

fn checked_cell_side(cell_side: f64) -> Result<f64, SimulationError> {
    if cell_side.is_finite() && cell_side > 0.0 {
        Ok(cell_side)
    } else {
        Err(SimulationError::InvalidCellSide(cell_side))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    // Two individuals, four steps, one step per day, in a 10x10 habitat.
    fn walkers() -> Trajectory {
        let paths = [
            [(0.5, 0.5), (1.5, 0.5), (1.5, 1.5), (1.5, 0.5)],
            [(5.5, 5.5), (5.5, 5.5), (5.5, 5.5), (5.5, 5.5)],
        ];
        let positions = Array3::from_shape_fn((2, 4, 2), |(i, s, c)| {
            let p = paths[i][s];
            if c == 0 { p.0 } else { p.1 }
        });
        Trajectory::new(positions, Vec2::new(10.0, 10.0), 1)
    }

    #[test]
    fn velocity_is_path_length_per_day() {
        let velocities = VelocityMetric.extract(&walkers());
        assert_eq!(velocities.len(), 2);
        assert!((velocities[0] - 1.0).abs() < 1e-12);
        assert_eq!(velocities[1], 0.0);
    }

    #[test]
    fn home_range_counts_distinct_cells() {
        let ranges = HomeRangeMetric::new(1.0).unwrap().extract(&walkers());
        assert_eq!(ranges, vec![3.0, 1.0]);
        let coarse = HomeRangeMetric::new(2.0).unwrap().extract(&walkers());
        assert_eq!(coarse, vec![4.0, 4.0]);
    }

    #[test]
    fn occupancy_is_a_single_fraction() {
        let occupancy = OccupancyMetric::new(1.0).unwrap().extract(&walkers());
        assert_eq!(occupancy.len(), 1);
        assert!((occupancy[0] - 4.0 / 100.0).abs() < 1e-12);
        let whole = OccupancyMetric::new(10.0).unwrap().extract(&walkers());
        assert_eq!(whole, vec![1.0]);
    }

    #[test]
    fn degenerate_cell_sides_are_rejected() {
        for side in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(HomeRangeMetric::new(side), Err(SimulationError::InvalidCellSide(_))));
            assert!(matches!(OccupancyMetric::new(side), Err(SimulationError::InvalidCellSide(_))));
        }
    }
}
