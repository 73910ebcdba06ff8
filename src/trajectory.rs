//! Recorded positions of a simulated population.

use crate::error::SimulationError;
use movement_common::Vec2;
use ndarray::{Array3, ArrayView2, Axis};
use rand::seq::index;
use rand::Rng;

/// Positions of shape `[individuals, steps, 2]` plus the context the metric
/// extractors need to interpret them.
#[derive(Debug, Clone)]
pub struct Trajectory {
    positions: Array3<f64>,
    range: Vec2,
    steps_per_day: u32,
}

impl Trajectory {
    pub fn new(positions: Array3<f64>, range: Vec2, steps_per_day: u32) -> Self {
        debug_assert_eq!(positions.len_of(Axis(2)), 2);
        Trajectory { positions, range, steps_per_day }
    }

    pub fn positions(&self) -> &Array3<f64> {
        &self.positions
    }

    pub fn range(&self) -> Vec2 {
        self.range
    }

    pub fn steps_per_day(&self) -> u32 {
        self.steps_per_day
    }

    pub fn num_individuals(&self) -> usize {
        self.positions.len_of(Axis(0))
    }

    pub fn num_steps(&self) -> usize {
        self.positions.len_of(Axis(1))
    }

    /// Length of the recording in days.
    pub fn days(&self) -> f64 {
        self.num_steps() as f64 / self.steps_per_day as f64
    }

    /// Path of one individual, shape `[steps, 2]`.
    pub fn individual(&self, idx: usize) -> ArrayView2<'_, f64> {
        self.positions.index_axis(Axis(0), idx)
    }

    pub fn position(&self, individual: usize, step: usize) -> Vec2 {
        Vec2::new(
            self.positions[[individual, step, 0]],
            self.positions[[individual, step, 1]],
        )
    }

    /// Random sub-population of `num` distinct individuals, in ascending
    /// index order.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        num: usize,
        rng: &mut R,
    ) -> Result<Trajectory, SimulationError> {
        let available = self.num_individuals();
        if num > available {
            return Err(SimulationError::NotEnoughPoints { requested: num, available });
        }
        let mut chosen = index::sample(rng, available, num).into_vec();
        chosen.sort_unstable();
        Ok(Trajectory {
            positions: self.positions.select(Axis(0), &chosen),
            range: self.range,
            steps_per_day: self.steps_per_day,
        })
    }
}
