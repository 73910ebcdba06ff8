use crate::boundary::map_into;
use crate::cancel::CancelToken;
use crate::error::SimulationError;
use crate::grid::cell_index;
use crate::habitat::Habitat;
use crate::population::PopulationState;
use crate::sampler::StepSampler;
use crate::sim_params::SimParams;
use crate::trajectory::Trajectory;
use log::trace;
use movement_common::{MovementModel, Vec2};
use ndarray::{Array3, Axis};
use rand::Rng;

/// Runs the movement kernel of one model over a habitat.
///
/// The step sampler and the number of steps per day are fixed when the
/// simulator is built; everything else is passed per run so one simulator can
/// be shared read-only by every worker task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementSimulator {
    sampler: StepSampler,
    steps_per_day: u32,
}

impl MovementSimulator {
    pub fn new(model: &MovementModel) -> Self {
        MovementSimulator {
            sampler: StepSampler::from(model.kind()),
            steps_per_day: model.steps_per_day(),
        }
    }

    pub fn steps_per_day(&self) -> u32 {
        self.steps_per_day
    }

    /// Simulates the first `num` initial points of `habitat` for `days` days
    /// at a mean daily displacement of `velocity`.
    ///
    /// At every step the current positions are recorded first, then each
    /// individual draws a displacement from the suitability of the cell it
    /// stands in and is mapped back into the habitat. `cancel` is polled once
    /// per step.
    pub fn simulate<R: Rng + ?Sized>(
        &self,
        habitat: &Habitat,
        num: usize,
        velocity: f64,
        days: u32,
        rng: &mut R,
        cancel: &CancelToken,
    ) -> Result<Trajectory, SimulationError> {
        let params = SimParams::new(habitat, self.steps_per_day, velocity, days)?;
        let available = habitat.num_points();
        if num > available {
            return Err(SimulationError::NotEnoughPoints { requested: num, available });
        }

        let mut state = PopulationState::from_points(habitat.initial_points().view(), num);
        let mut positions = Array3::zeros((num, params.steps, 2));
        let heatmap = habitat.heatmap();

        for step in 0..params.steps {
            if cancel.is_cancelled() {
                trace!("Simulation cancelled at step {}/{}", step, params.steps);
                return Err(SimulationError::Cancelled);
            }

            // --- 1. Record ---
            state.write_into(positions.index_axis_mut(Axis(1), step));

            // --- 2. Move ---
            for (x, y) in state.positions_x.iter_mut().zip(state.positions_y.iter_mut()) {
                let current = Vec2::new(*x, *y);
                let field_value = heatmap[cell_index(current, params.resolution, params.grid_dims)];
                let step = self.sampler.displacement(field_value, params.step_velocity, rng);
                let proposed = current + step;
                let mapped = map_into(proposed, params.range);
                *x = mapped.x;
                *y = mapped.y;
            }
        }

        Ok(Trajectory::new(positions, params.range, self.steps_per_day))
    }
}
