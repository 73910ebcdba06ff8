use crate::error::SimulationError;
use crate::habitat::Habitat;
use movement_common::Vec2;

/// Per-run constants derived once before the step loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimParams {
    // World & grid
    pub range: Vec2,
    pub resolution: f64,
    pub grid_dims: (usize, usize),

    // Time
    pub steps_per_day: u32,
    pub days: u32,
    pub steps: usize,

    /// Mean displacement per step (daily velocity / steps per day).
    pub step_velocity: f64,
}

impl SimParams {
    pub fn new(
        habitat: &Habitat,
        steps_per_day: u32,
        velocity: f64,
        days: u32,
    ) -> Result<Self, SimulationError> {
        if !(velocity.is_finite() && velocity >= 0.0) {
            return Err(SimulationError::InvalidVelocity(velocity));
        }
        if days == 0 || steps_per_day == 0 {
            return Err(SimulationError::NoSteps);
        }
        Ok(SimParams {
            range: habitat.range(),
            resolution: habitat.resolution(),
            grid_dims: habitat.heatmap_dims(),
            steps_per_day,
            days,
            steps: days as usize * steps_per_day as usize,
            step_velocity: velocity / steps_per_day as f64,
        })
    }
}
