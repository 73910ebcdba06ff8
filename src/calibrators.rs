//! Concrete calibrations run through the harness.
//!
//! Each calibration knows its parameter axes, what a single (grid cell, world)
//! task simulates and measures, and which scaling law its results feed.

use crate::analysis::{HomeRangeMetric, OccupancyMetric, TrajectoryMetric, VelocityMetric};
use crate::error::{CalibrationError, FitError, SimulationError};
use crate::fit::ScalingLawFitter;
use crate::habitat::Habitat;
use crate::harness::{Axis, CalibrationTask, TaskContext};
use crate::simulation::MovementSimulator;
use crate::tensor::ResultTensor;
use anyhow::{ensure, Context};
use log::trace;
use movement_common::{FittedParameters, MovementModel};
use rand::rngs::StdRng;

/// Habitat geometry shared by every world of a calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldGeometry {
    pub range: (f64, f64),
    pub resolution: f64,
}

impl WorldGeometry {
    pub fn new(range: (f64, f64), resolution: f64) -> Self {
        WorldGeometry { range, resolution }
    }

    pub fn area(&self) -> f64 {
        self.range.0 * self.range.1
    }
}

/// Measured mean daily velocity against target velocity and niche size.
///
/// Axes: `(velocity, niche_size)`. Each task simulates one individual per
/// trial and returns the velocity of each.
#[derive(Debug, Clone)]
pub struct VelocityCalibration {
    model: MovementModel,
    simulator: MovementSimulator,
    world: WorldGeometry,
    days: u32,
}

impl VelocityCalibration {
    pub const NAME: &'static str = "velocity";

    pub fn new(model: MovementModel, world: WorldGeometry, days: u32) -> Self {
        let simulator = MovementSimulator::new(&model);
        VelocityCalibration { model, simulator, world, days }
    }

    pub fn axes(velocities: &[f64], niche_sizes: &[f64]) -> Result<Vec<Axis>, CalibrationError> {
        Ok(vec![
            Axis::new("velocity", velocities.to_vec())?,
            Axis::new("niche_size", niche_sizes.to_vec())?,
        ])
    }

    pub fn model(&self) -> &MovementModel {
        &self.model
    }

    pub fn fit(
        &self,
        tensor: &ResultTensor,
        fitter: &ScalingLawFitter,
    ) -> Result<FittedParameters, FitError> {
        fitter.fit_velocity(tensor)
    }
}

impl CalibrationTask for VelocityCalibration {
    fn run(&self, ctx: &TaskContext, rng: &mut StdRng) -> anyhow::Result<Vec<f64>> {
        let (velocity, niche_size) = (ctx.value(0), ctx.value(1));
        let habitat = Habitat::random(
            niche_size,
            self.world.range,
            self.world.resolution,
            ctx.trials(),
            rng,
        )?;
        let trajectory = self
            .simulator
            .simulate(&habitat, ctx.trials(), velocity, self.days, rng, ctx.cancel())?;
        Ok(VelocityMetric.extract(&trajectory))
    }
}

/// Measured home range against velocity and niche size.
///
/// Axes: `(velocity, niche_size)`. Home ranges are measured on a grid whose
/// cell side is the model's home range resolution for the velocity.
#[derive(Debug, Clone)]
pub struct HomeRangeCalibration {
    model: MovementModel,
    simulator: MovementSimulator,
    world: WorldGeometry,
    days: u32,
}

impl HomeRangeCalibration {
    pub const NAME: &'static str = "home_range";

    pub fn new(model: MovementModel, world: WorldGeometry, days: u32) -> Self {
        let simulator = MovementSimulator::new(&model);
        HomeRangeCalibration { model, simulator, world, days }
    }

    pub fn axes(velocities: &[f64], niche_sizes: &[f64]) -> Result<Vec<Axis>, CalibrationError> {
        VelocityCalibration::axes(velocities, niche_sizes)
    }

    pub fn model(&self) -> &MovementModel {
        &self.model
    }

    pub fn fit(
        &self,
        tensor: &ResultTensor,
        fitter: &ScalingLawFitter,
    ) -> Result<FittedParameters, FitError> {
        fitter.fit_home_range(tensor)
    }
}

impl CalibrationTask for HomeRangeCalibration {
    fn run(&self, ctx: &TaskContext, rng: &mut StdRng) -> anyhow::Result<Vec<f64>> {
        let (velocity, niche_size) = (ctx.value(0), ctx.value(1));
        let metric = HomeRangeMetric::new(self.model.home_range_resolution(velocity))?;

        let habitat = Habitat::random(
            niche_size,
            self.world.range,
            self.world.resolution,
            ctx.trials(),
            rng,
        )?;
        let trajectory = self
            .simulator
            .simulate(&habitat, ctx.trials(), velocity, self.days, rng, ctx.cancel())?;
        Ok(metric.extract(&trajectory))
    }
}

/// Occupancy against home range, niche size and population size.
///
/// Axes: `(home_range, niche_size, num)`. Each task simulates a pool of
/// individuals for the season once, then every trial measures the occupancy
/// of a random sub-population of `num` individuals.
#[derive(Debug, Clone)]
pub struct OccupancyCalibration {
    model: MovementModel,
    simulator: MovementSimulator,
    world: WorldGeometry,
    season: u32,
    max_individuals: usize,
}

impl OccupancyCalibration {
    pub const NAME: &'static str = "occupancy";

    pub fn new(
        model: MovementModel,
        world: WorldGeometry,
        season: u32,
        max_individuals: usize,
    ) -> Self {
        let simulator = MovementSimulator::new(&model);
        OccupancyCalibration {
            model,
            simulator,
            world,
            season,
            max_individuals,
        }
    }

    pub fn axes(
        home_ranges: &[f64],
        niche_sizes: &[f64],
        nums: &[usize],
    ) -> Result<Vec<Axis>, CalibrationError> {
        Ok(vec![
            Axis::new("home_range", home_ranges.to_vec())?,
            Axis::new("niche_size", niche_sizes.to_vec())?,
            Axis::new("num", nums.iter().map(|&n| n as f64).collect())?,
        ])
    }

    pub fn model(&self) -> &MovementModel {
        &self.model
    }

    pub fn fit(
        &self,
        tensor: &ResultTensor,
        fitter: &ScalingLawFitter,
    ) -> Result<FittedParameters, FitError> {
        fitter.fit_density(tensor, self.world.range)
    }
}

impl CalibrationTask for OccupancyCalibration {
    fn run(&self, ctx: &TaskContext, rng: &mut StdRng) -> anyhow::Result<Vec<f64>> {
        let (home_range, niche_size, num) = (ctx.value(0), ctx.value(1), ctx.value(2));
        ensure!(
            num >= 1.0 && num.fract() == 0.0,
            "population size must be a positive integer, got {}",
            num
        );
        let num = num as usize;
        let pool = self.max_individuals.max(num);
        let velocity = self
            .model
            .simulation_velocity(self.model.home_range_to_velocity(home_range), niche_size);
        let metric = OccupancyMetric::new(self.model.occupancy_resolution(home_range))
            .with_context(|| format!("measuring occupancy at home range {}", home_range))?;

        let habitat =
            Habitat::random(niche_size, self.world.range, self.world.resolution, pool, rng)?;
        let trajectory = self
            .simulator
            .simulate(&habitat, pool, velocity, self.season, rng, ctx.cancel())
            .with_context(|| {
                format!("simulating {} individuals at velocity {:.4}", pool, velocity)
            })?;
        trace!(
            "Occupancy task {}: pool of {}, velocity {:.4}, cell side {:.4}",
            ctx.task().ordinal,
            pool,
            velocity,
            metric.cell_side()
        );

        let mut occupancies = Vec::with_capacity(ctx.trials());
        for _ in 0..ctx.trials() {
            if ctx.cancel().is_cancelled() {
                return Err(SimulationError::Cancelled.into());
            }
            let sample = trajectory.sample(num, rng)?;
            occupancies.extend(metric.extract(&sample));
        }
        Ok(occupancies)
    }
}
