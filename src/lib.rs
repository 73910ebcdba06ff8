//! Stochastic movement simulation inside a bounded habitat and calibration of
//! the scaling laws that link movement to home range, velocity and occupancy.
//!
//! The hot path is the movement kernel ([`sampler`], [`boundary`],
//! [`simulation`]). The [`harness`] sweeps parameter grids over it in
//! parallel, and [`fit`] turns the resulting [`ResultTensor`] into model
//! coefficients.

pub mod analysis;
pub mod boundary;
pub mod calibrators;
pub mod cancel;
pub mod error;
pub mod fit;
pub mod grid;
pub mod habitat;
pub mod harness;
pub mod output;
pub mod population;
pub mod sampler;
pub mod sim_params;
pub mod simulation;
pub mod tensor;
pub mod trajectory;

pub use analysis::{HomeRangeMetric, OccupancyMetric, TrajectoryMetric, VelocityMetric};
pub use calibrators::{
    HomeRangeCalibration, OccupancyCalibration, VelocityCalibration, WorldGeometry,
};
pub use cancel::CancelToken;
pub use error::{CalibrationError, FitError, HabitatError, SimulationError};
pub use fit::{least_squares, LinearFit, ScalingLawFitter, Transform};
pub use habitat::Habitat;
pub use harness::{Axis, CalibrationHarness, CalibrationTask, GridTask, TaskContext};
pub use sampler::StepSampler;
pub use simulation::MovementSimulator;
pub use tensor::ResultTensor;
pub use trajectory::Trajectory;
