pub mod config;
pub mod model;
pub mod report;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{
    CalibrationConfig, DegeneracyPolicy, HarnessConfig, ModelConfig, OccupancySweepConfig,
    OutputConfig, VelocitySweepConfig, WorldConfig,
};
pub use model::{
    logit, sigmoid, DensityParams, FittedParameters, HomeRangeParams, ModelKind, ModelParameters,
    MovementModel, MovementParams, ParameterGroup, VelocityParams,
};
pub use report::{AxisRecord, CalibrationReport};
pub use vecmath::Vec2;
