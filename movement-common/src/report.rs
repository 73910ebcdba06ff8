use crate::model::FittedParameters;
use serde::{Deserialize, Serialize};

/// One swept parameter and the values it took.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisRecord {
    pub name: String,
    pub values: Vec<f64>,
}

/// Calibration results as handed to reporting code.
///
/// `data` is the result tensor flattened in row-major order. Its axes are the
/// swept parameters in `axes` order, then the world index, then the trial
/// index, so `shape == axes lengths ++ [num_worlds, trials_per_world]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationReport {
    /// Which calibration produced the data ("velocity", "home_range", "occupancy").
    pub calibration: String,
    /// Human readable movement model name.
    pub model: String,
    pub axes: Vec<AxisRecord>,
    pub num_worlds: usize,
    pub trials_per_world: usize,
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")] // Don't write "fitted": null
    pub fitted: Option<FittedParameters>,
}
