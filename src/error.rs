//! Error types for habitat construction, simulation, calibration and fitting.

use thiserror::Error;

/// Invalid habitat description. Always a configuration problem.
#[derive(Debug, Error)]
pub enum HabitatError {
    #[error("habitat range must be positive and finite, got ({0}, {1})")]
    InvalidRange(f64, f64),
    #[error("heatmap resolution must be positive and finite, got {0}")]
    InvalidResolution(f64),
    #[error("heatmap is empty")]
    EmptyHeatmap,
    #[error("heatmap value {value} at cell ({x}, {y}) is negative or not finite")]
    InvalidHeatmapValue { x: usize, y: usize, value: f64 },
    #[error("heatmap has no positive suitability")]
    FlatHeatmap,
    #[error("initial points must have shape [n, 2], got {0:?}")]
    PointShape(Vec<usize>),
    #[error("initial point {index} at ({x}, {y}) lies outside the habitat")]
    PointOutOfRange { index: usize, x: f64, y: f64 },
    #[error("niche size must lie in (0, 1], got {0}")]
    InvalidNicheSize(f64),
    #[error("failed to sample initial points: {0}")]
    Sampling(String),
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("velocity must be finite and non-negative, got {0}")]
    InvalidVelocity(f64),
    #[error("requested {requested} individuals but the habitat only holds {available} initial points")]
    NotEnoughPoints { requested: usize, available: usize },
    #[error("simulation needs at least one day and one step per day")]
    NoSteps,
    #[error("measurement cell side must be positive and finite, got {0}")]
    InvalidCellSide(f64),
    #[error("simulation cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("invalid calibration configuration: {0}")]
    Config(String),
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("task at grid index {index:?}, world {world} failed: {source}")]
    Worker {
        index: Vec<usize>,
        world: usize,
        #[source]
        source: anyhow::Error,
    },
    #[error("task at grid index {index:?}, world {world} returned {actual} values, expected {expected}")]
    ResultShape {
        index: Vec<usize>,
        world: usize,
        expected: usize,
        actual: usize,
    },
    #[error("result tensor construction failed: {0}")]
    Assembly(#[from] ndarray::ShapeError),
    #[error("calibration cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum FitError {
    #[error("invalid degeneracy policy: {0}")]
    InvalidPolicy(String),
    #[error("expected a result tensor with {expected} swept axes, got {actual}")]
    AxisCount { expected: usize, actual: usize },
    #[error("axis '{axis}' holds {value}, which its log transform cannot take")]
    InvalidCovariate { axis: String, value: f64 },
    #[error("{context}: {usable} usable samples, need at least {required}")]
    InsufficientData {
        context: String,
        usable: usize,
        required: usize,
    },
    #[error("{context}: design matrix has rank {rank}, need {required}")]
    Singular {
        context: String,
        rank: usize,
        required: usize,
    },
    #[error("least-squares solve failed: {0}")]
    Solve(&'static str),
}
