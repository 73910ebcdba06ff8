use crate::model::{ModelKind, ModelParameters, MovementModel};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

// Habitat geometry shared by every simulated world
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct WorldConfig {
    /// Habitat extent (width, height) in km.
    pub range: [f64; 2],
    /// Side of a suitability grid cell in km.
    #[serde(default = "default_resolution")]
    pub resolution: f64,
}

fn default_resolution() -> f64 {
    0.4
}

// Which movement model to calibrate, optionally with starting coefficients
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ModelConfig {
    pub kind: ModelKind,
    #[serde(default)]
    pub parameters: Option<ModelParameters>,
}

// Worker pool and repetition settings
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct HarnessConfig {
    pub num_worlds: usize,
    pub trials_per_world: usize,
    /// Worker threads; defaults to the available hardware parallelism.
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    42
}

// Sweep of target velocities against niche sizes (velocity and home range calibrations)
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct VelocitySweepConfig {
    pub velocities: Vec<f64>,
    pub niche_sizes: Vec<f64>,
    pub days: u32,
}

// Sweep of home ranges, niche sizes and population sizes (occupancy calibration)
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OccupancySweepConfig {
    pub home_ranges: Vec<f64>,
    pub niche_sizes: Vec<f64>,
    pub nums: Vec<usize>,
    /// Size of the simulated pool that each trial sub-samples from.
    pub max_individuals: usize,
    /// Season length in days.
    pub season: u32,
    #[serde(default)]
    pub degeneracy: DegeneracyPolicy,
}

/// What the fitter does with samples whose link transform diverges,
/// such as an occupancy of exactly 0 or 1 under `logit`.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum DegeneracyPolicy {
    /// Drop the sample from the regression.
    Exclude,
    /// Pull the sample into `[epsilon, 1 - epsilon]` before the transform.
    Clamp { epsilon: f64 },
}

impl DegeneracyPolicy {
    /// Clamping needs `0 < epsilon < 0.5`, otherwise `[epsilon, 1 - epsilon]` is empty.
    pub fn validate(&self) -> Result<()> {
        if let DegeneracyPolicy::Clamp { epsilon } = *self {
            if !(epsilon > 0.0 && epsilon < 0.5) {
                anyhow::bail!("degeneracy epsilon must lie in (0, 0.5), got {}.", epsilon);
            }
        }
        Ok(())
    }
}

impl Default for DegeneracyPolicy {
    fn default() -> Self {
        DegeneracyPolicy::Clamp { epsilon: 1e-3 }
    }
}

// Configuration for output settings
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    pub format: Option<String>, // Output format: "json", "bincode", "messagepack"
    #[serde(default = "default_save_summary")]
    pub save_summary: bool,
}

fn default_save_summary() -> bool {
    true
}

// Main calibration configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CalibrationConfig {
    pub world: WorldConfig,
    pub model: ModelConfig,
    pub harness: HarnessConfig,
    #[serde(default)]
    pub velocity: Option<VelocitySweepConfig>,
    #[serde(default)]
    pub home_range: Option<VelocitySweepConfig>,
    #[serde(default)]
    pub occupancy: Option<OccupancySweepConfig>,
    pub output: OutputConfig,
}

impl CalibrationConfig {
    /// Loads the calibration configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref).map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e)
        })?;
        let config = Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))?;
        Ok(config)
    }

    /// Parses and validates a configuration held in memory.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: CalibrationConfig = toml::from_str(config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects inconsistent settings before any simulation work starts.
    pub fn validate(&self) -> Result<()> {
        let [width, height] = self.world.range;
        if !(width.is_finite() && width > 0.0 && height.is_finite() && height > 0.0) {
            anyhow::bail!("world.range must be positive, got [{}, {}].", width, height);
        }
        if !(self.world.resolution.is_finite() && self.world.resolution > 0.0) {
            anyhow::bail!("world.resolution must be positive.");
        }
        if self.harness.num_worlds == 0 {
            anyhow::bail!("harness.num_worlds must be greater than 0.");
        }
        if self.harness.trials_per_world == 0 {
            anyhow::bail!("harness.trials_per_world must be greater than 0.");
        }
        if self.harness.threads == Some(0) {
            anyhow::bail!("harness.threads must be greater than 0 when set.");
        }
        if let Some(parameters) = &self.model.parameters {
            parameters.validate()?;
        }
        if let Some(sweep) = &self.velocity {
            validate_velocity_sweep("velocity", sweep)?;
        }
        if let Some(sweep) = &self.home_range {
            validate_velocity_sweep("home_range", sweep)?;
        }
        if let Some(sweep) = &self.occupancy {
            validate_positive_axis("occupancy.home_ranges", &sweep.home_ranges)?;
            validate_niche_sizes("occupancy.niche_sizes", &sweep.niche_sizes)?;
            if sweep.nums.is_empty() || sweep.nums.contains(&0) {
                anyhow::bail!("occupancy.nums must be a non-empty list of positive counts.");
            }
            if sweep.season == 0 {
                anyhow::bail!("occupancy.season must be greater than 0.");
            }
            sweep.degeneracy.validate().context("invalid occupancy.degeneracy")?;
        }
        Ok(())
    }

    /// Builds the movement model described by the `[model]` section.
    pub fn movement_model(&self) -> Result<MovementModel> {
        match self.model.parameters {
            Some(parameters) => MovementModel::with_parameters(self.model.kind, parameters),
            None => Ok(MovementModel::new(self.model.kind)),
        }
    }

    pub fn range(&self) -> (f64, f64) {
        (self.world.range[0], self.world.range[1])
    }
}

fn validate_velocity_sweep(section: &str, sweep: &VelocitySweepConfig) -> Result<()> {
    validate_positive_axis(&format!("{}.velocities", section), &sweep.velocities)?;
    validate_niche_sizes(&format!("{}.niche_sizes", section), &sweep.niche_sizes)?;
    if sweep.days == 0 {
        anyhow::bail!("{}.days must be greater than 0.", section);
    }
    Ok(())
}

fn validate_positive_axis(name: &str, values: &[f64]) -> Result<()> {
    if values.is_empty() {
        anyhow::bail!("{} must not be empty.", name);
    }
    if let Some(bad) = values.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
        anyhow::bail!("{} must hold positive values, found {}.", name, bad);
    }
    Ok(())
}

fn validate_niche_sizes(name: &str, values: &[f64]) -> Result<()> {
    if values.is_empty() {
        anyhow::bail!("{} must not be empty.", name);
    }
    if let Some(bad) = values.iter().find(|v| !(**v > 0.0 && **v <= 1.0)) {
        anyhow::bail!("{} must lie in (0, 1], found {}.", name, bad);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
        [world]
        range = [20.0, 20.0]

        [model]
        kind = "constant-brownian"

        [harness]
        num_worlds = 2
        trials_per_world = 5

        [velocity]
        velocities = [0.5, 1.0]
        niche_sizes = [0.3, 0.6]
        days = 30

        [output]
        base_filename = "calibration"
    "#;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config = CalibrationConfig::from_toml_str(BASE).unwrap();
        assert_eq!(config.world.resolution, 0.4);
        assert_eq!(config.harness.seed, 42);
        assert_eq!(config.harness.threads, None);
        assert!(config.output.save_summary);
        assert!(config.occupancy.is_none());
        let model = config.movement_model().unwrap();
        assert_eq!(model.kind(), ModelKind::ConstantBrownian);
    }

    #[test]
    fn rejects_empty_axis() {
        let broken = BASE.replace("velocities = [0.5, 1.0]", "velocities = []");
        assert!(CalibrationConfig::from_toml_str(&broken).is_err());
    }

    #[test]
    fn rejects_non_positive_range() {
        let broken = BASE.replace("range = [20.0, 20.0]", "range = [20.0, 0.0]");
        assert!(CalibrationConfig::from_toml_str(&broken).is_err());
    }

    #[test]
    fn rejects_zero_trials() {
        let broken = BASE.replace("trials_per_world = 5", "trials_per_world = 0");
        assert!(CalibrationConfig::from_toml_str(&broken).is_err());
    }

    #[test]
    fn parses_degeneracy_policy() {
        let with_occupancy = format!(
            "{}\n{}",
            BASE,
            r#"
            [occupancy]
            home_ranges = [0.5, 1.0]
            niche_sizes = [0.4]
            nums = [10, 100]
            max_individuals = 200
            season = 90
            degeneracy = { policy = "exclude" }
            "#
        );
        let config = CalibrationConfig::from_toml_str(&with_occupancy).unwrap();
        let occupancy = config.occupancy.unwrap();
        assert_eq!(occupancy.degeneracy, DegeneracyPolicy::Exclude);
        assert_eq!(occupancy.nums, vec![10, 100]);
    }

    #[test]
    fn clamp_epsilon_must_leave_a_range() {
        assert!(DegeneracyPolicy::Clamp { epsilon: 1e-3 }.validate().is_ok());
        assert!(DegeneracyPolicy::Exclude.validate().is_ok());
        for epsilon in [0.0, 0.5, 0.6, -0.1, f64::NAN] {
            assert!(DegeneracyPolicy::Clamp { epsilon }.validate().is_err(), "{}", epsilon);
        }
    }
}
