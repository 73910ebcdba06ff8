use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Log-odds of `y`, finite for `y` in `(0, 1)`.
#[inline]
pub fn logit(y: f64) -> f64 {
    -((1.0 / y) - 1.0).ln()
}

/// Inverse of [`logit`].
#[inline]
pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// The closed set of movement models. The variant selects the step sampler
/// used by the simulator and never changes once a model is built.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    /// Heavy-tailed steps whose tail index follows the local habitat suitability.
    HeatmapWeighted,
    /// Gaussian steps of fixed variance, blind to the habitat.
    ConstantBrownian,
}

impl ModelKind {
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::HeatmapWeighted => "Heatmap Weighted Model",
            ModelKind::ConstantBrownian => "Constant Brownian Model",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Linear correction of simulated velocity by niche size:
/// `measured / target = beta + alpha * niche_size`.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct VelocityParams {
    pub alpha: f64,
    pub beta: f64,
}

/// Power law linking home range to velocity: `velocity = alpha * home_range^exponent`.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct HomeRangeParams {
    pub alpha: f64,
    pub exponent: f64,
}

/// Logit-linear law linking population density to occupancy:
///
/// `logit(occ) = beta + alpha * nsz + (occ_exp_a * nsz + occ_exp_b) * ln(density) + hr_exp * ln(home_range / area)`
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct DensityParams {
    pub alpha: f64,
    pub beta: f64,
    pub hr_exp: f64,
    pub occ_exp_a: f64,
    pub occ_exp_b: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct MovementParams {
    #[serde(default = "default_steps_per_day")]
    pub steps_per_day: u32,
}

fn default_steps_per_day() -> u32 {
    4
}

/// Full coefficient bundle of a movement model.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct ModelParameters {
    pub velocity: VelocityParams,
    pub home_range: HomeRangeParams,
    pub density: DensityParams,
    pub movement: MovementParams,
}

impl ModelParameters {
    /// Uncalibrated starting coefficients for each model.
    pub fn defaults_for(kind: ModelKind) -> Self {
        match kind {
            ModelKind::ConstantBrownian => ModelParameters {
                // measured / target, so 0.95 asks for a slightly faster simulation
                velocity: VelocityParams { alpha: 0.0, beta: 0.95 },
                home_range: HomeRangeParams { alpha: 35.0, exponent: 0.54 },
                density: DensityParams {
                    alpha: 0.0,
                    beta: 0.5,
                    hr_exp: 0.6,
                    occ_exp_a: 0.0,
                    occ_exp_b: 0.8,
                },
                movement: MovementParams { steps_per_day: default_steps_per_day() },
            },
            ModelKind::HeatmapWeighted => ModelParameters {
                velocity: VelocityParams { alpha: 0.0, beta: 1.0 },
                home_range: HomeRangeParams { alpha: 24.0, exponent: 0.5 },
                density: DensityParams {
                    alpha: 0.0,
                    beta: 0.5,
                    hr_exp: 0.6,
                    occ_exp_a: 0.0,
                    occ_exp_b: 0.8,
                },
                movement: MovementParams { steps_per_day: default_steps_per_day() },
            },
        }
    }

    /// Checks that every coefficient is a finite real and that the
    /// simulator has at least one step per day.
    pub fn validate(&self) -> Result<()> {
        let coefficients = [
            ("velocity.alpha", self.velocity.alpha),
            ("velocity.beta", self.velocity.beta),
            ("home_range.alpha", self.home_range.alpha),
            ("home_range.exponent", self.home_range.exponent),
            ("density.alpha", self.density.alpha),
            ("density.beta", self.density.beta),
            ("density.hr_exp", self.density.hr_exp),
            ("density.occ_exp_a", self.density.occ_exp_a),
            ("density.occ_exp_b", self.density.occ_exp_b),
        ];
        for (name, value) in coefficients {
            if !value.is_finite() {
                anyhow::bail!("model coefficient {} must be finite, got {}", name, value);
            }
        }
        if self.movement.steps_per_day == 0 {
            anyhow::bail!("movement.steps_per_day must be greater than 0.");
        }
        Ok(())
    }
}

/// Which coefficient group a fit produced.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParameterGroup {
    Velocity,
    HomeRange,
    Density,
}

impl fmt::Display for ParameterGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterGroup::Velocity => f.write_str("velocity"),
            ParameterGroup::HomeRange => f.write_str("home_range"),
            ParameterGroup::Density => f.write_str("density"),
        }
    }
}

/// Coefficients recovered by a scaling-law fit. Immutable once built.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct FittedParameters {
    group: ParameterGroup,
    coefficients: BTreeMap<String, f64>,
}

impl FittedParameters {
    pub fn new<'a, I>(group: ParameterGroup, coefficients: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        FittedParameters {
            group,
            coefficients: coefficients
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        }
    }

    pub fn group(&self) -> ParameterGroup {
        self.group
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.coefficients.get(name).copied()
    }

    pub fn coefficients(&self) -> &BTreeMap<String, f64> {
        &self.coefficients
    }
}

/// An immutable movement model: a variant plus its coefficient bundle.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct MovementModel {
    kind: ModelKind,
    parameters: ModelParameters,
}

impl MovementModel {
    /// Creates a model with its default coefficients.
    pub fn new(kind: ModelKind) -> Self {
        MovementModel {
            kind,
            parameters: ModelParameters::defaults_for(kind),
        }
    }

    pub fn with_parameters(kind: ModelKind, parameters: ModelParameters) -> Result<Self> {
        parameters.validate()?;
        Ok(MovementModel { kind, parameters })
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn parameters(&self) -> &ModelParameters {
        &self.parameters
    }

    pub fn steps_per_day(&self) -> u32 {
        self.parameters.movement.steps_per_day
    }

    pub fn home_range_to_velocity(&self, home_range: f64) -> f64 {
        let hr = &self.parameters.home_range;
        hr.alpha * home_range.powf(hr.exponent)
    }

    pub fn velocity_to_home_range(&self, velocity: f64) -> f64 {
        let hr = &self.parameters.home_range;
        (velocity / hr.alpha).powf(1.0 / hr.exponent)
    }

    /// Expected ratio of measured to requested velocity at a niche size.
    pub fn velocity_modification(&self, niche_size: f64) -> f64 {
        let v = &self.parameters.velocity;
        v.beta + v.alpha * niche_size
    }

    /// Velocity to feed the simulator so the measured velocity hits `target`.
    /// Falls back to `target` when the correction is not positive.
    pub fn simulation_velocity(&self, target: f64, niche_size: f64) -> f64 {
        let modification = self.velocity_modification(niche_size);
        if modification > 0.0 {
            target / modification
        } else {
            target
        }
    }

    /// Cell side used to measure home ranges of individuals moving at `velocity`.
    pub fn home_range_resolution(&self, velocity: f64) -> f64 {
        velocity
    }

    /// Cell side used to measure occupancy for a given home range.
    pub fn occupancy_resolution(&self, home_range: f64) -> f64 {
        home_range.sqrt()
    }

    /// Linear predictor of the density law, i.e. `logit(occupancy)`.
    fn density_predictor(&self, density: f64, home_range: f64, niche_size: f64, area: f64) -> f64 {
        let d = &self.parameters.density;
        let occ_exp = d.occ_exp_a * niche_size + d.occ_exp_b;
        d.beta + d.alpha * niche_size + occ_exp * density.ln() + d.hr_exp * (home_range / area).ln()
    }

    pub fn density_to_occupancy(
        &self,
        density: f64,
        home_range: f64,
        niche_size: f64,
        area: f64,
    ) -> f64 {
        sigmoid(self.density_predictor(density, home_range, niche_size, area))
    }

    /// Inverts [`density_to_occupancy`](Self::density_to_occupancy).
    /// Returns `None` when `occupancy` is outside `(0, 1)` or the density
    /// exponent vanishes at this niche size.
    pub fn occupancy_to_density(
        &self,
        occupancy: f64,
        home_range: f64,
        niche_size: f64,
        area: f64,
    ) -> Option<f64> {
        if !(occupancy > 0.0 && occupancy < 1.0) {
            return None;
        }
        let d = &self.parameters.density;
        let occ_exp = d.occ_exp_a * niche_size + d.occ_exp_b;
        if occ_exp == 0.0 {
            return None;
        }
        let rest = d.beta + d.alpha * niche_size + d.hr_exp * (home_range / area).ln();
        Some(((logit(occupancy) - rest) / occ_exp).exp())
    }

    /// Returns a copy of this model with the fitted coefficients written into
    /// the matching group. The variant is kept.
    pub fn apply_fit(&self, fit: &FittedParameters) -> Result<Self> {
        let mut parameters = self.parameters;
        for (name, &value) in fit.coefficients() {
            if !value.is_finite() {
                anyhow::bail!(
                    "fitted coefficient {}.{} is not finite ({})",
                    fit.group(),
                    name,
                    value
                );
            }
            let slot = match (fit.group(), name.as_str()) {
                (ParameterGroup::Velocity, "alpha") => &mut parameters.velocity.alpha,
                (ParameterGroup::Velocity, "beta") => &mut parameters.velocity.beta,
                (ParameterGroup::HomeRange, "alpha") => &mut parameters.home_range.alpha,
                (ParameterGroup::HomeRange, "exponent") => &mut parameters.home_range.exponent,
                (ParameterGroup::Density, "alpha") => &mut parameters.density.alpha,
                (ParameterGroup::Density, "beta") => &mut parameters.density.beta,
                (ParameterGroup::Density, "hr_exp") => &mut parameters.density.hr_exp,
                (ParameterGroup::Density, "occ_exp_a") => &mut parameters.density.occ_exp_a,
                (ParameterGroup::Density, "occ_exp_b") => &mut parameters.density.occ_exp_b,
                (group, other) => anyhow::bail!("unknown {} coefficient '{}'", group, other),
            };
            *slot = value;
        }
        MovementModel::with_parameters(self.kind, parameters)
    }
}
