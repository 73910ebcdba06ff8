//! Step samplers: the per-individual displacement draw of the movement kernel.

use movement_common::{ModelKind, Vec2};
use rand::Rng;
use rand_distr::StandardNormal;
use std::f64::consts::TAU;

/// √(2/π), the mean absolute value of a standard normal variable.
pub const HALF_NORMAL_MEAN: f64 = 0.797_884_560_802_865_4;

/// Tail exponent at zero suitability. Kept above 1 so the step law has a mean.
pub const MIN_TAIL_EXPONENT: f64 = 1.1;
/// Increase of the tail exponent between zero and peak suitability.
pub const TAIL_EXPONENT_SPAN: f64 = 0.9;

/// Draws the displacement of one individual for one time step.
///
/// The variant is fixed when the simulator is built from a movement model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepSampler {
    /// Uniform heading, Pareto-type step length whose tail index grows with
    /// the local suitability.
    HeatmapWeighted,
    /// Independent Gaussian components; ignores the habitat.
    ConstantBrownian,
}

impl From<ModelKind> for StepSampler {
    fn from(kind: ModelKind) -> Self {
        match kind {
            ModelKind::HeatmapWeighted => StepSampler::HeatmapWeighted,
            ModelKind::ConstantBrownian => StepSampler::ConstantBrownian,
        }
    }
}

impl StepSampler {
    /// Samples a displacement given the local suitability `field_value`
    /// (in `[0, 1]`) and the per-step `velocity`.
    #[inline]
    pub fn displacement<R: Rng + ?Sized>(
        &self,
        field_value: f64,
        velocity: f64,
        rng: &mut R,
    ) -> Vec2 {
        match self {
            StepSampler::HeatmapWeighted => {
                let heading = Vec2::from_angle(rng.random_range(0.0..TAU));
                let u: f64 = rng.random();
                heading.scale(pareto_magnitude(velocity, tail_exponent(field_value), u))
            }
            StepSampler::ConstantBrownian => {
                let sigma = velocity / HALF_NORMAL_MEAN;
                let dx: f64 = rng.sample(StandardNormal);
                let dy: f64 = rng.sample(StandardNormal);
                Vec2::new(sigma * dx, sigma * dy)
            }
        }
    }
}

/// Tail exponent of the step-length law at suitability `field_value`.
#[inline(always)]
pub fn tail_exponent(field_value: f64) -> f64 {
    MIN_TAIL_EXPONENT + TAIL_EXPONENT_SPAN * field_value
}

/// Inverse-transform draw of a Pareto-type step length with mean `velocity`.
///
/// `u` is uniform on `[0, 1)`; `exponent` must exceed 1.
#[inline(always)]
pub fn pareto_magnitude(velocity: f64, exponent: f64, u: f64) -> f64 {
    (velocity * (exponent - 1.0)) / ((1.0 - u).powf(1.0 / exponent) * exponent)
}
