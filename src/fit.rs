//! Scaling-law fits over calibration tensors.
//!
//! Every fit flattens the world and trial samples of each grid cell into one
//! regression sample set, repeating the cell's covariates, then solves an
//! ordinary least-squares problem by SVD.

use crate::error::FitError;
use crate::tensor::ResultTensor;
use log::{debug, warn};
use movement_common::{logit, DegeneracyPolicy, FittedParameters, ParameterGroup};
use nalgebra::{DMatrix, DVector};

/// Link applied to the response before regression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Identity,
    Log,
    Logit,
}

/// A response value after its transform and degeneracy handling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Prepared {
    Value(f64),
    /// Pulled into `[epsilon, 1 - epsilon]` before the transform.
    Clamped(f64),
    Excluded,
}

impl Transform {
    /// Transforms `y`, applying `policy` where the link diverges.
    ///
    /// Clamping only applies to `Logit`; non-finite input and non-positive
    /// input under `Log` are always excluded.
    pub fn prepare(&self, y: f64, policy: DegeneracyPolicy) -> Prepared {
        if !y.is_finite() {
            return Prepared::Excluded;
        }
        match self {
            Transform::Identity => Prepared::Value(y),
            Transform::Log if y > 0.0 => Prepared::Value(y.ln()),
            Transform::Log => Prepared::Excluded,
            Transform::Logit => match policy {
                DegeneracyPolicy::Clamp { epsilon } if y < epsilon || y > 1.0 - epsilon => {
                    Prepared::Clamped(logit(y.max(epsilon).min(1.0 - epsilon)))
                }
                _ if y > 0.0 && y < 1.0 => Prepared::Value(logit(y)),
                _ => Prepared::Excluded,
            },
        }
    }
}

/// Solution of a least-squares problem.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearFit {
    /// Intercept first when one was fitted, then one slope per feature.
    pub coefficients: Vec<f64>,
    pub rank: usize,
    pub samples: usize,
}

/// Ordinary least squares of `targets` on the rows of `features`.
///
/// All rows must have the same length. `context` names the fit in errors.
pub fn least_squares(
    context: &str,
    features: &[Vec<f64>],
    targets: &[f64],
    with_intercept: bool,
) -> Result<LinearFit, FitError> {
    debug_assert_eq!(features.len(), targets.len());
    let n = targets.len();
    let offset = usize::from(with_intercept);
    let cols = features.first().map_or(0, Vec::len) + offset;
    if cols == 0 || n < cols {
        return Err(FitError::InsufficientData {
            context: context.to_string(),
            usable: n,
            required: cols.max(1),
        });
    }

    let x = DMatrix::from_fn(n, cols, |r, c| {
        if c < offset {
            1.0
        } else {
            features[r][c - offset]
        }
    });
    let y = DVector::from_column_slice(targets);

    let svd = x.svd(true, true);
    let eps = svd.singular_values.max() * n.max(cols) as f64 * f64::EPSILON;
    let rank = svd.rank(eps);
    if rank < cols {
        return Err(FitError::Singular {
            context: context.to_string(),
            rank,
            required: cols,
        });
    }
    let solution = svd.solve(&y, eps).map_err(FitError::Solve)?;

    Ok(LinearFit {
        coefficients: solution.iter().copied().collect(),
        rank,
        samples: n,
    })
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Tally {
    clamped: usize,
    excluded: usize,
}

impl Tally {
    fn push(&mut self, prepared: Prepared) -> Option<f64> {
        match prepared {
            Prepared::Value(v) => Some(v),
            Prepared::Clamped(v) => {
                self.clamped += 1;
                Some(v)
            }
            Prepared::Excluded => {
                self.excluded += 1;
                None
            }
        }
    }

    fn report(&self, context: &str, total: usize) {
        if self.clamped > 0 || self.excluded > 0 {
            warn!(
                "{}: {} of {} samples clamped, {} excluded as degenerate.",
                context, self.clamped, total, self.excluded
            );
        }
    }
}

/// Fits the model's scaling laws to calibration results.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScalingLawFitter {
    policy: DegeneracyPolicy,
}

impl ScalingLawFitter {
    /// Fails when a clamping policy leaves no room between its bounds.
    pub fn new(policy: DegeneracyPolicy) -> Result<Self, FitError> {
        policy
            .validate()
            .map_err(|e| FitError::InvalidPolicy(e.to_string()))?;
        Ok(ScalingLawFitter { policy })
    }

    /// Velocity correction from a `(velocity, niche_size)` tensor of measured
    /// velocities.
    ///
    /// For every niche size the measured velocity is regressed on the target
    /// through the origin; the slopes are then regressed on niche size, giving
    /// `measured / target = beta + alpha * niche_size`.
    pub fn fit_velocity(&self, tensor: &ResultTensor) -> Result<FittedParameters, FitError> {
        expect_axes(tensor, 2)?;
        let velocities = tensor.axes()[0].values();
        let niche_sizes = tensor.axes()[1].values();

        let mut slopes = Vec::with_capacity(niche_sizes.len());
        let mut tally = Tally::default();
        let mut total = 0;
        for j in 0..niche_sizes.len() {
            let mut features = Vec::new();
            let mut targets = Vec::new();
            for (i, &target) in velocities.iter().enumerate() {
                for measured in tensor.cell_samples(&[i, j]) {
                    total += 1;
                    let prepared = Transform::Identity.prepare(measured, self.policy);
                    if let Some(m) = tally.push(prepared) {
                        features.push(vec![target]);
                        targets.push(m);
                    }
                }
            }
            let context = format!("velocity slope at niche size {}", niche_sizes[j]);
            let fit = least_squares(&context, &features, &targets, false)?;
            debug!("{}: {:.4}", context, fit.coefficients[0]);
            slopes.push(fit.coefficients[0]);
        }
        tally.report("velocity fit", total);

        let features: Vec<Vec<f64>> = niche_sizes.iter().map(|&n| vec![n]).collect();
        let fit = least_squares("velocity correction", &features, &slopes, true)?;
        Ok(FittedParameters::new(
            ParameterGroup::Velocity,
            [("beta", fit.coefficients[0]), ("alpha", fit.coefficients[1])],
        ))
    }

    /// Home range power law from a `(velocity, niche_size)` tensor of measured
    /// home ranges: `velocity = alpha * home_range^exponent`.
    pub fn fit_home_range(&self, tensor: &ResultTensor) -> Result<FittedParameters, FitError> {
        expect_axes(tensor, 2)?;
        let axis = &tensor.axes()[0];

        let mut features = Vec::new();
        let mut targets = Vec::new();
        let mut tally = Tally::default();
        let mut total = 0;
        for index in tensor.grid_indices() {
            let velocity = axis.values()[index[0]];
            let log_velocity = positive_log(axis.name(), velocity)?;
            for home_range in tensor.cell_samples(&index) {
                total += 1;
                if let Some(log_hr) = tally.push(Transform::Log.prepare(home_range, self.policy)) {
                    features.push(vec![log_hr]);
                    targets.push(log_velocity);
                }
            }
        }
        tally.report("home range fit", total);

        let fit = least_squares("home range power law", &features, &targets, true)?;
        Ok(FittedParameters::new(
            ParameterGroup::HomeRange,
            [("alpha", fit.coefficients[0].exp()), ("exponent", fit.coefficients[1])],
        ))
    }

    /// Density law from a `(home_range, niche_size, num)` tensor of measured
    /// occupancies over a habitat of extent `range`:
    ///
    /// `logit(occ) = beta + alpha*nsz + occ_exp_b*ln(d) + occ_exp_a*nsz*ln(d) + hr_exp*ln(hr/area)`
    ///
    /// with `d = num / area`.
    pub fn fit_density(
        &self,
        tensor: &ResultTensor,
        range: (f64, f64),
    ) -> Result<FittedParameters, FitError> {
        expect_axes(tensor, 3)?;
        let area = range.0 * range.1;
        let axes = tensor.axes();

        let mut features = Vec::new();
        let mut targets = Vec::new();
        let mut tally = Tally::default();
        let mut total = 0;
        for index in tensor.grid_indices() {
            let home_range = axes[0].values()[index[0]];
            let niche_size = axes[1].values()[index[1]];
            let num = axes[2].values()[index[2]];
            let log_density = positive_log(axes[2].name(), num / area)?;
            let log_hr = positive_log(axes[0].name(), home_range / area)?;
            let row = vec![niche_size, log_density, niche_size * log_density, log_hr];
            for occupancy in tensor.cell_samples(&index) {
                total += 1;
                if let Some(z) = tally.push(Transform::Logit.prepare(occupancy, self.policy)) {
                    features.push(row.clone());
                    targets.push(z);
                }
            }
        }
        tally.report("density fit", total);

        let fit = least_squares("density law", &features, &targets, true)?;
        let c = &fit.coefficients;
        Ok(FittedParameters::new(
            ParameterGroup::Density,
            [
                ("beta", c[0]),
                ("alpha", c[1]),
                ("occ_exp_b", c[2]),
                ("occ_exp_a", c[3]),
                ("hr_exp", c[4]),
            ],
        ))
    }
}

fn expect_axes(tensor: &ResultTensor, expected: usize) -> Result<(), FitError> {
    let actual = tensor.axes().len();
    if actual != expected {
        return Err(FitError::AxisCount { expected, actual });
    }
    Ok(())
}

fn positive_log(axis: &str, value: f64) -> Result<f64, FitError> {
    if value > 0.0 && value.is_finite() {
        Ok(value.ln())
    } else {
        Err(FitError::InvalidCovariate {
            axis: axis.to_string(),
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::Axis;
    use movement_common::{ModelKind, MovementModel};

    const TOL: f64 = 1e-8;

    fn build(
        axes: Vec<Axis>,
        worlds: usize,
        trials: usize,
        f: impl Fn(&[f64]) -> f64,
    ) -> ResultTensor {
        let dims: Vec<usize> = axes.iter().map(Axis::len).collect();
        let cells: usize = dims.iter().product();
        let mut data = Vec::new();
        for ordinal in 0..cells {
            let index = crate::tensor::unravel(ordinal, &dims);
            let values: Vec<f64> = axes.iter().zip(&index).map(|(a, &i)| a.values()[i]).collect();
            data.extend(std::iter::repeat(f(&values)).take(worlds * trials));
        }
        ResultTensor::from_parts(axes, worlds, trials, data).unwrap()
    }

    #[test]
    fn fitter_rejects_empty_clamp_range() {
        for epsilon in [0.5, 0.6, 0.0, f64::NAN] {
            assert!(matches!(
                ScalingLawFitter::new(DegeneracyPolicy::Clamp { epsilon }),
                Err(FitError::InvalidPolicy(_))
            ));
        }
        assert!(ScalingLawFitter::new(DegeneracyPolicy::Exclude).is_ok());
    }

    #[test]
    fn wide_epsilon_does_not_panic_in_prepare() {
        let wide = DegeneracyPolicy::Clamp { epsilon: 0.6 };
        assert!(matches!(Transform::Logit.prepare(0.5, wide), Prepared::Clamped(_)));
    }

    #[test]
    fn degeneracy_policy_is_applied() {
        let clamp = DegeneracyPolicy::Clamp { epsilon: 1e-3 };
        assert_eq!(Transform::Logit.prepare(0.0, clamp), Prepared::Clamped(logit(1e-3)));
        assert_eq!(Transform::Logit.prepare(1.0, clamp), Prepared::Clamped(logit(1.0 - 1e-3)));
        assert_eq!(Transform::Logit.prepare(0.5, clamp), Prepared::Value(0.0));
        assert_eq!(Transform::Logit.prepare(f64::NAN, clamp), Prepared::Excluded);
        let exclude = DegeneracyPolicy::Exclude;
        assert_eq!(Transform::Logit.prepare(0.0, exclude), Prepared::Excluded);
        assert_eq!(Transform::Logit.prepare(1.0, exclude), Prepared::Excluded);
        assert_eq!(Transform::Log.prepare(0.0, clamp), Prepared::Excluded);
        assert_eq!(Transform::Log.prepare(-2.0, exclude), Prepared::Excluded);
        assert_eq!(Transform::Identity.prepare(f64::INFINITY, clamp), Prepared::Excluded);
    }

    #[test]
    fn least_squares_recovers_a_line() {
        let features: Vec<Vec<f64>> = (0..5).map(|i| vec![i as f64]).collect();
        let targets: Vec<f64> = (0..5).map(|i| 2.0 + 3.0 * i as f64).collect();
        let fit = least_squares("line", &features, &targets, true).unwrap();
        assert!((fit.coefficients[0] - 2.0).abs() < TOL);
        assert!((fit.coefficients[1] - 3.0).abs() < TOL);
        assert_eq!(fit.rank, 2);
    }

    #[test]
    fn least_squares_rejects_degenerate_problems() {
        let constant = vec![vec![1.0]; 4];
        assert!(matches!(
            least_squares("flat", &constant, &[1.0, 2.0, 3.0, 4.0], true),
            Err(FitError::Singular { rank: 1, required: 2, .. })
        ));
        assert!(matches!(
            least_squares("short", &[vec![1.0]], &[1.0], true),
            Err(FitError::InsufficientData { usable: 1, required: 2, .. })
        ));
    }

    #[test]
    fn recovers_exact_power_law() {
        let (alpha, exponent) = (24.0, 0.5);
        let axes = vec![
            Axis::new("velocity", vec![0.1, 0.3, 0.5, 0.8, 1.4]).unwrap(),
            Axis::new("niche_size", vec![0.2, 0.9]).unwrap(),
        ];
        // home range such that velocity = alpha * hr^exponent
        let tensor = build(axes, 2, 3, |v| (v[0] / alpha).powf(1.0 / exponent));
        let fit = ScalingLawFitter::default().fit_home_range(&tensor).unwrap();
        assert!((fit.get("alpha").unwrap() - alpha).abs() < 1e-6);
        assert!((fit.get("exponent").unwrap() - exponent).abs() < TOL);
    }

    #[test]
    fn recovers_velocity_correction() {
        let (alpha, beta) = (-0.4, 1.1);
        let axes = vec![
            Axis::new("velocity", vec![0.5, 1.0, 2.0]).unwrap(),
            Axis::new("niche_size", vec![0.3, 0.6, 0.9]).unwrap(),
        ];
        let tensor = build(axes, 2, 2, |v| (beta + alpha * v[1]) * v[0]);
        let fit = ScalingLawFitter::default().fit_velocity(&tensor).unwrap();
        assert!((fit.get("alpha").unwrap() - alpha).abs() < TOL);
        assert!((fit.get("beta").unwrap() - beta).abs() < TOL);
    }

    #[test]
    fn velocity_fit_needs_two_niche_sizes() {
        let axes = vec![
            Axis::new("velocity", vec![0.5, 1.0]).unwrap(),
            Axis::new("niche_size", vec![0.3]).unwrap(),
        ];
        let tensor = build(axes, 1, 2, |v| v[0]);
        assert!(matches!(
            ScalingLawFitter::default().fit_velocity(&tensor),
            Err(FitError::InsufficientData { .. })
        ));
    }

    #[test]
    fn recovers_exact_density_law() {
        let range = (20.0, 20.0);
        let area = range.0 * range.1;
        let mut truth = *MovementModel::new(ModelKind::HeatmapWeighted).parameters();
        truth.density.alpha = -0.7;
        truth.density.beta = 4.0;
        truth.density.hr_exp = 0.55;
        truth.density.occ_exp_a = 0.2;
        truth.density.occ_exp_b = 0.9;
        let model = MovementModel::with_parameters(ModelKind::HeatmapWeighted, truth).unwrap();

        let axes = vec![
            Axis::new("home_range", vec![0.5, 1.0, 3.0]).unwrap(),
            Axis::new("niche_size", vec![0.3, 0.6, 0.9]).unwrap(),
            Axis::new("num", vec![5.0, 20.0, 80.0]).unwrap(),
        ];
        let tensor = build(axes, 1, 2, |v| {
            model.density_to_occupancy(v[2] / area, v[0], v[1], area)
        });
        let fit = ScalingLawFitter::default().fit_density(&tensor, range).unwrap();
        assert!((fit.get("alpha").unwrap() - truth.density.alpha).abs() < 1e-6);
        assert!((fit.get("beta").unwrap() - truth.density.beta).abs() < 1e-6);
        assert!((fit.get("hr_exp").unwrap() - truth.density.hr_exp).abs() < 1e-6);
        assert!((fit.get("occ_exp_a").unwrap() - truth.density.occ_exp_a).abs() < 1e-6);
        assert!((fit.get("occ_exp_b").unwrap() - truth.density.occ_exp_b).abs() < 1e-6);

        let updated = MovementModel::new(ModelKind::HeatmapWeighted).apply_fit(&fit).unwrap();
        assert_eq!(updated.kind(), ModelKind::HeatmapWeighted);
    }

    #[test]
    fn excluded_samples_can_starve_the_fit() {
        let axes = vec![
            Axis::new("home_range", vec![0.5, 1.0]).unwrap(),
            Axis::new("niche_size", vec![0.3, 0.6]).unwrap(),
            Axis::new("num", vec![5.0, 20.0]).unwrap(),
        ];
        let saturated = build(axes, 1, 3, |_| 1.0);
        let excluding = ScalingLawFitter::new(DegeneracyPolicy::Exclude).unwrap();
        assert!(matches!(
            excluding.fit_density(&saturated, (20.0, 20.0)),
            Err(FitError::InsufficientData { usable: 0, .. })
        ));
    }

    #[test]
    fn rejects_wrong_axis_count() {
        let axes = vec![Axis::new("velocity", vec![1.0, 2.0]).unwrap()];
        let tensor = build(axes, 1, 1, |v| v[0]);
        assert!(matches!(
            ScalingLawFitter::default().fit_home_range(&tensor),
            Err(FitError::AxisCount { expected: 2, actual: 1 })
        ));
    }
}
