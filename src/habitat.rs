//! Habitat: the bounded domain, its suitability field and the starting
//! positions of a population.

use crate::boundary::reflect;
use crate::error::HabitatError;
use crate::grid::grid_dims;
use log::trace;
use movement_common::Vec2;
use ndarray::Array2;
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;

/// Most suitability peaks a random habitat will carry.
const MAX_NICHE_CENTRES: usize = 4;

/// A finite 2-D world with a suitability heatmap and initial positions.
///
/// The heatmap is indexed `[x cell, y cell]` and stored normalised to its own
/// maximum, so the peak suitability is exactly 1.
#[derive(Debug, Clone)]
pub struct Habitat {
    range: Vec2,
    resolution: f64,
    heatmap: Array2<f64>,
    initial_points: Array2<f64>,
    niche_size: Option<f64>,
}

impl Habitat {
    /// Validates and normalises a habitat description.
    pub fn new(
        range: (f64, f64),
        resolution: f64,
        heatmap: Array2<f64>,
        initial_points: Array2<f64>,
    ) -> Result<Self, HabitatError> {
        let (width, height) = range;
        if !(width.is_finite() && width > 0.0 && height.is_finite() && height > 0.0) {
            return Err(HabitatError::InvalidRange(width, height));
        }
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(HabitatError::InvalidResolution(resolution));
        }
        if heatmap.is_empty() {
            return Err(HabitatError::EmptyHeatmap);
        }
        let mut peak = 0.0f64;
        for ((x, y), &value) in heatmap.indexed_iter() {
            if !(value.is_finite() && value >= 0.0) {
                return Err(HabitatError::InvalidHeatmapValue { x, y, value });
            }
            peak = peak.max(value);
        }
        if peak <= 0.0 {
            return Err(HabitatError::FlatHeatmap);
        }
        if initial_points.ncols() != 2 {
            return Err(HabitatError::PointShape(initial_points.shape().to_vec()));
        }
        for (index, point) in initial_points.rows().into_iter().enumerate() {
            let (x, y) = (point[0], point[1]);
            if !(x >= 0.0 && x < width && y >= 0.0 && y < height) {
                return Err(HabitatError::PointOutOfRange { index, x, y });
            }
        }

        Ok(Habitat {
            range: Vec2::new(width, height),
            resolution,
            heatmap: heatmap / peak,
            initial_points,
            niche_size: None,
        })
    }

    /// Records the niche size this habitat was generated with.
    pub fn with_niche_size(mut self, niche_size: f64) -> Self {
        self.niche_size = Some(niche_size);
        self
    }

    /// Generates a random habitat with `num` initial points.
    ///
    /// The suitability field is a sum of Gaussian bumps around a few random
    /// centres whose spread scales with `niche_size`. Initial points pick a
    /// cell with probability proportional to its suitability and are jittered
    /// uniformly inside it.
    pub fn random<R: Rng + ?Sized>(
        niche_size: f64,
        range: (f64, f64),
        resolution: f64,
        num: usize,
        rng: &mut R,
    ) -> Result<Self, HabitatError> {
        if !(niche_size > 0.0 && niche_size <= 1.0) {
            return Err(HabitatError::InvalidNicheSize(niche_size));
        }
        let (width, height) = range;
        if !(width.is_finite() && width > 0.0 && height.is_finite() && height > 0.0) {
            return Err(HabitatError::InvalidRange(width, height));
        }
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(HabitatError::InvalidResolution(resolution));
        }

        let dims = grid_dims(Vec2::new(width, height), resolution);
        let num_centres = rng.random_range(1..=MAX_NICHE_CENTRES);
        let centres: Vec<Vec2> = (0..num_centres)
            .map(|_| Vec2::new(rng.random_range(0.0..width), rng.random_range(0.0..height)))
            .collect();
        let spread = niche_size * width.min(height) / 4.0;
        let two_spread_sq = 2.0 * spread * spread;

        let heatmap = Array2::from_shape_fn(dims, |(ix, iy)| {
            let centre_of_cell =
                Vec2::new((ix as f64 + 0.5) * resolution, (iy as f64 + 0.5) * resolution);
            centres
                .iter()
                .map(|c| (-(centre_of_cell - *c).length_squared() / two_spread_sq).exp())
                .sum::<f64>()
        });

        let chooser = WeightedIndex::new(heatmap.iter())
            .map_err(|e| HabitatError::Sampling(e.to_string()))?;
        let mut initial_points = Array2::zeros((num, 2));
        for mut point in initial_points.rows_mut() {
            let flat = chooser.sample(rng);
            let (ix, iy) = (flat / dims.1, flat % dims.1);
            // cells on the far edge may stick out of the habitat; fold them back in
            point[0] = reflect((ix as f64 + rng.random::<f64>()) * resolution, width);
            point[1] = reflect((iy as f64 + rng.random::<f64>()) * resolution, height);
        }
        trace!(
            "Generated habitat: niche size {:.2}, {} centres, {}x{} cells, {} points",
            niche_size,
            num_centres,
            dims.0,
            dims.1,
            num
        );

        Ok(Habitat::new(range, resolution, heatmap, initial_points)?.with_niche_size(niche_size))
    }

    pub fn range(&self) -> Vec2 {
        self.range
    }

    pub fn area(&self) -> f64 {
        self.range.x * self.range.y
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Normalised suitability grid.
    pub fn heatmap(&self) -> &Array2<f64> {
        &self.heatmap
    }

    pub fn heatmap_dims(&self) -> (usize, usize) {
        self.heatmap.dim()
    }

    pub fn initial_points(&self) -> &Array2<f64> {
        &self.initial_points
    }

    pub fn num_points(&self) -> usize {
        self.initial_points.nrows()
    }

    pub fn niche_size(&self) -> Option<f64> {
        self.niche_size
    }
}
