use crate::error::CalibrationError;
use crate::harness::Axis;
use movement_common::{AxisRecord, CalibrationReport, FittedParameters};
use ndarray::{ArrayD, ArrayViewD, IxDyn};

/// Dense calibration results.
///
/// Shape is the swept axes in order, then the world index, then the trial
/// index: `axes lengths ++ [num_worlds, trials_per_world]`. Built once by the
/// harness from fully computed results and read-only afterwards.
#[derive(Debug, Clone)]
pub struct ResultTensor {
    axes: Vec<Axis>,
    num_worlds: usize,
    trials_per_world: usize,
    data: ArrayD<f64>,
}

impl ResultTensor {
    /// Builds a tensor from row-major `data`.
    pub fn from_parts(
        axes: Vec<Axis>,
        num_worlds: usize,
        trials_per_world: usize,
        data: Vec<f64>,
    ) -> Result<Self, CalibrationError> {
        let mut shape: Vec<usize> = axes.iter().map(Axis::len).collect();
        shape.push(num_worlds);
        shape.push(trials_per_world);
        let data = ArrayD::from_shape_vec(IxDyn(&shape), data)?;
        Ok(ResultTensor {
            axes,
            num_worlds,
            trials_per_world,
            data,
        })
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn num_worlds(&self) -> usize {
        self.num_worlds
    }

    pub fn trials_per_world(&self) -> usize {
        self.trials_per_world
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    /// Number of grid cells (product of the swept axis lengths).
    pub fn num_cells(&self) -> usize {
        self.axes.iter().map(Axis::len).product()
    }

    /// Single value at a full index (axes, world, trial).
    pub fn get(&self, index: &[usize]) -> Option<f64> {
        self.data.get(index).copied()
    }

    /// All samples of one grid cell, shape `[num_worlds, trials_per_world]`.
    ///
    /// Panics if `index` does not address a cell of the grid.
    pub fn cell(&self, index: &[usize]) -> ArrayViewD<'_, f64> {
        assert_eq!(index.len(), self.axes.len(), "cell index must address every swept axis");
        let mut view = self.data.view();
        for &i in index {
            view = view.index_axis_move(ndarray::Axis(0), i);
        }
        view
    }

    /// The flattened samples of one grid cell, worlds first.
    pub fn cell_samples(&self, index: &[usize]) -> Vec<f64> {
        self.cell(index).iter().copied().collect()
    }

    /// Mean and population standard deviation over a cell's samples.
    pub fn cell_mean_std(&self, index: &[usize]) -> (f64, f64) {
        let cell = self.cell(index);
        let n = cell.len() as f64;
        let mean = cell.sum() / n;
        let var = cell.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        (mean, var.sqrt())
    }

    /// Every grid index in row-major order.
    pub fn grid_indices(&self) -> Vec<Vec<usize>> {
        let dims: Vec<usize> = self.axes.iter().map(Axis::len).collect();
        (0..self.num_cells()).map(|ordinal| unravel(ordinal, &dims)).collect()
    }

    /// Axis values of a grid index.
    pub fn cell_values(&self, index: &[usize]) -> Vec<f64> {
        self.axes.iter().zip(index).map(|(axis, &i)| axis.values()[i]).collect()
    }

    pub fn to_report(
        &self,
        calibration: &str,
        model: &str,
        fitted: Option<FittedParameters>,
    ) -> CalibrationReport {
        CalibrationReport {
            calibration: calibration.to_string(),
            model: model.to_string(),
            axes: self
                .axes
                .iter()
                .map(|a| AxisRecord {
                    name: a.name().to_string(),
                    values: a.values().to_vec(),
                })
                .collect(),
            num_worlds: self.num_worlds,
            trials_per_world: self.trials_per_world,
            shape: self.shape().to_vec(),
            data: self.data.iter().copied().collect(),
            fitted,
        }
    }
}

/// Row-major multi-index of `ordinal` over `dims`.
pub(crate) fn unravel(mut ordinal: usize, dims: &[usize]) -> Vec<usize> {
    let mut index = vec![0; dims.len()];
    for (slot, &dim) in index.iter_mut().zip(dims).rev() {
        *slot = ordinal % dim;
        ordinal /= dim;
    }
    index
}
