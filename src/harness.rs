//! Parallel parameter sweep.
//!
//! A harness enumerates every (grid cell, world) pair of a Cartesian parameter
//! grid, runs one task per pair on a dedicated rayon pool and assembles the
//! per-trial values into a [`ResultTensor`].
//!
//! Tasks are enumerated row-major over `(axis indices…, world)` and collected
//! with an indexed parallel iterator, so the position of a result in the
//! collected buffer is its enumeration ordinal. Only the orchestrating thread
//! writes the tensor, after every task has finished.
//!
//! Cancellation is cooperative. Each run owns a child of the harness token;
//! the first genuine task failure cancels the child so in-flight tasks stop
//! at their next poll, while cancelling the harness token aborts the run as a
//! whole. A panicking task propagates its
//! panic out of [`CalibrationHarness::run`].

use crate::cancel::CancelToken;
use crate::error::{CalibrationError, SimulationError};
use crate::tensor::{unravel, ResultTensor};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::time::Instant;

/// Odd 64-bit constant spreading task ordinals across the seed space.
const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// One named, ordered parameter axis of the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    name: String,
    values: Vec<f64>,
}

impl Axis {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Result<Self, CalibrationError> {
        let name = name.into();
        if values.is_empty() {
            return Err(CalibrationError::Config(format!("axis '{}' has no values", name)));
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(CalibrationError::Config(format!(
                "axis '{}' holds a non-finite value ({})",
                name, bad
            )));
        }
        Ok(Axis { name, values })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A unit of work: one grid cell in one world.
#[derive(Debug, Clone, PartialEq)]
pub struct GridTask {
    /// Position in enumeration order.
    pub ordinal: usize,
    /// Index into each axis.
    pub index: Vec<usize>,
    /// Axis values at `index`.
    pub values: Vec<f64>,
    pub world: usize,
    pub seed: u64,
}

/// What a task sees while it runs.
#[derive(Debug, Clone)]
pub struct TaskContext {
    task: GridTask,
    trials: usize,
    cancel: CancelToken,
}

impl TaskContext {
    pub fn task(&self) -> &GridTask {
        &self.task
    }

    pub fn index(&self) -> &[usize] {
        &self.task.index
    }

    pub fn values(&self) -> &[f64] {
        &self.task.values
    }

    /// Value of the `axis`-th swept parameter.
    pub fn value(&self, axis: usize) -> f64 {
        self.task.values[axis]
    }

    pub fn world(&self) -> usize {
        self.task.world
    }

    /// Number of values the task must return.
    pub fn trials(&self) -> usize {
        self.trials
    }

    /// Token to poll; cancelled when the run is aborted.
    pub fn cancel(&self) -> &CancelToken {
        &self.cancel
    }
}

/// Work executed for every (grid cell, world) pair.
///
/// Must return exactly [`TaskContext::trials`] values. Implementations are
/// shared by reference across worker threads. `rng` is seeded from the task
/// seed alone and is the only generator the task gets.
pub trait CalibrationTask: Sync {
    fn run(&self, ctx: &TaskContext, rng: &mut StdRng) -> anyhow::Result<Vec<f64>>;
}

impl<F> CalibrationTask for F
where
    F: Fn(&TaskContext, &mut StdRng) -> anyhow::Result<Vec<f64>> + Sync,
{
    fn run(&self, ctx: &TaskContext, rng: &mut StdRng) -> anyhow::Result<Vec<f64>> {
        self(ctx, rng)
    }
}

enum TaskOutcome {
    Done(Vec<f64>),
    Failed(CalibrationError),
    Aborted,
}

/// Sweeps a parameter grid over several worlds in parallel.
#[derive(Debug, Clone)]
pub struct CalibrationHarness {
    axes: Vec<Axis>,
    num_worlds: usize,
    trials_per_world: usize,
    threads: Option<usize>,
    seed: u64,
    cancel: CancelToken,
    progress: bool,
}

impl CalibrationHarness {
    pub fn new(
        axes: Vec<Axis>,
        num_worlds: usize,
        trials_per_world: usize,
    ) -> Result<Self, CalibrationError> {
        if axes.is_empty() {
            return Err(CalibrationError::Config("at least one axis is required".to_string()));
        }
        if let Some(axis) = axes.iter().find(|a| a.is_empty()) {
            return Err(CalibrationError::Config(format!("axis '{}' has no values", axis.name())));
        }
        if num_worlds == 0 {
            return Err(CalibrationError::Config("num_worlds must be at least 1".to_string()));
        }
        if trials_per_world == 0 {
            return Err(CalibrationError::Config("trials_per_world must be at least 1".to_string()));
        }
        Ok(CalibrationHarness {
            axes,
            num_worlds,
            trials_per_world,
            threads: None,
            seed: 0,
            cancel: CancelToken::new(),
            progress: false,
        })
    }

    /// Bounds the worker pool. Defaults to the available parallelism.
    pub fn with_threads(mut self, threads: usize) -> Result<Self, CalibrationError> {
        if threads == 0 {
            return Err(CalibrationError::Config("thread count must be at least 1".to_string()));
        }
        self.threads = Some(threads);
        Ok(self)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Draws a progress bar on stderr while running.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Token that aborts any run of this harness when cancelled.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
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

    /// Shape of the tensor a run produces.
    pub fn shape(&self) -> Vec<usize> {
        self.axes
            .iter()
            .map(Axis::len)
            .chain([self.num_worlds, self.trials_per_world])
            .collect()
    }

    /// Every task in enumeration order.
    pub fn tasks(&self) -> Vec<GridTask> {
        let mut dims: Vec<usize> = self.axes.iter().map(Axis::len).collect();
        dims.push(self.num_worlds);
        let total: usize = dims.iter().product();
        (0..total)
            .map(|ordinal| {
                let mut index = unravel(ordinal, &dims);
                let world = index.pop().unwrap_or_default();
                let values = self.axes.iter().zip(&index).map(|(a, &i)| a.values[i]).collect();
                GridTask {
                    ordinal,
                    index,
                    values,
                    world,
                    seed: task_seed(self.seed, ordinal),
                }
            })
            .collect()
    }

    /// Runs `job` for every task and assembles the results.
    pub fn run<T: CalibrationTask + ?Sized>(
        &self,
        job: &T,
    ) -> Result<ResultTensor, CalibrationError> {
        if self.cancel.is_cancelled() {
            return Err(CalibrationError::Cancelled);
        }

        let tasks = self.tasks();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads.unwrap_or(0))
            .thread_name(|i| format!("calibration-worker-{}", i))
            .build()?;
        info!(
            "Running {} tasks ({} cells x {} worlds, {} trials each) on {} threads.",
            tasks.len(),
            tasks.len() / self.num_worlds,
            self.num_worlds,
            self.trials_per_world,
            pool.current_num_threads()
        );

        let abort = self.cancel.child();
        let progress = self.progress_bar(tasks.len());
        let start_time = Instant::now();

        let outcomes: Vec<TaskOutcome> = pool.install(|| {
            tasks
                .par_iter()
                .map(|task| {
                    let outcome = self.run_one(job, task, &abort);
                    if let TaskOutcome::Failed(e) = &outcome {
                        debug!("Task {} failed, aborting run: {}", task.ordinal, e);
                        abort.cancel();
                    }
                    progress.inc(1);
                    outcome
                })
                .collect()
        });
        progress.finish_and_clear();

        if self.cancel.is_cancelled() {
            info!("Calibration cancelled after {:.2} s.", start_time.elapsed().as_secs_f64());
            return Err(CalibrationError::Cancelled);
        }

        let mut data = Vec::with_capacity(tasks.len() * self.trials_per_world);
        let mut aborted = false;
        for outcome in outcomes {
            match outcome {
                TaskOutcome::Done(values) => data.extend(values),
                TaskOutcome::Failed(e) => return Err(e),
                TaskOutcome::Aborted => aborted = true,
            }
        }
        if aborted {
            return Err(CalibrationError::Cancelled);
        }

        info!("Calibration finished in {:.3} seconds.", start_time.elapsed().as_secs_f64());
        ResultTensor::from_parts(self.axes.clone(), self.num_worlds, self.trials_per_world, data)
    }

    fn run_one<T: CalibrationTask + ?Sized>(
        &self,
        job: &T,
        task: &GridTask,
        abort: &CancelToken,
    ) -> TaskOutcome {
        if abort.is_cancelled() {
            return TaskOutcome::Aborted;
        }
        let ctx = TaskContext {
            task: task.clone(),
            trials: self.trials_per_world,
            cancel: abort.clone(),
        };
        let mut rng = StdRng::seed_from_u64(task.seed);
        match job.run(&ctx, &mut rng) {
            Ok(values) if values.len() == self.trials_per_world => TaskOutcome::Done(values),
            Ok(values) => TaskOutcome::Failed(CalibrationError::ResultShape {
                index: task.index.clone(),
                world: task.world,
                expected: self.trials_per_world,
                actual: values.len(),
            }),
            Err(e) if abort.is_cancelled() && is_cancellation(&e) => TaskOutcome::Aborted,
            Err(source) => TaskOutcome::Failed(CalibrationError::Worker {
                index: task.index.clone(),
                world: task.world,
                source,
            }),
        }
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len as u64);
        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} tasks ({percent}%) [{eta}]")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        bar
    }
}

/// Seed of the task at `ordinal`, independent of scheduling.
pub fn task_seed(base: u64, ordinal: usize) -> u64 {
    base.wrapping_add((ordinal as u64 + 1).wrapping_mul(SEED_STRIDE))
}

fn is_cancellation(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<SimulationError>(), Some(SimulationError::Cancelled))
        || matches!(e.downcast_ref::<CalibrationError>(), Some(CalibrationError::Cancelled))
}
