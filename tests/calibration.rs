use anyhow::bail;
use movement_calibration::fit::ScalingLawFitter;
use movement_calibration::{
    Axis, CalibrationError, CalibrationHarness, CancelToken, OccupancyCalibration, TaskContext,
    VelocityCalibration, WorldGeometry,
};
use movement_common::{
    CalibrationConfig, DegeneracyPolicy, ModelKind, MovementModel, ParameterGroup,
};
use rand::rngs::StdRng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

fn grid_2x2() -> Vec<Axis> {
    vec![
        Axis::new("i", vec![0.0, 1.0]).unwrap(),
        Axis::new("j", vec![0.0, 1.0]).unwrap(),
    ]
}

#[test]
fn stub_results_land_at_their_indices() {
    let harness = CalibrationHarness::new(grid_2x2(), 1, 1).unwrap();
    let job = |ctx: &TaskContext, _: &mut StdRng| -> anyhow::Result<Vec<f64>> {
        Ok(vec![(ctx.index()[0] + ctx.index()[1]) as f64])
    };
    let tensor = harness.run(&job).unwrap();
    assert_eq!(tensor.shape(), &[2, 2, 1, 1]);
    for i in 0..2 {
        for j in 0..2 {
            assert_eq!(tensor.get(&[i, j, 0, 0]), Some((i + j) as f64));
        }
    }
}

#[test]
fn cancelling_mid_run_returns_cancelled() {
    let axes = vec![Axis::new("x", (0..64).map(f64::from).collect()).unwrap()];
    let harness = CalibrationHarness::new(axes, 2, 1)
        .unwrap()
        .with_threads(1)
        .unwrap();
    let total = harness.tasks().len();
    let cancel = harness.cancel_token();
    let started = AtomicUsize::new(0);

    let job = |ctx: &TaskContext, _: &mut StdRng| -> anyhow::Result<Vec<f64>> {
        if started.fetch_add(1, Ordering::SeqCst) == 0 {
            cancel.cancel();
        }
        // Busy task that only stops when told to
        let deadline = Instant::now() + Duration::from_secs(30);
        while !ctx.cancel().is_cancelled() {
            if Instant::now() > deadline {
                bail!("task was never cancelled");
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        Err(movement_calibration::SimulationError::Cancelled.into())
    };

    let start = Instant::now();
    let result = harness.run(&job);
    assert!(matches!(result, Err(CalibrationError::Cancelled)));
    assert!(start.elapsed() < Duration::from_secs(20));
    // One worker: every task after the cancelling one is skipped unrun
    assert_eq!(total, 128);
    assert_eq!(started.load(Ordering::SeqCst), 1);
}

#[test]
fn worker_failure_reports_grid_indices() {
    let harness = CalibrationHarness::new(grid_2x2(), 3, 2).unwrap();
    let job = |ctx: &TaskContext, _: &mut StdRng| -> anyhow::Result<Vec<f64>> {
        if ctx.index() == [1, 0] && ctx.world() == 2 {
            bail!("habitat generation failed");
        }
        Ok(vec![1.0; ctx.trials()])
    };
    match harness.run(&job) {
        Err(CalibrationError::Worker { index, world, source }) => {
            assert_eq!(index, vec![1, 0]);
            assert_eq!(world, 2);
            assert!(source.to_string().contains("habitat generation failed"));
        }
        other => panic!("expected a worker error, got {:?}", other.map(|t| t.shape().to_vec())),
    }
}

#[test]
fn first_failure_in_enumeration_order_wins() {
    let harness = CalibrationHarness::new(grid_2x2(), 1, 1).unwrap().with_threads(1).unwrap();
    let job = |ctx: &TaskContext, _: &mut StdRng| -> anyhow::Result<Vec<f64>> {
        if ctx.index()[0] == 1 {
            bail!("failure at {:?}", ctx.index());
        }
        Ok(vec![0.0])
    };
    match harness.run(&job) {
        Err(CalibrationError::Worker { index, .. }) => assert_eq!(index, vec![1, 0]),
        other => panic!("expected a worker error, got {:?}", other.map(|t| t.shape().to_vec())),
    }
}

#[test]
fn user_token_cancelled_before_run() {
    let cancel = CancelToken::new();
    let harness = CalibrationHarness::new(grid_2x2(), 1, 1)
        .unwrap()
        .with_cancel_token(cancel.clone());
    cancel.cancel();
    let job = |_: &TaskContext, _: &mut StdRng| -> anyhow::Result<Vec<f64>> {
        Ok(vec![0.0])
    };
    assert!(matches!(harness.run(&job), Err(CalibrationError::Cancelled)));
}

#[test]
fn velocity_calibration_end_to_end() {
    let model = MovementModel::new(ModelKind::HeatmapWeighted);
    let world = WorldGeometry::new((20.0, 20.0), 0.4);
    let calibration = VelocityCalibration::new(model.clone(), world, 20);
    let axes = VelocityCalibration::axes(&[0.5, 1.0, 1.5], &[0.3, 0.9]).unwrap();
    let harness = CalibrationHarness::new(axes, 2, 10).unwrap().with_seed(5);

    let first = harness.run(&calibration).unwrap();
    let second = harness.run(&calibration).unwrap();
    assert_eq!(first.data(), second.data(), "same seed must reproduce the run");

    let fit = calibration.fit(&first, &ScalingLawFitter::default()).unwrap();
    assert_eq!(fit.group(), ParameterGroup::Velocity);
    let updated = model.apply_fit(&fit).unwrap();
    assert_eq!(updated.kind(), ModelKind::HeatmapWeighted);
    assert!(updated.velocity_modification(0.5) > 0.0);
}

#[test]
fn occupancy_calibration_end_to_end() {
    let model = MovementModel::new(ModelKind::ConstantBrownian);
    let world = WorldGeometry::new((10.0, 10.0), 0.5);
    let calibration = OccupancyCalibration::new(model, world, 10, 60);
    let axes = OccupancyCalibration::axes(&[0.05, 0.2, 0.5], &[0.3, 0.8], &[5, 15, 40]).unwrap();
    let harness = CalibrationHarness::new(axes, 1, 4).unwrap().with_seed(11);
    let tensor = harness.run(&calibration).unwrap();
    assert_eq!(tensor.shape(), &[3, 2, 3, 1, 4]);
    assert!(tensor.data().iter().all(|v| (0.0..=1.0).contains(v)));

    let fitter = ScalingLawFitter::new(DegeneracyPolicy::Clamp { epsilon: 1e-3 }).unwrap();
    let fit = calibration.fit(&tensor, &fitter).unwrap();
    assert_eq!(fit.group(), ParameterGroup::Density);
    assert!(fit.coefficients().values().all(|c| c.is_finite()));
}

#[test]
fn bundled_config_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml");
    let config = CalibrationConfig::load(path).unwrap();
    assert!(config.velocity.is_some());
    assert!(config.home_range.is_some());
    assert!(config.occupancy.is_some());
    config.movement_model().unwrap();
}
