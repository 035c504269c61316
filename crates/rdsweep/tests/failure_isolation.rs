//! Failure isolation and model lifecycle across a sweep.

mod common;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tempfile::tempdir;

use rdsweep::{
    ArtifactPaths, ArtifactResolver, BaseBinWidths, BlockTransformBackend, Configuration,
    ConfigurationSweep, DirectoryLayout, FailurePolicy, FamilyConfig, ModelDims,
    RateMode, ReconstructionSink, Result, SweepError, SweepMode, SweepRunner,
};
use rdsweep_core::{ChannelStatistics, LatentView, LumaView};
use rdsweep_rate::{AnalyticRate, RateEstimator};

use common::*;

fn three_checkpoints(layout: &DirectoryLayout, missing: Option<usize>) -> SweepMode {
    let keys = vec![key(1000.0, 0), key(5000.0, 0), key(20000.0, 0)];
    for (i, k) in keys.iter().enumerate() {
        if Some(i) != missing {
            write_checkpoint(layout, k, BASE_BIN_WIDTH);
        }
    }
    SweepMode::VaryingModel {
        checkpoints: keys,
        scaling_coefficients: vec![1000.0, 5000.0, 20000.0],
    }
}

fn configurations(mode: &SweepMode) -> Vec<Configuration> {
    ConfigurationSweep::build(mode, RateMode::Analytic)
        .unwrap()
        .into_configurations()
}

#[test]
fn test_missing_checkpoint_fails_only_its_configuration() {
    let dir = tempdir().unwrap();
    let layout = DirectoryLayout::new(dir.path());
    let mode = three_checkpoints(&layout, Some(1));
    let images = synthetic_images(2, ModelDims::new(16, 16), 5);

    let mut runner = SweepRunner::new(BlockTransformBackend::new(), layout);
    let report = runner.run(&images, configurations(&mode)).unwrap();

    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.configuration, 1);
    assert_eq!(failure.image, None);
    assert!(matches!(failure.error, SweepError::ModelLoad { .. }));
    assert!(!report.stopped_early);

    let rate = report.aggregator.rate();
    assert!(rate.is_row_complete(0));
    assert!(rate.is_row_complete(2));
    assert!(rate.row(1).unwrap().iter().all(Option::is_none));

    let backend = runner.session().backend();
    assert_eq!(backend.loads(), 4);
    assert_eq!(backend.peak_live(), 1);
    assert!(!runner.session().is_resident());
}

#[test]
fn test_abort_policy_stops_the_sweep() {
    let dir = tempdir().unwrap();
    let layout = DirectoryLayout::new(dir.path());
    let mode = three_checkpoints(&layout, Some(1));
    let images = synthetic_images(2, ModelDims::new(16, 16), 5);

    let mut runner = SweepRunner::new(BlockTransformBackend::new(), layout)
        .with_policy(FailurePolicy::Abort);
    let report = runner.run(&images, configurations(&mode)).unwrap();

    assert!(report.stopped_early);
    assert_eq!(report.failures.len(), 1);
    assert!(report.aggregator.rate().is_row_complete(0));
    assert!(report.aggregator.rate().row(2).unwrap().iter().all(Option::is_none));
}

#[test]
fn test_count_mismatch_before_any_load() {
    let dir = tempdir().unwrap();
    let layout = DirectoryLayout::new(dir.path());
    let family = FamilyConfig {
        name: "vary_gamma".into(),
        sweep: SweepMode::VaryingModel {
            checkpoints: vec![key(1000.0, 0), key(5000.0, 0), key(20000.0, 0)],
            scaling_coefficients: vec![1000.0, 5000.0],
        },
        rate_mode: RateMode::Analytic,
    };
    let images = synthetic_images(1, ModelDims::new(16, 16), 5);

    let mut runner = SweepRunner::new(BlockTransformBackend::new(), layout);
    let err = runner.run_family(&images, &family).unwrap_err();
    assert!(matches!(err, SweepError::ConfigurationCountMismatch { .. }));
    assert_eq!(runner.session().backend().loads(), 0);
}

#[test]
fn test_lossless_without_table_is_reported() {
    let dir = tempdir().unwrap();
    let layout = DirectoryLayout::new(dir.path());
    let key = key(10000.0, 0);
    write_checkpoint(&layout, &key, BASE_BIN_WIDTH);
    write_statistics(&layout, &key, &statistics(vec![false; CHANNELS]));

    let family = FamilyConfig {
        name: "fix_gamma".into(),
        sweep: SweepMode::FixedModel {
            checkpoint: key,
            base: BaseBinWidths::Trained,
            multipliers: vec![1.0],
        },
        rate_mode: RateMode::Lossless,
    };
    let images = synthetic_images(1, ModelDims::new(16, 16), 5);

    let mut runner = SweepRunner::new(BlockTransformBackend::new(), layout);
    let report = runner.run_family(&images, &family).unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].error.category(), "missing_artifact");
    // No silent fallback to the analytic rate.
    assert_eq!(report.aggregator.rate().get(0, 0), None);
}

#[test]
fn test_statistics_channel_mismatch() {
    let dir = tempdir().unwrap();
    let layout = DirectoryLayout::new(dir.path());
    let key = key(10000.0, 0);
    write_checkpoint(&layout, &key, BASE_BIN_WIDTH);
    let mut stats = statistics(vec![false; CHANNELS]);
    stats.mean.truncate(4);
    stats.exceptions.truncate(4);
    write_statistics(&layout, &key, &stats);

    let family = FamilyConfig {
        name: "fix_gamma".into(),
        sweep: SweepMode::FixedModel {
            checkpoint: key,
            base: BaseBinWidths::Trained,
            multipliers: vec![1.0, 2.0],
        },
        rate_mode: RateMode::Analytic,
    };
    let images = synthetic_images(1, ModelDims::new(16, 16), 5);

    let mut runner = SweepRunner::new(BlockTransformBackend::new(), layout);
    let report = runner.run_family(&images, &family).unwrap();
    assert_eq!(report.failures.len(), 2);
    assert!(report
        .failures
        .iter()
        .all(|f| matches!(f.error, SweepError::ShapeMismatch { .. })));
    assert!(!runner.session().is_resident());
}

/// Resolves every configuration to the same checkpoint.
struct SingleCheckpoint(std::path::PathBuf);

impl ArtifactResolver for SingleCheckpoint {
    fn resolve(&self, _configuration: &Configuration) -> Result<ArtifactPaths> {
        Ok(ArtifactPaths {
            checkpoint: self.0.clone(),
            statistics: None,
            probability_table: None,
        })
    }
}

/// Records accepted exports and refuses one (label, image) pair.
#[derive(Clone, Default)]
struct RecordingSink {
    accepted: Rc<RefCell<Vec<(String, usize)>>>,
    refuse: Option<(String, usize)>,
}

impl ReconstructionSink for RecordingSink {
    fn accept(&mut self, label: &str, image: usize, _reconstruction: LumaView<'_>) -> Result<()> {
        if let Some((refused_label, refused_image)) = &self.refuse {
            if refused_label == label && *refused_image == image {
                return Err(SweepError::io("disk full"));
            }
        }
        self.accepted.borrow_mut().push((label.to_string(), image));
        Ok(())
    }

    fn discard(&mut self, label: &str) -> Result<()> {
        self.accepted.borrow_mut().retain(|(kept, _)| kept != label);
        Ok(())
    }
}

/// Analytic rate that turns NaN on one call.
struct NanOnCall {
    inner: AnalyticRate,
    calls: Cell<usize>,
    nan_on: usize,
}

impl RateEstimator for NanOnCall {
    fn name(&self) -> &'static str {
        "nan_on_call"
    }

    fn estimate(
        &self,
        image: LatentView<'_>,
        bin_widths: &[f32],
        stats: &ChannelStatistics,
        dims: ModelDims,
    ) -> Result<f64> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        if call == self.nan_on {
            return Ok(f64::NAN);
        }
        self.inner.estimate(image, bin_widths, stats, dims)
    }
}

fn single_checkpoint_sweep(dir: &std::path::Path) -> (SingleCheckpoint, Vec<Configuration>) {
    let checkpoint = dir.join("only.ckpt");
    rdsweep::BlockCheckpoint::uniform(BLOCK, BASE_BIN_WIDTH)
        .save(&checkpoint)
        .unwrap();
    let mode = SweepMode::FixedModel {
        checkpoint: key(1.0, 0),
        base: BaseBinWidths::Trained,
        multipliers: vec![1.0, 2.0, 4.0],
    };
    (SingleCheckpoint(checkpoint), configurations(&mode))
}

fn complete_rows_except_middle() -> Vec<(String, usize)> {
    vec![
        ("multiplier_1dot0".to_string(), 0),
        ("multiplier_1dot0".to_string(), 1),
        ("multiplier_4dot0".to_string(), 0),
        ("multiplier_4dot0".to_string(), 1),
    ]
}

#[test]
fn test_injected_resolver_and_failing_sink() {
    let dir = tempdir().unwrap();
    let (resolver, configurations) = single_checkpoint_sweep(dir.path());
    let sink = RecordingSink {
        refuse: Some(("multiplier_2dot0".into(), 0)),
        ..RecordingSink::default()
    };
    let accepted = Rc::clone(&sink.accepted);
    let images = synthetic_images(2, ModelDims::new(16, 16), 9);

    let mut runner = SweepRunner::new(BlockTransformBackend::new(), resolver).with_sink(sink);
    let report = runner.run(&images, configurations).unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].configuration, 1);
    assert_eq!(report.failures[0].image, Some(0));
    assert!(report.aggregator.rate().row(1).unwrap().iter().all(Option::is_none));
    assert_eq!(*accepted.borrow(), complete_rows_except_middle());
}

#[test]
fn test_sink_refusing_a_later_image_drops_the_partial_row() {
    let dir = tempdir().unwrap();
    let (resolver, configurations) = single_checkpoint_sweep(dir.path());
    let sink = RecordingSink {
        refuse: Some(("multiplier_2dot0".into(), 1)),
        ..RecordingSink::default()
    };
    let accepted = Rc::clone(&sink.accepted);
    let images = synthetic_images(2, ModelDims::new(16, 16), 9);

    let mut runner = SweepRunner::new(BlockTransformBackend::new(), resolver).with_sink(sink);
    let report = runner.run(&images, configurations).unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].configuration, 1);
    assert_eq!(report.failures[0].image, Some(1));
    assert!(report.aggregator.rate().row(1).unwrap().iter().all(Option::is_none));
    assert_eq!(*accepted.borrow(), complete_rows_except_middle());
}

#[test]
fn test_scoring_failure_exports_nothing_for_the_row() {
    let dir = tempdir().unwrap();
    let (resolver, configurations) = single_checkpoint_sweep(dir.path());
    let sink = RecordingSink::default();
    let accepted = Rc::clone(&sink.accepted);
    let images = synthetic_images(2, ModelDims::new(16, 16), 9);

    // Calls run configuration by configuration, image by image: call 3 is
    // the second image of the second configuration.
    let estimator = NanOnCall {
        inner: AnalyticRate::new(),
        calls: Cell::new(0),
        nan_on: 3,
    };
    let mut runner = SweepRunner::new(BlockTransformBackend::new(), resolver)
        .with_analytic(estimator)
        .with_sink(sink);
    let report = runner.run(&images, configurations).unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].configuration, 1);
    assert_eq!(report.failures[0].image, Some(1));
    assert!(matches!(report.failures[0].error, SweepError::InvalidMeasurement(_)));
    assert!(report.aggregator.rate().row(1).unwrap().iter().all(Option::is_none));
    assert_eq!(*accepted.borrow(), complete_rows_except_middle());
}
