//! The sweep runner.
//!
//! For each configuration, in order:
//!
//! ```text
//! resolve artifacts ─▶ encoder lease ─▶ latent ─▶ bin widths ─▶ quantize
//!                                                                  │
//!      record row ◀── distortion ◀── decoder lease ◀── rate per image
//! ```
//!
//! A configuration is atomic: its measurements are staged and only
//! committed to the aggregator once every image succeeded.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use rdsweep_core::{
    quantize, ChannelStatistics, DistortionMeter, LuminanceImageSet, ProbabilityTable,
    RateDistortionPoint, Result, SweepError,
};
use rdsweep_rate::{AnalyticRate, AnsEntropyCoder, LosslessRate, RateEstimator};

use crate::aggregate::ResultAggregator;
use crate::artifacts::{ArtifactResolver, DirectoryLayout};
use crate::config::{EvaluationConfig, FailurePolicy, FamilyConfig};
use crate::export::{export_row, PngExporter, ReconstructionSink};
use crate::session::{ModelBackend, ModelSession};
use crate::sweep::{Configuration, ConfigurationSweep, RateMode};

/// A configuration that did not complete.
#[derive(Debug)]
pub struct ConfigurationFailure {
    pub configuration: usize,
    /// Image being processed when the failure happened, if any.
    pub image: Option<usize>,
    pub error: SweepError,
}

/// Per-configuration means for reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationSummary {
    pub configuration: usize,
    pub label: String,
    pub mean_rate: Option<f64>,
    pub mean_psnr: Option<f64>,
}

/// Outcome of a sweep.
#[derive(Debug)]
pub struct SweepReport {
    pub configurations: Vec<Configuration>,
    pub aggregator: ResultAggregator,
    pub failures: Vec<ConfigurationFailure>,
    /// True if the failure policy stopped the sweep before the last configuration.
    pub stopped_early: bool,
}

impl SweepReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && !self.stopped_early
    }

    pub fn summaries(&self) -> Vec<ConfigurationSummary> {
        self.configurations
            .iter()
            .map(|c| ConfigurationSummary {
                configuration: c.index,
                label: c.label(),
                mean_rate: self.aggregator.mean_rate(c.index),
                mean_psnr: self.aggregator.mean_psnr(c.index),
            })
            .collect()
    }
}

/// Failure inside one configuration, tagged with the image if known.
struct Failed {
    image: Option<usize>,
    error: SweepError,
}

impl From<SweepError> for Failed {
    fn from(error: SweepError) -> Self {
        Self { image: None, error }
    }
}

trait AtImage<T> {
    fn at_image(self, image: usize) -> std::result::Result<T, Failed>;
}

impl<T> AtImage<T> for Result<T> {
    fn at_image(self, image: usize) -> std::result::Result<T, Failed> {
        self.map_err(|error| Failed {
            image: Some(image),
            error,
        })
    }
}

/// Evaluates configurations against one image set.
pub struct SweepRunner<B: ModelBackend, R: ArtifactResolver> {
    session: ModelSession<B>,
    resolver: R,
    analytic: Box<dyn RateEstimator>,
    lossless: Box<dyn RateEstimator>,
    policy: FailurePolicy,
    sink: Option<Box<dyn ReconstructionSink>>,
}

impl<B: ModelBackend, R: ArtifactResolver> SweepRunner<B, R> {
    pub fn new(backend: B, resolver: R) -> Self {
        Self {
            session: ModelSession::new(backend),
            resolver,
            analytic: Box::new(AnalyticRate::new()),
            lossless: Box::new(LosslessRate::new(AnsEntropyCoder)),
            policy: FailurePolicy::default(),
            sink: None,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_analytic(mut self, estimator: impl RateEstimator + 'static) -> Self {
        self.analytic = Box::new(estimator);
        self
    }

    pub fn with_lossless(mut self, estimator: impl RateEstimator + 'static) -> Self {
        self.lossless = Box::new(estimator);
        self
    }

    pub fn with_sink(mut self, sink: impl ReconstructionSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn session(&self) -> &ModelSession<B> {
        &self.session
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Builds and runs the configurations of `family`.
    ///
    /// Exports are keyed `<family>/<configuration label>`.
    pub fn run_family(
        &mut self,
        images: &LuminanceImageSet,
        family: &FamilyConfig,
    ) -> Result<SweepReport> {
        let sweep = ConfigurationSweep::build(&family.sweep, family.rate_mode)?;
        info!(family = %family.name, configurations = sweep.len(), "sweep family");
        self.run_labelled(images, sweep.into_configurations(), Some(&family.name))
    }

    /// Runs `configurations` in order.
    ///
    /// # Errors
    ///
    /// Only errors that make the matrices untrustworthy are returned; every
    /// other failure is reported in [`SweepReport::failures`].
    pub fn run(
        &mut self,
        images: &LuminanceImageSet,
        configurations: Vec<Configuration>,
    ) -> Result<SweepReport> {
        self.run_labelled(images, configurations, None)
    }

    fn run_labelled(
        &mut self,
        images: &LuminanceImageSet,
        configurations: Vec<Configuration>,
        family: Option<&str>,
    ) -> Result<SweepReport> {
        if images.is_empty() {
            return Err(SweepError::invalid_config("no image to evaluate"));
        }
        for (position, configuration) in configurations.iter().enumerate() {
            if configuration.index != position {
                return Err(SweepError::invalid_config(format!(
                    "configuration at position {position} has index {}",
                    configuration.index
                )));
            }
        }

        let meter = DistortionMeter::new(images.bit_depth());
        let mut aggregator = ResultAggregator::new(configurations.len(), images.len());
        let mut failures = Vec::new();
        let mut stopped_early = false;

        for configuration in &configurations {
            let index = configuration.index;
            let label = match family {
                Some(name) => format!("{name}/{}", configuration.label()),
                None => configuration.label(),
            };
            info!(
                configuration = index,
                label = %label,
                checkpoint = %configuration.checkpoint,
                rate_mode = configuration.rate_mode.as_str(),
                "evaluating configuration"
            );

            match self.evaluate(images, configuration, &meter, &label) {
                Ok(row) => {
                    for (image, point) in row.into_iter().enumerate() {
                        aggregator.record_point(index, image, point)?;
                    }
                    info!(
                        configuration = index,
                        mean_rate = ?aggregator.mean_rate(index),
                        mean_psnr = ?aggregator.mean_psnr(index),
                        "configuration complete"
                    );
                }
                Err(Failed { image, error }) => {
                    if error.is_sweep_fatal() {
                        return Err(error);
                    }
                    warn!(
                        configuration = index,
                        image = ?image,
                        category = error.category(),
                        error = %error,
                        "configuration failed"
                    );
                    failures.push(ConfigurationFailure {
                        configuration: index,
                        image,
                        error,
                    });
                    if self.policy == FailurePolicy::Abort {
                        stopped_early = index + 1 < configurations.len();
                        break;
                    }
                }
            }
        }

        Ok(SweepReport {
            configurations,
            aggregator,
            failures,
            stopped_early,
        })
    }

    fn evaluate(
        &mut self,
        images: &LuminanceImageSet,
        configuration: &Configuration,
        meter: &DistortionMeter,
        label: &str,
    ) -> std::result::Result<Vec<RateDistortionPoint>, Failed> {
        let dims = images.dims();
        let paths = self.resolver.resolve(configuration)?;

        let (latent, trained) = {
            let mut encoder = self.session.acquire_encoder(&paths.checkpoint, dims)?;
            let latent = encoder.encode(images)?;
            (latent, encoder.trained_bin_widths().to_vec())
        };
        let channels = latent.channels();

        let bin_widths = configuration.resolve_bin_widths(&trained)?;
        if bin_widths.len() != channels {
            return Err(SweepError::shape_mismatch("bin widths", channels, bin_widths.len()).into());
        }

        let mut stats = match &paths.statistics {
            Some(path) => ChannelStatistics::load(path)?,
            None => ChannelStatistics::uncentered(channels),
        };
        stats.ensure_channels(channels)?;
        if configuration.rate_mode == RateMode::Lossless {
            let path = paths.probability_table.as_ref().ok_or_else(|| {
                SweepError::MissingArtifact(format!(
                    "no probability table for configuration {}",
                    configuration.index
                ))
            })?;
            stats.probability_table = Some(ProbabilityTable::load(path)?);
            stats.validate()?;
        }

        let quantized = quantize(&latent, &stats.mean, &bin_widths)?;
        drop(latent);

        let estimator = match configuration.rate_mode {
            RateMode::Analytic => &self.analytic,
            RateMode::Lossless => &self.lossless,
        };
        let mut rates = Vec::with_capacity(images.len());
        for image in 0..images.len() {
            let rate = estimator
                .estimate(
                    quantized.centered_quantized.image(image),
                    &bin_widths,
                    &stats,
                    dims,
                )
                .at_image(image)?;
            rates.push(rate);
        }
        debug!(
            configuration = configuration.index,
            estimator = estimator.name(),
            "rates estimated"
        );

        let reconstruction = {
            let mut decoder = self.session.acquire_decoder(&paths.checkpoint, dims)?;
            decoder.decode(&quantized.off_centered)?
        };

        let mut row = Vec::with_capacity(images.len());
        let mut casts = Vec::new();
        for (image, (reference, rate)) in images.iter().zip(rates).enumerate() {
            let cast = meter.cast(reconstruction.image(image));
            let psnr = meter.psnr(reference, cast.view()).at_image(image)?;
            row.push(RateDistortionPoint::new(rate, psnr).at_image(image)?);
            if self.sink.is_some() {
                casts.push(cast);
            }
        }

        // Only rows that scored in full reach the sink.
        if let Some(sink) = self.sink.as_mut() {
            export_row(&mut **sink, label, &casts).map_err(|(image, error)| Failed {
                image: Some(image),
                error,
            })?;
        }
        Ok(row)
    }
}

impl<B: ModelBackend> SweepRunner<B, DirectoryLayout> {
    /// Runner wired from an evaluation config: catalog layout, failure
    /// policy, analytic scale floor and PNG export under `output_dir`.
    pub fn from_config(backend: B, config: &EvaluationConfig) -> Self {
        let mut runner = Self::new(backend, DirectoryLayout::new(&config.artifact_root))
            .with_policy(config.failure_policy)
            .with_analytic(AnalyticRate::with_scale_floor(config.laplace_scale_floor));
        if config.export.enabled {
            runner = runner.with_sink(PngExporter::new(export_root(config), &config.export));
        }
        runner
    }
}

/// Directory receiving image exports for `config`.
pub fn export_root(config: &EvaluationConfig) -> PathBuf {
    config.output_dir.join("visualization")
}
