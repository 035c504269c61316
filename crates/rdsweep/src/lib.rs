//! # rdsweep
//!
//! Rate-distortion sweeps of learned image compression models.
//!
//! A sweep evaluates an ordered list of configurations on a set of
//! luminance images and fills two `configurations × images` matrices, one
//! with rates in bits per pixel and one with PSNRs in dB.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         SweepRunner                          │
//! ├───────────────┬───────────────┬──────────────┬───────────────┤
//! │ Configuration │ Artifact      │ ModelSession │ Result        │
//! │ Sweep         │ Resolver      │  (leases)    │ Aggregator    │
//! ├───────────────┴───────────────┼──────────────┼───────────────┤
//! │ rdsweep-rate: Analytic /      │ ModelBackend │ MatrixStore   │
//! │ Lossless rate estimators      │              │ PngExporter   │
//! ├───────────────────────────────┴──────────────┴───────────────┤
//! │ rdsweep-core: quantizer, distortion meter, types, errors     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use rdsweep::prelude::*;
//!
//! let config = EvaluationConfig::load(Path::new("evaluation.json"))?;
//! let mut runner = SweepRunner::from_config(BlockTransformBackend::new(), &config);
//! let store = MatrixStore::new(&config.output_dir);
//!
//! for family in &config.families {
//!     let report = runner.run_family(&images, family)?;
//!     store.save(&family.name, &report.aggregator)?;
//! }
//! ```
//!
//! Classical codecs are evaluated with [`evaluate_baseline`] and land in
//! matrices of the same shape, one row per quality or QP point.

pub mod aggregate;
pub mod artifacts;
pub mod baseline;
pub mod config;
pub mod engine;
pub mod export;
pub mod session;
pub mod store;
pub mod sweep;
pub mod synthetic;

pub use aggregate::{ResultAggregator, ResultMatrix};
pub use artifacts::{float_to_str, ArtifactPaths, ArtifactResolver, DirectoryLayout};
pub use baseline::{evaluate_baseline, BaselineReport, CommandTemplate, PointFailure, ToolCodec};
pub use config::{EvaluationConfig, ExportConfig, FailurePolicy, FamilyConfig};
pub use engine::{ConfigurationFailure, ConfigurationSummary, SweepReport, SweepRunner};
pub use export::{PngExporter, ReconstructionSink};
pub use session::{
    DecoderLease, EncoderLease, LatentDecoder, LatentEncoder, ModelBackend, ModelSession,
};
pub use store::MatrixStore;
pub use sweep::{
    BaseBinWidths, BinWidthPlan, CheckpointKey, Configuration, ConfigurationSweep, RateMode,
    SweepCoefficient, SweepMode,
};
pub use synthetic::{BlockCheckpoint, BlockTransformBackend};

pub use rdsweep_core::{
    ChannelStatistics, DistortionMeter, LuminanceImageSet, ModelDims, ProbabilityTable, Result,
    SweepError,
};

/// Prelude for common imports
pub mod prelude {
    pub use super::{
        ArtifactResolver, BlockTransformBackend, CheckpointKey, ConfigurationSweep,
        DirectoryLayout, EvaluationConfig, FailurePolicy, LuminanceImageSet, MatrixStore,
        ModelBackend, ModelDims, RateMode, Result, SweepError, SweepMode, SweepRunner,
    };
}
