//! Resolution of configurations to artifact paths.

use std::path::{Path, PathBuf};

use rdsweep_core::Result;

use crate::sweep::{CheckpointKey, Configuration, RateMode, SweepCoefficient};

/// Files a configuration reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Trained model parameters.
    pub checkpoint: PathBuf,
    /// Channel statistics. `None` evaluates the latent uncentered.
    pub statistics: Option<PathBuf>,
    /// Probability table for lossless coding.
    pub probability_table: Option<PathBuf>,
}

/// Maps a configuration to its artifacts.
pub trait ArtifactResolver {
    fn resolve(&self, configuration: &Configuration) -> Result<ArtifactPaths>;
}

/// Formats a float for file names: `1.0` becomes `1dot0`.
pub fn float_to_str(value: f32) -> String {
    format!("{value:?}").replace('.', "dot")
}

/// The on-disk catalog layout:
///
/// ```text
/// <root>/eae/results/<suffix>/model_<run>.ckpt
/// <root>/lossless/results/<suffix>/training_index_<run>/channel_statistics.json
/// <root>/lossless/results/<suffix>/training_index_<run>/probability_table_<multiplier>.json
/// ```
///
/// where `<suffix>` is `learning_bw_<init>_<gamma>` for checkpoints with
/// learned bin widths and `<init>_<gamma>` otherwise. Varying-model sweeps
/// quantize uncentered and read no statistics.
#[derive(Debug, Clone)]
pub struct DirectoryLayout {
    root: PathBuf,
}

impl DirectoryLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory name of a checkpoint family.
    pub fn suffix(key: &CheckpointKey) -> String {
        let base = format!(
            "{}_{}",
            float_to_str(key.bin_width_init),
            float_to_str(key.scaling_coefficient)
        );
        if key.learned_bin_widths {
            format!("learning_bw_{base}")
        } else {
            base
        }
    }

    pub fn checkpoint_path(&self, key: &CheckpointKey) -> PathBuf {
        self.root
            .join("eae")
            .join("results")
            .join(Self::suffix(key))
            .join(format!("model_{}.ckpt", key.training_index))
    }

    /// Directory holding the statistics of one training run.
    pub fn statistics_dir(&self, key: &CheckpointKey) -> PathBuf {
        self.root
            .join("lossless")
            .join("results")
            .join(Self::suffix(key))
            .join(format!("training_index_{}", key.training_index))
    }
}

impl ArtifactResolver for DirectoryLayout {
    fn resolve(&self, configuration: &Configuration) -> Result<ArtifactPaths> {
        let key = &configuration.checkpoint;
        let stats_dir = self.statistics_dir(key);

        let (statistics, multiplier) = match configuration.coefficient {
            SweepCoefficient::Multiplier(m) => {
                (Some(stats_dir.join("channel_statistics.json")), m)
            }
            SweepCoefficient::Scaling(_) => (None, 1.0),
        };
        let probability_table = (configuration.rate_mode == RateMode::Lossless).then(|| {
            stats_dir.join(format!("probability_table_{}.json", float_to_str(multiplier)))
        });

        Ok(ArtifactPaths {
            checkpoint: self.checkpoint_path(key),
            statistics,
            probability_table,
        })
    }
}
