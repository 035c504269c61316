//! Evaluation configuration.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use rdsweep_core::{Result, SweepError};

use crate::baseline::ToolCodec;
use crate::sweep::{ConfigurationSweep, RateMode, SweepMode};

/// What a sweep does after a configuration fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Report the failure and evaluate the next configuration.
    #[default]
    Continue,
    /// Stop after the first failure.
    Abort,
}

/// One named sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyConfig {
    /// Name used for result files and export directories.
    pub name: String,
    pub sweep: SweepMode,
    #[serde(default)]
    pub rate_mode: RateMode,
}

/// Reconstruction export settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Write reconstructions and references as images.
    #[serde(default)]
    pub enabled: bool,

    /// Side of the square crops.
    #[serde(default = "default_crop_size")]
    pub crop_size: usize,

    /// Top-left `[row, col]` of every crop.
    #[serde(default)]
    pub crop_positions: Vec<[usize; 2]>,

    /// Indices of the images rotated by 90 degrees before export.
    #[serde(default)]
    pub rotated_images: Vec<usize>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            crop_size: default_crop_size(),
            crop_positions: Vec::new(),
            rotated_images: Vec::new(),
        }
    }
}

/// Top-level configuration of an evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Root of the checkpoint and statistics catalog
    #[serde(default = "default_artifact_root")]
    pub artifact_root: PathBuf,

    /// Where matrices and exports are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Smallest Laplace scale fit by the analytic rate
    #[serde(default = "default_laplace_scale_floor")]
    pub laplace_scale_floor: f64,

    #[serde(default)]
    pub families: Vec<FamilyConfig>,

    #[serde(default)]
    pub export: ExportConfig,

    /// External codecs evaluated as baselines
    #[serde(default)]
    pub baselines: Vec<ToolCodec>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            artifact_root: default_artifact_root(),
            output_dir: default_output_dir(),
            failure_policy: FailurePolicy::default(),
            laplace_scale_floor: default_laplace_scale_floor(),
            families: Vec::new(),
            export: ExportConfig::default(),
            baselines: Vec::new(),
        }
    }
}

impl EvaluationConfig {
    /// Loads and validates a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            SweepError::io(format!("failed to open config {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations that would fail before evaluating anything.
    pub fn validate(&self) -> Result<()> {
        if self.families.is_empty() && self.baselines.is_empty() {
            return Err(SweepError::invalid_config("nothing to evaluate"));
        }

        let mut names = HashSet::new();
        for family in &self.families {
            if family.name.is_empty() {
                return Err(SweepError::invalid_config("family name is empty"));
            }
            if !names.insert(family.name.as_str()) {
                return Err(SweepError::invalid_config(format!(
                    "duplicate family name {}",
                    family.name
                )));
            }
            ConfigurationSweep::build(&family.sweep, family.rate_mode)?;
        }

        if !self.laplace_scale_floor.is_finite() || self.laplace_scale_floor <= 0.0 {
            return Err(SweepError::invalid_config(
                "laplace_scale_floor must be positive",
            ));
        }
        if self.export.enabled && self.export.crop_size == 0 {
            return Err(SweepError::invalid_config("crop_size must be positive"));
        }

        let mut tools = HashSet::new();
        for codec in &self.baselines {
            codec.validate()?;
            if !tools.insert(codec.name.as_str()) {
                return Err(SweepError::invalid_config(format!(
                    "duplicate baseline name {}",
                    codec.name
                )));
            }
        }
        Ok(())
    }

    pub fn family(&self, name: &str) -> Option<&FamilyConfig> {
        self.families.iter().find(|f| f.name == name)
    }
}

fn default_artifact_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./evaluation")
}

fn default_laplace_scale_floor() -> f64 {
    rdsweep_rate::DEFAULT_SCALE_FLOOR
}

fn default_crop_size() -> usize {
    100
}
