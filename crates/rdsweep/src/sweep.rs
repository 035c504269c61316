//! Enumeration of the configurations a sweep evaluates.
//!
//! Two families are supported:
//!
//! - **Fixed model**: one checkpoint, bin widths scaled by each multiplier.
//! - **Varying model**: one checkpoint per scaling coefficient, each
//!   quantized with the bin widths it was trained with.

use std::fmt;

use serde::{Deserialize, Serialize};

use rdsweep_core::quantize::validate_bin_widths;
use rdsweep_core::{Result, SweepError};

use crate::artifacts::float_to_str;

/// Identity of one trained checkpoint in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointKey {
    /// Initial bin width at training time.
    pub bin_width_init: f32,
    /// Rate-distortion trade-off coefficient at training time.
    pub scaling_coefficient: f32,
    /// Index of the training run.
    #[serde(default)]
    pub training_index: u32,
    /// Whether bin widths were learned during training.
    #[serde(default)]
    pub learned_bin_widths: bool,
}

impl fmt::Display for CheckpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bw_init={} gamma={} run={}{}",
            self.bin_width_init,
            self.scaling_coefficient,
            self.training_index,
            if self.learned_bin_widths { " learned" } else { "" }
        )
    }
}

/// How a rate is computed for a configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateMode {
    #[default]
    Analytic,
    Lossless,
}

impl RateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateMode::Analytic => "analytic",
            RateMode::Lossless => "lossless",
        }
    }
}

/// Where a configuration's bin widths come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinWidthPlan {
    /// Known before the encoder is loaded.
    Fixed(Vec<f32>),
    /// The checkpoint's trained bin widths scaled by `multiplier`.
    Trained { multiplier: f32 },
}

/// The swept coefficient of a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepCoefficient {
    Multiplier(f32),
    Scaling(f32),
}

impl SweepCoefficient {
    pub fn value(&self) -> f32 {
        match *self {
            SweepCoefficient::Multiplier(v) | SweepCoefficient::Scaling(v) => v,
        }
    }
}

/// One point of a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Row of this configuration in the result matrices.
    pub index: usize,
    pub checkpoint: CheckpointKey,
    pub plan: BinWidthPlan,
    pub coefficient: SweepCoefficient,
    pub rate_mode: RateMode,
}

impl Configuration {
    /// Resolves the bin widths once the trained ones are known.
    pub fn resolve_bin_widths(&self, trained: &[f32]) -> Result<Vec<f32>> {
        let widths = match &self.plan {
            BinWidthPlan::Fixed(widths) => widths.clone(),
            BinWidthPlan::Trained { multiplier } => {
                trained.iter().map(|w| w * multiplier).collect()
            }
        };
        validate_bin_widths(&widths)?;
        Ok(widths)
    }

    /// Short name used for exports and log fields.
    pub fn label(&self) -> String {
        match self.coefficient {
            SweepCoefficient::Multiplier(m) => format!("multiplier_{}", float_to_str(m)),
            SweepCoefficient::Scaling(g) => format!(
                "scaling_{}_run_{}",
                float_to_str(g),
                self.checkpoint.training_index
            ),
        }
    }
}

/// Base bin widths of a fixed-model sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseBinWidths {
    /// Bin widths the checkpoint was trained with.
    Trained,
    /// An explicit vector, one entry per latent channel.
    Explicit(Vec<f32>),
}

/// Definition of a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SweepMode {
    FixedModel {
        checkpoint: CheckpointKey,
        base: BaseBinWidths,
        multipliers: Vec<f32>,
    },
    VaryingModel {
        checkpoints: Vec<CheckpointKey>,
        scaling_coefficients: Vec<f32>,
    },
}

/// Ordered list of configurations.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationSweep {
    configurations: Vec<Configuration>,
}

impl ConfigurationSweep {
    /// Builds the configurations of `mode` in input order.
    ///
    /// Nothing is loaded here, so every error surfaces before the first
    /// model is touched.
    pub fn build(mode: &SweepMode, rate_mode: RateMode) -> Result<Self> {
        let configurations = match mode {
            SweepMode::FixedModel {
                checkpoint,
                base,
                multipliers,
            } => {
                if multipliers.is_empty() {
                    return Err(SweepError::invalid_config("no multiplier to sweep"));
                }
                check_positive("multiplier", multipliers)?;
                if let BaseBinWidths::Explicit(widths) = base {
                    if widths.is_empty() {
                        return Err(SweepError::invalid_config("explicit base bin widths are empty"));
                    }
                    validate_bin_widths(widths)?;
                }

                multipliers
                    .iter()
                    .enumerate()
                    .map(|(index, &multiplier)| Configuration {
                        index,
                        checkpoint: checkpoint.clone(),
                        plan: match base {
                            BaseBinWidths::Trained => BinWidthPlan::Trained { multiplier },
                            BaseBinWidths::Explicit(widths) => {
                                BinWidthPlan::Fixed(widths.iter().map(|w| w * multiplier).collect())
                            }
                        },
                        coefficient: SweepCoefficient::Multiplier(multiplier),
                        rate_mode,
                    })
                    .collect()
            }
            SweepMode::VaryingModel {
                checkpoints,
                scaling_coefficients,
            } => {
                if checkpoints.len() != scaling_coefficients.len() {
                    return Err(SweepError::ConfigurationCountMismatch {
                        checkpoints: checkpoints.len(),
                        coefficients: scaling_coefficients.len(),
                    });
                }
                if checkpoints.is_empty() {
                    return Err(SweepError::invalid_config("no checkpoint to sweep"));
                }
                check_positive("scaling coefficient", scaling_coefficients)?;
                // The coefficient names the run, the key locates its checkpoint.
                for (index, (checkpoint, &gamma)) in
                    checkpoints.iter().zip(scaling_coefficients).enumerate()
                {
                    if checkpoint.scaling_coefficient != gamma {
                        return Err(SweepError::invalid_config(format!(
                            "configuration {index}: scaling coefficient {gamma} does not match \
                             checkpoint {checkpoint}"
                        )));
                    }
                }

                checkpoints
                    .iter()
                    .zip(scaling_coefficients)
                    .enumerate()
                    .map(|(index, (checkpoint, &gamma))| Configuration {
                        index,
                        checkpoint: checkpoint.clone(),
                        plan: BinWidthPlan::Trained { multiplier: 1.0 },
                        coefficient: SweepCoefficient::Scaling(gamma),
                        rate_mode,
                    })
                    .collect()
            }
        };

        Ok(Self { configurations })
    }

    pub fn configurations(&self) -> &[Configuration] {
        &self.configurations
    }

    pub fn into_configurations(self) -> Vec<Configuration> {
        self.configurations
    }

    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }
}

fn check_positive(what: &str, values: &[f32]) -> Result<()> {
    match values.iter().find(|v| !v.is_finite() || **v <= 0.0) {
        Some(v) => Err(SweepError::invalid_config(format!(
            "{what} {v} is not strictly positive"
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(gamma: f32) -> CheckpointKey {
        CheckpointKey {
            bin_width_init: 1.0,
            scaling_coefficient: gamma,
            training_index: 0,
            learned_bin_widths: true,
        }
    }

    #[test]
    fn test_fixed_model_preserves_order() {
        let mode = SweepMode::FixedModel {
            checkpoint: key(10000.0),
            base: BaseBinWidths::Explicit(vec![1.0, 0.5]),
            multipliers: vec![4.0, 1.0, 2.0],
        };
        let sweep = ConfigurationSweep::build(&mode, RateMode::Analytic).unwrap();
        let widths: Vec<Vec<f32>> = sweep
            .configurations()
            .iter()
            .map(|c| c.resolve_bin_widths(&[]).unwrap())
            .collect();
        assert_eq!(widths, vec![vec![4.0, 2.0], vec![1.0, 0.5], vec![2.0, 1.0]]);
        assert_eq!(sweep.configurations()[2].index, 2);
    }

    #[test]
    fn test_trained_plan_scales_trained_widths() {
        let mode = SweepMode::FixedModel {
            checkpoint: key(10000.0),
            base: BaseBinWidths::Trained,
            multipliers: vec![2.0],
        };
        let sweep = ConfigurationSweep::build(&mode, RateMode::Lossless).unwrap();
        let config = &sweep.configurations()[0];
        assert_eq!(config.resolve_bin_widths(&[0.5, 1.5]).unwrap(), vec![1.0, 3.0]);
        assert_eq!(config.rate_mode, RateMode::Lossless);
        assert_eq!(config.label(), "multiplier_2dot0");
    }

    #[test]
    fn test_varying_model_count_mismatch() {
        let mode = SweepMode::VaryingModel {
            checkpoints: vec![key(1.0), key(2.0), key(3.0)],
            scaling_coefficients: vec![1.0, 2.0],
        };
        let err = ConfigurationSweep::build(&mode, RateMode::Analytic).unwrap_err();
        assert!(matches!(
            err,
            SweepError::ConfigurationCountMismatch {
                checkpoints: 3,
                coefficients: 2
            }
        ));
    }

    #[test]
    fn test_varying_model_coefficient_must_match_checkpoint() {
        let mode = SweepMode::VaryingModel {
            checkpoints: vec![key(1000.0), key(1000.0)],
            scaling_coefficients: vec![1000.0, 5000.0],
        };
        let err = ConfigurationSweep::build(&mode, RateMode::Analytic).unwrap_err();
        match err {
            SweepError::InvalidConfiguration(message) => {
                assert!(message.starts_with("configuration 1"), "{message}")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_varying_model_uses_trained_widths() {
        let mode = SweepMode::VaryingModel {
            checkpoints: vec![key(1.0), key(2.0)],
            scaling_coefficients: vec![1.0, 2.0],
        };
        let sweep = ConfigurationSweep::build(&mode, RateMode::Analytic).unwrap();
        assert_eq!(sweep.len(), 2);
        for config in sweep.configurations() {
            assert_eq!(config.resolve_bin_widths(&[0.25]).unwrap(), vec![0.25]);
        }
    }

    #[test]
    fn test_rejects_bad_multipliers() {
        for multipliers in [vec![], vec![1.0, 0.0], vec![1.0, f32::INFINITY]] {
            let mode = SweepMode::FixedModel {
                checkpoint: key(1.0),
                base: BaseBinWidths::Trained,
                multipliers,
            };
            assert!(matches!(
                ConfigurationSweep::build(&mode, RateMode::Analytic),
                Err(SweepError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn test_resolution_rejects_collapsed_widths() {
        let mode = SweepMode::FixedModel {
            checkpoint: key(1.0),
            base: BaseBinWidths::Trained,
            multipliers: vec![1.0],
        };
        let sweep = ConfigurationSweep::build(&mode, RateMode::Analytic).unwrap();
        assert!(sweep.configurations()[0].resolve_bin_widths(&[1.0, 0.0]).is_err());
    }

    #[test]
    fn test_mode_from_json() {
        let json = r#"{
            "mode": "varying_model",
            "checkpoints": [
                {"bin_width_init": 1.0, "scaling_coefficient": 5000.0}
            ],
            "scaling_coefficients": [5000.0]
        }"#;
        let mode: SweepMode = serde_json::from_str(json).unwrap();
        assert!(matches!(mode, SweepMode::VaryingModel { .. }));
    }
}
