//! Precomputed per-channel statistics of a trained checkpoint.
//!
//! These are produced by an offline analysis stage and only ever read
//! here. Both artifacts are stored as JSON.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SweepError};

/// Per-channel mean, exception flags and optional Laplace scales.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStatistics {
    /// Approximate mean of each latent channel.
    pub mean: Vec<f32>,
    /// Channels whose statistics fall outside the generic entropy model.
    pub exceptions: Vec<bool>,
    /// Laplace scale of each channel, fit at training time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub laplace_scales: Option<Vec<f32>>,
    /// Symbol probabilities for lossless coding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability_table: Option<ProbabilityTable>,
}

impl ChannelStatistics {
    /// Statistics that leave the latent uncentered and flag no exception.
    pub fn uncentered(channels: usize) -> Self {
        Self {
            mean: vec![0.0; channels],
            exceptions: vec![false; channels],
            laplace_scales: None,
            probability_table: None,
        }
    }

    /// Number of channels described.
    pub fn channels(&self) -> usize {
        self.mean.len()
    }

    /// Loads statistics from a JSON file and validates them.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            SweepError::MissingArtifact(format!(
                "channel statistics {}: {}",
                path.display(),
                e
            ))
        })?;
        let stats: Self = serde_json::from_reader(BufReader::new(file))?;
        stats.validate()?;
        Ok(stats)
    }

    /// Checks that every per-channel vector has the same length.
    pub fn validate(&self) -> Result<()> {
        let channels = self.channels();
        if self.exceptions.len() != channels {
            return Err(SweepError::shape_mismatch(
                "exception flags",
                channels,
                self.exceptions.len(),
            ));
        }
        if let Some(scales) = &self.laplace_scales {
            if scales.len() != channels {
                return Err(SweepError::shape_mismatch(
                    "laplace scales",
                    channels,
                    scales.len(),
                ));
            }
            if scales.iter().any(|s| !s.is_finite() || *s <= 0.0) {
                return Err(SweepError::invalid_config(
                    "laplace scales must be finite and positive",
                ));
            }
        }
        if let Some(table) = &self.probability_table {
            table.validate()?;
            if table.channels() != channels {
                return Err(SweepError::shape_mismatch(
                    "probability table",
                    channels,
                    table.channels(),
                ));
            }
        }
        if self.mean.iter().any(|m| !m.is_finite()) {
            return Err(SweepError::invalid_config("channel means must be finite"));
        }
        Ok(())
    }

    /// Checks the statistics describe a latent with `channels` channels.
    pub fn ensure_channels(&self, channels: usize) -> Result<()> {
        if self.channels() != channels {
            return Err(SweepError::shape_mismatch(
                "channel statistics",
                channels,
                self.channels(),
            ));
        }
        Ok(())
    }
}

/// Categorical distribution over quantization indices `-support..=support`
/// for every channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityTable {
    /// Largest absolute quantization index covered by the table.
    pub support: u32,
    /// One probability vector of length `2 * support + 1` per channel.
    pub pmfs: Vec<Vec<f64>>,
}

impl ProbabilityTable {
    /// Create a validated table.
    pub fn new(support: u32, pmfs: Vec<Vec<f64>>) -> Result<Self> {
        let table = Self { support, pmfs };
        table.validate()?;
        Ok(table)
    }

    /// Loads a table from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            SweepError::MissingArtifact(format!(
                "probability table {}: {}",
                path.display(),
                e
            ))
        })?;
        let table: Self = serde_json::from_reader(BufReader::new(file))?;
        table.validate()?;
        Ok(table)
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.pmfs.len()
    }

    /// Number of symbols per channel.
    pub fn alphabet_size(&self) -> usize {
        2 * self.support as usize + 1
    }

    /// Probability vector of `channel`, indexed by `index + support`.
    pub fn pmf(&self, channel: usize) -> &[f64] {
        &self.pmfs[channel]
    }

    /// Maps a signed quantization index to its symbol, if covered.
    pub fn symbol(&self, index: i64) -> Option<usize> {
        let support = i64::from(self.support);
        (-support..=support)
            .contains(&index)
            .then(|| (index + support) as usize)
    }

    fn validate(&self) -> Result<()> {
        let size = self.alphabet_size();
        for (channel, pmf) in self.pmfs.iter().enumerate() {
            if pmf.len() != size {
                return Err(SweepError::shape_mismatch(
                    "probability table row",
                    size,
                    format!("{} (channel {})", pmf.len(), channel),
                ));
            }
            if pmf.iter().any(|p| !p.is_finite() || *p < 0.0) {
                return Err(SweepError::invalid_config(format!(
                    "probability table row {channel} holds a negative or non-finite entry"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_symbol_mapping() {
        let table = ProbabilityTable::new(2, vec![vec![0.1, 0.2, 0.4, 0.2, 0.1]]).unwrap();
        assert_eq!(table.symbol(-2), Some(0));
        assert_eq!(table.symbol(0), Some(2));
        assert_eq!(table.symbol(2), Some(4));
        assert_eq!(table.symbol(3), None);
        assert_eq!(table.symbol(-3), None);
    }

    #[test]
    fn test_table_rejects_short_rows() {
        assert!(ProbabilityTable::new(1, vec![vec![0.5, 0.5]]).is_err());
    }

    #[test]
    fn test_statistics_validation() {
        let mut stats = ChannelStatistics::uncentered(3);
        assert!(stats.validate().is_ok());

        stats.exceptions.pop();
        assert!(matches!(
            stats.validate(),
            Err(SweepError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("channel_statistics.json");
        let stats = ChannelStatistics {
            mean: vec![1.5, -0.25],
            exceptions: vec![false, true],
            laplace_scales: Some(vec![2.0, 0.5]),
            probability_table: None,
        };
        std::fs::write(&path, serde_json::to_vec(&stats).unwrap()).unwrap();

        let loaded = ChannelStatistics::load(&path).unwrap();
        assert_eq!(loaded, stats);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let err = ChannelStatistics::load(&dir.path().join("absent.json")).unwrap_err();
        assert_eq!(err.category(), "missing_artifact");
    }
}
