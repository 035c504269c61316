//! Persistence of result matrices.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use rdsweep_core::{Result, SweepError};

use crate::aggregate::{ResultAggregator, ResultMatrix};

/// Writes `rate_<family>.json` and `psnr_<family>.json` into a directory.
#[derive(Debug, Clone)]
pub struct MatrixStore {
    dir: PathBuf,
}

impl MatrixStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn rate_path(&self, family: &str) -> PathBuf {
        self.dir.join(format!("rate_{family}.json"))
    }

    pub fn psnr_path(&self, family: &str) -> PathBuf {
        self.dir.join(format!("psnr_{family}.json"))
    }

    /// Saves both matrices of `family`.
    pub fn save(&self, family: &str, aggregator: &ResultAggregator) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        write_json(&self.rate_path(family), aggregator.rate())?;
        write_json(&self.psnr_path(family), aggregator.psnr())?;
        debug!(family, dir = %self.dir.display(), "result matrices saved");
        Ok(())
    }

    /// Loads `(rate, psnr)` of `family`.
    pub fn load(&self, family: &str) -> Result<(ResultMatrix, ResultMatrix)> {
        let rate: ResultMatrix = read_json(&self.rate_path(family))?;
        let psnr: ResultMatrix = read_json(&self.psnr_path(family))?;
        if rate.shape() != psnr.shape() {
            return Err(SweepError::shape_mismatch(
                "stored psnr matrix",
                format!("{:?}", rate.shape()),
                format!("{:?}", psnr.shape()),
            ));
        }
        Ok((rate, psnr))
    }
}

/// Writes `value` via a temp file and an atomic rename.
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let temp_path = path.with_extension("tmp");

    let file = File::create(&temp_path)
        .map_err(|e| SweepError::io(format!("failed to create {}: {}", temp_path.display(), e)))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer
        .flush()
        .map_err(|e| SweepError::io(format!("failed to flush {}: {}", temp_path.display(), e)))?;

    fs::rename(&temp_path, path)
        .map_err(|e| SweepError::io(format!("failed to rename {}: {}", path.display(), e)))?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| {
        SweepError::MissingArtifact(format!("result matrix {}: {}", path.display(), e))
    })?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}
