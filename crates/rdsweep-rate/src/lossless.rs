//! Exact rate through an entropy coder.

use rdsweep_core::{ChannelStatistics, LatentView, ModelDims, ProbabilityTable, Result, SweepError};
use tracing::debug;

use crate::ans::AnsEntropyCoder;
use crate::estimator::{bits_per_pixel, check_inputs, RateEstimator};

/// Lossless coder of one image's quantized latent.
///
/// Implementations return the exact length in bits of the compressed
/// representation. Channels flagged in `exceptions` are not covered by
/// `table` and go through a fallback code.
pub trait EntropyCoder {
    fn code(
        &self,
        image: LatentView<'_>,
        bin_widths: &[f32],
        table: &ProbabilityTable,
        exceptions: &[bool],
    ) -> Result<u64>;
}

/// Rate from the exact bit count of an [`EntropyCoder`], one image at a time.
#[derive(Debug, Clone, Default)]
pub struct LosslessRate<C = AnsEntropyCoder> {
    coder: C,
}

impl<C: EntropyCoder> LosslessRate<C> {
    pub fn new(coder: C) -> Self {
        Self { coder }
    }

    pub fn coder(&self) -> &C {
        &self.coder
    }
}

impl<C: EntropyCoder> RateEstimator for LosslessRate<C> {
    fn name(&self) -> &'static str {
        "lossless"
    }

    fn estimate(
        &self,
        image: LatentView<'_>,
        bin_widths: &[f32],
        stats: &ChannelStatistics,
        dims: ModelDims,
    ) -> Result<f64> {
        check_inputs(&image, bin_widths, stats, dims)?;
        let table = stats.probability_table.as_ref().ok_or_else(|| {
            SweepError::MissingArtifact("probability table required for lossless rate".into())
        })?;
        if table.channels() != image.channels {
            return Err(SweepError::shape_mismatch(
                "probability table",
                image.channels,
                table.channels(),
            ));
        }

        let bits = self.coder.code(image, bin_widths, table, &stats.exceptions)?;
        debug!(bits, "lossless rate");
        bits_per_pixel(bits as f64, dims)
    }
}
