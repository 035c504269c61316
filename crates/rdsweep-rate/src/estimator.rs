//! The rate estimation capability.

use rdsweep_core::{ChannelStatistics, LatentView, ModelDims, Result, SweepError};

/// Estimates the coding cost of one image's quantized latent.
pub trait RateEstimator {
    /// Short name used in log fields.
    fn name(&self) -> &'static str;

    /// Bits per pixel of `image`, the centered quantized latent of a single
    /// image, for an input image of size `dims`.
    fn estimate(
        &self,
        image: LatentView<'_>,
        bin_widths: &[f32],
        stats: &ChannelStatistics,
        dims: ModelDims,
    ) -> Result<f64>;
}

/// Checks the per-channel inputs agree with the latent before any work.
pub(crate) fn check_inputs(
    image: &LatentView<'_>,
    bin_widths: &[f32],
    stats: &ChannelStatistics,
    dims: ModelDims,
) -> Result<()> {
    if bin_widths.len() != image.channels {
        return Err(SweepError::shape_mismatch(
            "bin widths",
            image.channels,
            bin_widths.len(),
        ));
    }
    stats.ensure_channels(image.channels)?;
    rdsweep_core::quantize::validate_bin_widths(bin_widths)?;
    if dims.pixels() == 0 {
        return Err(SweepError::shape_mismatch("image size", "non-empty", dims));
    }
    Ok(())
}

/// Final bits-per-pixel conversion shared by both strategies.
pub(crate) fn bits_per_pixel(bits: f64, dims: ModelDims) -> Result<f64> {
    let rate = bits / dims.pixels() as f64;
    if !rate.is_finite() || rate < 0.0 {
        return Err(SweepError::InvalidMeasurement(format!(
            "rate estimate {rate} for a {dims} image"
        )));
    }
    Ok(rate)
}
