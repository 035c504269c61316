//! Per-channel uniform quantization of latent tensors.
//!
//! The latent is centered on the per-channel mean, rounded to the nearest
//! multiple of the channel's bin width (ties away from zero) and then moved
//! back onto the mean for the decoder:
//!
//! ```text
//! centered           = latent - mean
//! centered_quantized = round(centered / bin_width) * bin_width
//! off_centered       = centered_quantized + mean
//! ```

use crate::error::{Result, SweepError};
use crate::types::LatentTensor;

/// Output of [`quantize`].
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedLatent {
    /// Quantized latent relative to the channel means. Rate is estimated on this.
    pub centered_quantized: LatentTensor,
    /// Quantized latent with the means added back. The decoder consumes this.
    pub off_centered: LatentTensor,
}

/// Rounds half away from zero.
#[inline]
pub fn round_half_away(value: f32) -> f32 {
    value.round()
}

/// Quantization index of an already quantized value.
#[inline]
pub fn quantization_index(value: f32, bin_width: f32) -> f32 {
    round_half_away(value / bin_width)
}

/// Checks that `bin_widths` are strictly positive and finite.
pub fn validate_bin_widths(bin_widths: &[f32]) -> Result<()> {
    match bin_widths
        .iter()
        .enumerate()
        .find(|(_, w)| !w.is_finite() || **w <= 0.0)
    {
        Some((channel, width)) => Err(SweepError::invalid_config(format!(
            "bin width {width} of channel {channel} is not strictly positive"
        ))),
        None => Ok(()),
    }
}

/// Quantizes `latent` per channel.
///
/// `mean` and `bin_widths` are broadcast over the image and spatial axes.
pub fn quantize(latent: &LatentTensor, mean: &[f32], bin_widths: &[f32]) -> Result<QuantizedLatent> {
    let channels = latent.channels();
    if mean.len() != channels {
        return Err(SweepError::shape_mismatch("channel means", channels, mean.len()));
    }
    if bin_widths.len() != channels {
        return Err(SweepError::shape_mismatch(
            "bin widths",
            channels,
            bin_widths.len(),
        ));
    }
    validate_bin_widths(bin_widths)?;

    let mut centered_quantized = LatentTensor::zeros(latent.shape());
    let mut off_centered = LatentTensor::zeros(latent.shape());

    if channels > 0 {
        let source = latent.as_slice().chunks_exact(channels);
        let centered = centered_quantized.as_mut_slice().chunks_exact_mut(channels);
        let decoded = off_centered.as_mut_slice().chunks_exact_mut(channels);

        for ((values, cq), oc) in source.zip(centered).zip(decoded) {
            for c in 0..channels {
                let width = bin_widths[c];
                let q = quantization_index(values[c] - mean[c], width) * width;
                cq[c] = q;
                oc[c] = q + mean[c];
            }
        }
    }

    Ok(QuantizedLatent {
        centered_quantized,
        off_centered,
    })
}
