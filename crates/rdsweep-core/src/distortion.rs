//! Distortion measurement against reference luminance images.
//!
//! Decoder output is cast to the reference's sample format with the BT.601
//! studio-range transfer (the one used to produce the references): round,
//! then clip to `[16, 235]` scaled to the bit depth. PSNR is always computed
//! against the full representable range `2^depth - 1`.

use crate::error::{Result, SweepError};
use crate::types::{max_sample, FloatPlane, LumaImage, LumaView};

/// Lowest BT.601 studio-range luma code at 8 bits.
pub const STUDIO_BLACK_8BIT: u16 = 16;

/// Highest BT.601 studio-range luma code at 8 bits.
pub const STUDIO_WHITE_8BIT: u16 = 235;

/// Scores reconstructions with PSNR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistortionMeter {
    bit_depth: u8,
}

impl DistortionMeter {
    /// Meter for samples with `bit_depth` bits (8 for the usual test sets).
    pub fn new(bit_depth: u8) -> Self {
        Self { bit_depth }
    }

    pub fn bit_depth(&self) -> u8 {
        self.bit_depth
    }

    /// Full representable sample range.
    pub fn peak(&self) -> f64 {
        f64::from(max_sample(self.bit_depth))
    }

    /// Studio-range clip bounds at this bit depth.
    pub fn studio_range(&self) -> (f32, f32) {
        let (black, white) = if self.bit_depth >= 8 {
            let shift = u32::from(self.bit_depth - 8);
            (
                u32::from(STUDIO_BLACK_8BIT) << shift,
                u32::from(STUDIO_WHITE_8BIT) << shift,
            )
        } else {
            let shift = u32::from(8 - self.bit_depth);
            (
                u32::from(STUDIO_BLACK_8BIT) >> shift,
                u32::from(STUDIO_WHITE_8BIT) >> shift,
            )
        };
        (black as f32, white as f32)
    }

    /// Casts a floating-point reconstruction to discrete samples.
    pub fn cast(&self, reconstruction: FloatPlane<'_>) -> LumaImage {
        let (low, high) = self.studio_range();
        let samples = reconstruction
            .samples
            .iter()
            .map(|&v| {
                // NaN lands on the black level instead of poisoning the cast.
                let v = if v.is_nan() { low } else { v };
                v.round().clamp(low, high) as u16
            })
            .collect();
        LumaImage {
            dims: reconstruction.dims,
            bit_depth: self.bit_depth,
            samples,
        }
    }

    /// PSNR of a floating-point reconstruction after casting.
    pub fn measure(&self, reference: LumaView<'_>, reconstruction: FloatPlane<'_>) -> Result<f64> {
        self.check_depth(reference.bit_depth)?;
        if reference.dims != reconstruction.dims
            || reference.samples.len() != reconstruction.samples.len()
        {
            return Err(SweepError::shape_mismatch(
                "distortion measurement",
                reference.dims,
                reconstruction.dims,
            ));
        }
        let cast = self.cast(reconstruction);
        self.psnr(reference, cast.view())
    }

    /// PSNR between two discrete images of the same shape and bit depth.
    pub fn psnr(&self, reference: LumaView<'_>, reconstruction: LumaView<'_>) -> Result<f64> {
        self.check_depth(reference.bit_depth)?;
        self.check_depth(reconstruction.bit_depth)?;
        if reference.dims != reconstruction.dims
            || reference.samples.len() != reconstruction.samples.len()
        {
            return Err(SweepError::shape_mismatch(
                "distortion measurement",
                reference.dims,
                reconstruction.dims,
            ));
        }
        let mse = mse(reference.samples, reconstruction.samples);
        Ok(psnr_from_mse(mse, self.peak()))
    }

    fn check_depth(&self, bit_depth: u8) -> Result<()> {
        if bit_depth != self.bit_depth {
            return Err(SweepError::shape_mismatch(
                "sample bit depth",
                self.bit_depth,
                bit_depth,
            ));
        }
        Ok(())
    }
}

impl Default for DistortionMeter {
    fn default() -> Self {
        Self::new(8)
    }
}

/// Mean squared error between two sample slices of equal length.
pub fn mse(reference: &[u16], reconstruction: &[u16]) -> f64 {
    if reference.is_empty() {
        return 0.0;
    }
    let sum: f64 = reference
        .iter()
        .zip(reconstruction)
        .map(|(&a, &b)| {
            let d = f64::from(a) - f64::from(b);
            d * d
        })
        .sum();
    sum / reference.len() as f64
}

/// PSNR = 10 * log10(peak² / mse), `+inf` for a perfect reconstruction.
pub fn psnr_from_mse(mse: f64, peak: f64) -> f64 {
    if mse == 0.0 {
        return f64::INFINITY;
    }
    10.0 * (peak * peak / mse).log10()
}
