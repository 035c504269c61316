//! Closed-form rate estimate under a per-channel Laplace model.
//!
//! Each channel of the centered quantized latent is modelled as a zero-mean
//! Laplace distribution with scale `λ`. A quantized value `q` with bin width
//! `b` costs the self-information of its bin:
//!
//! ```text
//! bits(q) = -log2 P(|q| - b/2 <= X <= |q| + b/2),   X ~ Laplace(0, λ)
//! ```
//!
//! The probability is evaluated in the log domain, so values far in the tail
//! produce large but finite costs instead of `log2(0)`.

use std::f64::consts::LN_2;

use rdsweep_core::{ChannelStatistics, LatentView, ModelDims, Result};
use tracing::trace;

use crate::estimator::{bits_per_pixel, check_inputs, RateEstimator};

/// Smallest Laplace scale used when fitting a channel from its values.
pub const DEFAULT_SCALE_FLOOR: f64 = 1e-3;

const LN_HALF: f64 = -LN_2;

/// Analytic bits-per-pixel estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyticRate {
    scale_floor: f64,
}

impl AnalyticRate {
    /// Estimator with [`DEFAULT_SCALE_FLOOR`].
    pub fn new() -> Self {
        Self {
            scale_floor: DEFAULT_SCALE_FLOOR,
        }
    }

    /// Estimator with a custom scale floor. Non-positive or non-finite
    /// floors fall back to the default.
    pub fn with_scale_floor(scale_floor: f64) -> Self {
        let scale_floor = if scale_floor.is_finite() && scale_floor > 0.0 {
            scale_floor
        } else {
            DEFAULT_SCALE_FLOOR
        };
        Self { scale_floor }
    }

    pub fn scale_floor(&self) -> f64 {
        self.scale_floor
    }

    /// Laplace scale of every channel: persisted when available, else the
    /// mean absolute value of the channel in this image.
    fn scales(&self, image: &LatentView<'_>, stats: &ChannelStatistics) -> Vec<f64> {
        if let Some(persisted) = &stats.laplace_scales {
            return persisted
                .iter()
                .map(|&s| f64::from(s).max(self.scale_floor))
                .collect();
        }

        let mut sums = vec![0.0f64; image.channels];
        if image.channels > 0 {
            for values in image.data.chunks_exact(image.channels) {
                for (sum, &v) in sums.iter_mut().zip(values) {
                    *sum += f64::from(v).abs();
                }
            }
        }
        let count = (image.rows * image.cols).max(1) as f64;
        sums.into_iter()
            .map(|sum| (sum / count).max(self.scale_floor))
            .collect()
    }
}

impl Default for AnalyticRate {
    fn default() -> Self {
        Self::new()
    }
}

impl RateEstimator for AnalyticRate {
    fn name(&self) -> &'static str {
        "analytic"
    }

    fn estimate(
        &self,
        image: LatentView<'_>,
        bin_widths: &[f32],
        stats: &ChannelStatistics,
        dims: ModelDims,
    ) -> Result<f64> {
        check_inputs(&image, bin_widths, stats, dims)?;
        let scales = self.scales(&image, stats);

        let mut bits = 0.0f64;
        if image.channels > 0 {
            for values in image.data.chunks_exact(image.channels) {
                for ((&v, &width), &scale) in values.iter().zip(bin_widths).zip(&scales) {
                    bits += laplace_bin_bits(f64::from(v), f64::from(width), scale);
                }
            }
        }

        trace!(bits, scale_floor = self.scale_floor, "analytic rate");
        bits_per_pixel(bits, dims)
    }
}

/// Self-information in bits of the bin of width `bin_width` centered on
/// `value`, under a zero-mean Laplace distribution with `scale`.
///
/// Non-increasing in `bin_width` and never negative.
pub fn laplace_bin_bits(value: f64, bin_width: f64, scale: f64) -> f64 {
    let magnitude = value.abs();
    let half = 0.5 * bin_width;
    let low = magnitude - half;

    let ln_p = if low >= 0.0 {
        // Bin entirely on one side of zero:
        // P = 0.5 * exp(-low/λ) * (1 - exp(-b/λ))
        LN_HALF - low / scale + (-(-bin_width / scale).exp_m1()).ln()
    } else {
        // Bin straddles zero.
        let high = magnitude + half;
        let p = 1.0 - 0.5 * (-high / scale).exp() - 0.5 * (low / scale).exp();
        p.max(f64::MIN_POSITIVE).ln()
    };

    (-ln_p / LN_2).max(0.0)
}
