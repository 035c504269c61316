//! # rdsweep rate
//!
//! Converts a quantized latent into a bit rate. Two strategies share the
//! [`RateEstimator`] trait and are chosen once per configuration:
//!
//! ```text
//!                       ┌──────────────────┐
//!  centered_quantized ─▶│   AnalyticRate   │─▶ Laplace bin bits / (h·w)
//!     + bin_widths      └──────────────────┘
//!     + statistics      ┌──────────────────┐   ┌────────────────┐
//!                    ─▶ │   LosslessRate   │──▶│  EntropyCoder  │─▶ exact bits / (h·w)
//!                       └──────────────────┘   └────────────────┘
//! ```
//!
//! There is no fallback between the two: a lossless failure stays a failure.

pub mod analytic;
pub mod ans;
pub mod estimator;
pub mod lossless;

pub use analytic::{laplace_bin_bits, AnalyticRate, DEFAULT_SCALE_FLOOR};
pub use ans::{exp_golomb_bits, AnsEntropyCoder};
pub use estimator::RateEstimator;
pub use lossless::{EntropyCoder, LosslessRate};

/// Prelude for common imports
pub mod prelude {
    pub use super::{AnalyticRate, AnsEntropyCoder, EntropyCoder, LosslessRate, RateEstimator};
}
