//! # rdsweep core
//!
//! Shared types, error taxonomy and the two deterministic building blocks of
//! a rate-distortion sweep: the per-channel [`quantize`]r and the
//! [`DistortionMeter`].
//!
//! ## Data flow
//!
//! ```text
//! LuminanceImageSet ──encoder──▶ LatentTensor ──quantize──▶ QuantizedLatent
//!                                                   │              │
//!                                     centered_quantized     off_centered
//!                                                   │              │
//!                                              rate model       decoder
//!                                                                  │
//!                                        DistortionMeter ◀── Reconstruction
//! ```
//!
//! Channel statistics (means, exception flags, probability tables) are
//! produced offline and only read here.

pub mod distortion;
pub mod error;
pub mod quantize;
pub mod stats;
pub mod transform;
pub mod types;

pub use distortion::DistortionMeter;
pub use error::{Result, SweepError};
pub use quantize::{quantize, QuantizedLatent};
pub use stats::{ChannelStatistics, ProbabilityTable};
pub use types::{
    FloatPlane, LatentShape, LatentTensor, LatentView, LumaImage, LumaView, LuminanceImageSet,
    ModelDims, RateDistortionPoint, Reconstruction,
};

/// Prelude for common imports
pub mod prelude {
    pub use super::{
        quantize, ChannelStatistics, DistortionMeter, LatentTensor, LuminanceImageSet, ModelDims,
        Result, SweepError,
    };
}
