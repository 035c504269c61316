//! Error types for rate-distortion sweeps.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for sweep operations.
pub type Result<T> = core::result::Result<T, SweepError>;

/// Sweep error types.
#[derive(Debug, Error)]
pub enum SweepError {
    /// Checkpoint artifact is missing or corrupt.
    #[error("failed to load checkpoint {}: {reason}", path.display())]
    ModelLoad { path: PathBuf, reason: String },

    /// Input dimensions disagree with what the receiver was configured for.
    #[error("shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: &'static str,
        expected: String,
        actual: String,
    },

    /// Lossless coding cannot cover a channel.
    #[error("channel {channel} cannot be coded: {reason}")]
    UncodableChannel { channel: usize, reason: String },

    /// A result cell was written twice.
    #[error("result cell [{configuration}][{image}] was already recorded")]
    AggregationConflict { configuration: usize, image: usize },

    /// Baseline codec invocation failed.
    #[error("{tool} failed at point {point}: {message}")]
    ExternalTool {
        tool: String,
        point: i32,
        status: Option<i32>,
        message: String,
    },

    /// Varying-model sweep got lists of different lengths.
    #[error(
        "configuration count mismatch: {checkpoints} checkpoints, {coefficients} scaling coefficients"
    )]
    ConfigurationCountMismatch {
        checkpoints: usize,
        coefficients: usize,
    },

    /// Invalid sweep or evaluation configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A required precomputed artifact is absent.
    #[error("missing artifact: {0}")]
    MissingArtifact(String),

    /// A rate or PSNR value outside its valid domain.
    #[error("invalid measurement: {0}")]
    InvalidMeasurement(String),

    /// I/O error from the underlying filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Artifact (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl SweepError {
    /// Create a checkpoint load error.
    pub fn model_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        SweepError::ModelLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a shape mismatch error.
    pub fn shape_mismatch(
        context: &'static str,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        SweepError::ShapeMismatch {
            context,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create an uncodable channel error.
    pub fn uncodable(channel: usize, reason: impl Into<String>) -> Self {
        SweepError::UncodableChannel {
            channel,
            reason: reason.into(),
        }
    }

    /// Create an external tool error.
    pub fn external_tool(
        tool: impl Into<String>,
        point: i32,
        status: Option<i32>,
        message: impl Into<String>,
    ) -> Self {
        SweepError::ExternalTool {
            tool: tool.into(),
            point,
            status,
            message: message.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        SweepError::InvalidConfiguration(message.into())
    }

    /// Create an I/O error with a custom message.
    pub fn io(message: impl Into<String>) -> Self {
        SweepError::Io(std::io::Error::other(message.into()))
    }

    /// True if the whole sweep must stop rather than skip one configuration.
    pub fn is_sweep_fatal(&self) -> bool {
        matches!(self, SweepError::AggregationConflict { .. })
    }

    /// Get error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            SweepError::ModelLoad { .. } => "model_load",
            SweepError::ShapeMismatch { .. } => "shape_mismatch",
            SweepError::UncodableChannel { .. } => "uncodable_channel",
            SweepError::AggregationConflict { .. } => "aggregation_conflict",
            SweepError::ExternalTool { .. } => "external_tool",
            SweepError::ConfigurationCountMismatch { .. } => "configuration_count_mismatch",
            SweepError::InvalidConfiguration(_) => "invalid_configuration",
            SweepError::MissingArtifact(_) => "missing_artifact",
            SweepError::InvalidMeasurement(_) => "invalid_measurement",
            SweepError::Io(_) => "io_error",
            SweepError::Serialization(_) => "serialization",
        }
    }
}

impl From<serde_json::Error> for SweepError {
    fn from(e: serde_json::Error) -> Self {
        SweepError::Serialization(e.to_string())
    }
}
