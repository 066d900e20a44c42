use thiserror::Error;

/// The error type for `ScaleFormer` operations.
///
/// Construction-time contract violations (channel schedule, path and head
/// divisibility, window sizes) and forward-time input shape violations are
/// reported here instead of surfacing as tensor-engine panics.
#[derive(Error, Debug)]
pub enum ScaleFormerError {
    /// Error for when an invalid model configuration is provided.
    /// This can happen if configuration parameters are logically inconsistent.
    #[error("Invalid model configuration: {reason}")]
    InvalidConfiguration {
        /// The reason why the configuration is invalid.
        reason: String,
    },

    /// Error for when an input tensor has an invalid shape.
    #[error("Invalid input tensor shape: expected {expected}, got {actual}")]
    InvalidTensorShape {
        /// The expected tensor shape.
        expected: String,
        /// The actual tensor shape.
        actual: String,
    },

    /// Error for when the spatial attention gate is given an unsupported kernel.
    #[error("Unsupported spatial attention kernel size: {kernel_size} (expected 3 or 7)")]
    UnsupportedKernelSize {
        /// The rejected kernel size.
        kernel_size: usize,
    },

    /// Error for when loading model weights fails.
    #[error("Failed to load weights: {reason}")]
    WeightLoadingFailed {
        /// The reason for the weight loading failure.
        reason: String,
    },

    /// Error for when saving model weights fails.
    #[error("Failed to save weights: {reason}")]
    WeightSavingFailed {
        /// The reason for the weight saving failure.
        reason: String,
    },
}

/// A specialized `Result` type for `ScaleFormer` operations.
pub type ScaleFormerResult<T> = Result<T, ScaleFormerError>;
