//! Error types for the core utilities.

use thiserror::Error;

/// Core error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Scalar count is not a multiple of the target vector's lane count.
    #[error("Cannot split {len} scalars into vectors of {lanes} lanes")]
    InvalidLength { len: usize, lanes: usize },

    /// Target type's size does not match its declared lane count.
    #[error("Layout mismatch: {type_name} is {size} bytes but declares {lanes} f32 lanes")]
    LayoutMismatch {
        type_name: &'static str,
        size: usize,
        lanes: usize,
    },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
