//! GPU error types.

use crate::queues::QueuePurpose;
use ash::vk;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// Physical device selection failed.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// A required queue purpose could not be assigned.
    #[error(transparent)]
    QueueFamily(#[from] QueueFamilyError),

    /// Fatal swapchain failure.
    #[error(transparent)]
    Swapchain(#[from] SwapchainError),

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Host-side utility failure.
    #[error(transparent)]
    Core(#[from] ember_core::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// No physical device satisfies the requirements.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The instance reported zero physical devices.
    #[error("No Vulkan physical devices found")]
    NoDevices,

    /// A candidate lacks a required device extension.
    #[error("{device} does not support required extension {extension}")]
    MissingExtension { device: String, extension: String },

    /// A candidate lacks a required feature.
    #[error("{device} does not support required feature {feature}")]
    MissingFeature {
        device: String,
        feature: &'static str,
    },

    /// A candidate cannot serve the required queue purposes.
    #[error("{device}: {source}")]
    Queues {
        device: String,
        source: QueueFamilyError,
    },

    /// Every candidate was rejected.
    #[error("No suitable GPU found ({rejected} candidates rejected)")]
    NoSuitableDevice { rejected: usize },
}

/// Required queue purposes left unassigned after every fallback pass.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("No queue family for required purpose(s): {}", format_purposes(.missing))]
pub struct QueueFamilyError {
    pub missing: Vec<QueuePurpose>,
}

fn format_purposes(purposes: &[QueuePurpose]) -> String {
    purposes
        .iter()
        .map(|p| p.name())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Fatal swapchain failures.
///
/// Out-of-date and suboptimal results are not errors; they are reported
/// through [`crate::swapchain::AcquireOutcome`] and
/// [`crate::swapchain::PresentOutcome`].
#[derive(Error, Debug)]
pub enum SwapchainError {
    /// Querying surface formats, capabilities or present modes failed.
    #[error("Surface query failed: {0}")]
    SurfaceQuery(vk::Result),

    /// The surface reported no formats at all.
    #[error("Surface reports no supported formats")]
    NoSurfaceFormats,

    /// Creating the swapchain or one of its images' views failed.
    #[error("Swapchain creation failed: {0}")]
    Creation(vk::Result),

    /// Acquire or present failed with a non-recoverable result.
    #[error("Swapchain operation failed: {0}")]
    Operation(vk::Result),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_error_names_every_purpose() {
        let err = QueueFamilyError {
            missing: vec![QueuePurpose::Graphics, QueuePurpose::Present],
        };
        assert_eq!(
            err.to_string(),
            "No queue family for required purpose(s): graphics, present"
        );
    }
}
