//! Vulkan device and resource lifecycle for the Ember renderer.
//!
//! This crate provides:
//! - Queue family assignment and per-family queue planning
//! - Physical device selection against explicit requirements
//! - Logical device creation and queue retrieval
//! - Swapchain negotiation, recreation and the acquire/present protocol
//! - A growable descriptor set allocator
//! - Buffer allocation via gpu-allocator and one-shot uploads

pub mod capabilities;
pub mod command;
pub mod context;
pub mod descriptors;
pub mod device;
pub mod error;
pub mod instance;
pub mod memory;
pub mod queues;
pub mod requirements;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use capabilities::{DeviceFeatures, GpuVendor, PhysicalDeviceCapabilities};
pub use command::{CommandPool, ImmediateSubmit};
pub use context::{GpuContext, GpuContextBuilder};
pub use descriptors::{
    DescriptorAllocatorConfig, DescriptorBackend, DescriptorPool, DescriptorSetLayoutBuilder,
    GrowableDescriptorAllocator, PoolSizeRatio,
};
pub use device::{DeviceQueues, LogicalDevice};
pub use error::{DeviceError, GpuError, QueueFamilyError, Result, SwapchainError};
pub use instance::{check_candidate, select_physical_device};
pub use memory::{GpuAllocator, GpuBuffer};
pub use queues::{
    assign_queue_families, plan_queue_fetches, plan_queue_requests, QueueAssignment,
    QueueFamilyRequest, QueuePurpose, QueuePurposes, QueueRequirements,
};
pub use requirements::{DeviceRequirements, SelectionPolicy};
pub use surface::{SurfaceContext, VulkanSwapchainBackend};
pub use swapchain::{
    AcquireOutcome, PresentOutcome, SwapchainBackend, SwapchainConfig, SwapchainManager,
    SwapchainState,
};
