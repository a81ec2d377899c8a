//! Surface management for windowed rendering.
//!
//! A [`SurfaceContext`] is produced by [`crate::GpuContextBuilder::build_for_window`],
//! which has to create the surface before a physical device can be chosen.
//! [`SurfaceContext::backend`] then exposes it to
//! [`crate::swapchain::SwapchainManager`] through [`VulkanSwapchainBackend`].

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::swapchain::{SwapchainBackend, SwapchainCreateParams};
use ash::prelude::VkResult;
use ash::vk;
use ember_core::{MemoryTag, MemoryTracker, TaggedVec};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;

/// Create a Vulkan surface for a window.
///
/// # Safety
/// The instance must have been created with the extensions returned by
/// [`ash_window::enumerate_required_extensions`] for this window's display.
pub(crate) unsafe fn create_surface<W>(
    entry: &ash::Entry,
    instance: &ash::Instance,
    window: &W,
) -> Result<vk::SurfaceKHR>
where
    W: HasDisplayHandle + HasWindowHandle,
{
    let display = window
        .display_handle()
        .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
    let window_handle = window
        .window_handle()
        .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?;

    unsafe {
        ash_window::create_surface(
            entry,
            instance,
            display.as_raw(),
            window_handle.as_raw(),
            None,
        )
    }
    .map_err(|e| GpuError::SurfaceCreation(e.to_string()))
}

/// Surface handle and the extension loaders that operate on it.
///
/// The surface is destroyed by [`crate::swapchain::SwapchainManager::shutdown`],
/// which must run before the owning [`GpuContext`] is dropped.
pub struct SurfaceContext {
    pub(crate) surface: vk::SurfaceKHR,
    pub(crate) surface_loader: ash::khr::surface::Instance,
    pub(crate) swapchain_loader: ash::khr::swapchain::Device,
}

impl SurfaceContext {
    /// The Vulkan surface handle.
    pub const fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    pub const fn surface_loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }

    pub const fn swapchain_loader(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain_loader
    }

    /// Swapchain backend bound to `gpu`'s device and this surface.
    pub fn backend<'a>(&'a self, gpu: &'a GpuContext) -> VulkanSwapchainBackend<'a> {
        VulkanSwapchainBackend {
            device: gpu.device(),
            physical_device: gpu.physical_device(),
            surface_loader: &self.surface_loader,
            swapchain_loader: &self.swapchain_loader,
            tracker: gpu.memory_tracker(),
        }
    }
}

/// [`SwapchainBackend`] that talks to the driver.
pub struct VulkanSwapchainBackend<'a> {
    device: &'a ash::Device,
    physical_device: vk::PhysicalDevice,
    surface_loader: &'a ash::khr::surface::Instance,
    swapchain_loader: &'a ash::khr::swapchain::Device,
    tracker: &'a Arc<MemoryTracker>,
}

impl SwapchainBackend for VulkanSwapchainBackend<'_> {
    unsafe fn surface_formats(
        &self,
        surface: vk::SurfaceKHR,
    ) -> VkResult<TaggedVec<vk::SurfaceFormatKHR>> {
        let formats = unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(self.physical_device, surface)?
        };
        Ok(TaggedVec::from_vec(MemoryTag::Enumeration, self.tracker, formats))
    }

    unsafe fn surface_capabilities(
        &self,
        surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, surface)
        }
    }

    unsafe fn present_modes(
        &self,
        surface: vk::SurfaceKHR,
    ) -> VkResult<TaggedVec<vk::PresentModeKHR>> {
        let modes = unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(self.physical_device, surface)?
        };
        Ok(TaggedVec::from_vec(MemoryTag::Enumeration, self.tracker, modes))
    }

    unsafe fn create_swapchain(&self, params: &SwapchainCreateParams) -> VkResult<vk::SwapchainKHR> {
        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(params.surface)
            .min_image_count(params.min_image_count)
            .image_format(params.surface_format.format)
            .image_color_space(params.surface_format.color_space)
            .image_extent(params.extent)
            .image_array_layers(1)
            .image_usage(params.image_usage)
            .pre_transform(params.pre_transform)
            .composite_alpha(params.composite_alpha)
            .present_mode(params.present_mode)
            .clipped(true)
            .old_swapchain(params.old_swapchain);

        create_info = match &params.concurrent_families {
            Some(families) => create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(families),
            None => create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE),
        };

        unsafe { self.swapchain_loader.create_swapchain(&create_info, None) }
    }

    unsafe fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }
    }

    unsafe fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) };
    }

    unsafe fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
    ) -> VkResult<vk::ImageView> {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        unsafe { self.device.create_image_view(&create_info, None) }
    }

    unsafe fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) };
    }

    unsafe fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        unsafe {
            self.device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
        }
    }

    unsafe fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    unsafe fn destroy_surface(&self, surface: vk::SurfaceKHR) {
        unsafe { self.surface_loader.destroy_surface(surface, None) };
    }

    unsafe fn wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }

    unsafe fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, timeout_ns, semaphore, vk::Fence::null())
        }
    }

    unsafe fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> VkResult<bool> {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }
}
