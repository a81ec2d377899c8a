//! Swapchain management.
//!
//! [`SwapchainManager`] owns the presentable image ring for one surface and the
//! per-image views and semaphores that go with it. It moves through
//! `Uninitialized -> Ready -> (OutOfDate <-> Ready) -> Destroyed`; acquire and
//! present report out-of-date surfaces as outcomes, and [`SwapchainManager::recreate`]
//! brings the ring back to `Ready`.
//!
//! All driver calls go through [`SwapchainBackend`], implemented for Vulkan by
//! [`crate::surface::VulkanSwapchainBackend`].

use crate::error::{GpuError, Result, SwapchainError};
use crate::queues::QueueAssignment;
use ash::prelude::VkResult;
use ash::vk;
use ember_core::{MemoryTag, MemoryTracker, TaggedVec};
use std::sync::Arc;

/// Everything needed to create a swapchain handle.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainCreateParams {
    pub surface: vk::SurfaceKHR,
    pub min_image_count: u32,
    pub surface_format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
    pub image_usage: vk::ImageUsageFlags,
    /// Graphics and present families when images are shared concurrently.
    pub concurrent_families: Option<[u32; 2]>,
    pub old_swapchain: vk::SwapchainKHR,
}

/// Driver operations the swapchain manager needs.
pub trait SwapchainBackend {
    unsafe fn surface_formats(
        &self,
        surface: vk::SurfaceKHR,
    ) -> VkResult<TaggedVec<vk::SurfaceFormatKHR>>;

    unsafe fn surface_capabilities(
        &self,
        surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR>;

    unsafe fn present_modes(&self, surface: vk::SurfaceKHR)
        -> VkResult<TaggedVec<vk::PresentModeKHR>>;

    unsafe fn create_swapchain(&self, params: &SwapchainCreateParams) -> VkResult<vk::SwapchainKHR>;

    unsafe fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;

    unsafe fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);

    unsafe fn create_image_view(&self, image: vk::Image, format: vk::Format)
        -> VkResult<vk::ImageView>;

    unsafe fn destroy_image_view(&self, view: vk::ImageView);

    unsafe fn create_semaphore(&self) -> VkResult<vk::Semaphore>;

    unsafe fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    unsafe fn destroy_surface(&self, surface: vk::SurfaceKHR);

    unsafe fn wait_idle(&self) -> VkResult<()>;

    unsafe fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)>;

    unsafe fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> VkResult<bool>;
}

/// Preferences applied during negotiation.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainConfig {
    /// Used when the surface reports it; otherwise the first reported pair wins.
    pub preferred_format: vk::SurfaceFormatKHR,
    /// Used when the surface reports it; otherwise FIFO.
    pub preferred_present_mode: vk::PresentModeKHR,
    pub image_usage: vk::ImageUsageFlags,
}

impl Default for SwapchainConfig {
    fn default() -> Self {
        Self {
            preferred_format: vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            // Unthrottled presentation keeps frame times measurable.
            preferred_present_mode: vk::PresentModeKHR::IMMEDIATE,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
        }
    }
}

impl SwapchainConfig {
    /// Throttle to the display refresh rate.
    pub fn vsync() -> Self {
        Self {
            preferred_present_mode: vk::PresentModeKHR::FIFO,
            ..Self::default()
        }
    }
}

/// Lifecycle state of a [`SwapchainManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainState {
    Uninitialized,
    Ready,
    OutOfDate,
    Destroyed,
}

/// Result of trying to acquire the next image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image was acquired; its acquire semaphore will be signaled.
    Acquired { image_index: u32, suboptimal: bool },
    /// No image became available in time; retry.
    Timeout,
    /// The surface changed; call [`SwapchainManager::recreate`] and retry the frame.
    OutOfDate,
}

/// Result of presenting the current image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Presented, but the swapchain no longer matches the surface exactly.
    Suboptimal,
    OutOfDate,
}

/// Pick the preferred format/color-space pair, else the first reported pair.
pub fn select_surface_format(
    available: &[vk::SurfaceFormatKHR],
    preferred: vk::SurfaceFormatKHR,
) -> std::result::Result<vk::SurfaceFormatKHR, SwapchainError> {
    if available.iter().any(|f| same_format(f, &preferred)) {
        return Ok(preferred);
    }

    let first = available
        .first()
        .copied()
        .ok_or(SwapchainError::NoSurfaceFormats)?;
    tracing::warn!(
        "Preferred surface format {:?} unavailable, using {:?}",
        preferred,
        first
    );
    Ok(first)
}

fn same_format(a: &vk::SurfaceFormatKHR, b: &vk::SurfaceFormatKHR) -> bool {
    a.format == b.format && a.color_space == b.color_space
}

/// Pick the preferred present mode, else FIFO.
pub fn select_present_mode(
    available: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if available.contains(&preferred) {
        preferred
    } else {
        tracing::warn!("Present mode {preferred:?} unavailable, falling back to FIFO");
        vk::PresentModeKHR::FIFO
    }
}

/// Resolve the image extent for the surface.
///
/// A `current_extent` of `u32::MAX` means the surface size is decided by the
/// swapchain, so the requested extent is used. Each axis is then raised to the
/// minimum before being capped to the maximum.
pub fn resolve_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    requested: vk::Extent2D,
) -> vk::Extent2D {
    let base = if capabilities.current_extent.width == u32::MAX {
        requested
    } else {
        capabilities.current_extent
    };

    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: base.width.max(min.width).min(max.width),
        height: base.height.max(min.height).min(max.height),
    }
}

/// One more than the minimum, capped to the maximum when the driver sets one.
pub fn select_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// Identity when supported, else the surface's current transform.
pub fn select_pre_transform(
    capabilities: &vk::SurfaceCapabilitiesKHR,
) -> vk::SurfaceTransformFlagsKHR {
    if capabilities
        .supported_transforms
        .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
    {
        vk::SurfaceTransformFlagsKHR::IDENTITY
    } else {
        capabilities.current_transform
    }
}

/// First supported of opaque, inherit, pre-multiplied, post-multiplied.
pub fn select_composite_alpha(
    capabilities: &vk::SurfaceCapabilitiesKHR,
) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::INHERIT,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|&mode| capabilities.supported_composite_alpha.contains(mode))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

/// Presentable image ring for one surface.
pub struct SwapchainManager {
    config: SwapchainConfig,
    tracker: Arc<MemoryTracker>,
    state: SwapchainState,
    surface: vk::SurfaceKHR,
    swapchain: vk::SwapchainKHR,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent3D,
    requested_extent: vk::Extent2D,
    concurrent_families: Option<[u32; 2]>,
    image_count: u32,
    images: TaggedVec<vk::Image>,
    image_views: TaggedVec<vk::ImageView>,
    acquire_semaphores: TaggedVec<vk::Semaphore>,
    present_semaphores: TaggedVec<vk::Semaphore>,
    image_index: u32,
    frame_index: u32,
    suboptimal: bool,
    // An acquired image that has not been handed back through present.
    pending_present: bool,
}

impl SwapchainManager {
    /// Create an uninitialized manager.
    pub fn new(config: SwapchainConfig, tracker: &Arc<MemoryTracker>) -> Self {
        Self {
            config,
            tracker: Arc::clone(tracker),
            state: SwapchainState::Uninitialized,
            surface: vk::SurfaceKHR::null(),
            swapchain: vk::SwapchainKHR::null(),
            format: vk::SurfaceFormatKHR::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            extent: vk::Extent3D::default(),
            requested_extent: vk::Extent2D::default(),
            concurrent_families: None,
            image_count: 0,
            images: TaggedVec::tracked(MemoryTag::Swapchain, tracker),
            image_views: TaggedVec::tracked(MemoryTag::Swapchain, tracker),
            acquire_semaphores: TaggedVec::tracked(MemoryTag::Swapchain, tracker),
            present_semaphores: TaggedVec::tracked(MemoryTag::Swapchain, tracker),
            image_index: 0,
            frame_index: 0,
            suboptimal: false,
            pending_present: false,
        }
    }

    /// Negotiate and create the swapchain, its views and its semaphores.
    ///
    /// # Safety
    /// The backend and surface must be valid and the surface must not already
    /// have a swapchain.
    pub unsafe fn initialize<B: SwapchainBackend>(
        &mut self,
        backend: &B,
        surface: vk::SurfaceKHR,
        requested_extent: vk::Extent2D,
        queues: &QueueAssignment,
    ) -> Result<()> {
        if self.state != SwapchainState::Uninitialized {
            return Err(GpuError::InvalidState(format!(
                "Swapchain initialize called in state {:?}",
                self.state
            )));
        }

        self.surface = surface;
        self.requested_extent = requested_extent;
        self.concurrent_families = queues.concurrent_present_families();

        let created = unsafe { self.create_handle(backend, vk::SwapchainKHR::null()) };
        self.swapchain = match created {
            Ok(swapchain) => swapchain,
            Err(e) => {
                self.surface = vk::SurfaceKHR::null();
                return Err(e);
            }
        };

        if let Err(e) = unsafe { self.build_image_resources(backend) } {
            // Nothing created here may outlive a failed initialize; the
            // manager stays Uninitialized and shutdown would skip it.
            unsafe { self.release_image_resources(backend) };
            self.surface = vk::SurfaceKHR::null();
            return Err(e);
        }

        self.image_index = 0;
        self.frame_index = 0;
        self.state = SwapchainState::Ready;
        tracing::info!(
            "Swapchain created: {}x{}, {} images, {:?}, {:?}",
            self.extent.width,
            self.extent.height,
            self.image_count,
            self.format.format,
            self.present_mode,
        );
        Ok(())
    }

    unsafe fn build_image_resources<B: SwapchainBackend>(&mut self, backend: &B) -> Result<()> {
        let images = unsafe { backend.swapchain_images(self.swapchain) }
            .map_err(SwapchainError::Creation)?;
        self.image_count = images.len() as u32;
        self.images = TaggedVec::from_vec(MemoryTag::Swapchain, &self.tracker, images);
        self.image_views = TaggedVec::with_capacity(
            MemoryTag::Swapchain,
            &self.tracker,
            self.images.len(),
        );
        self.image_views
            .resize(self.images.len(), vk::ImageView::null());
        unsafe { self.rebuild_views(backend)? };

        unsafe {
            resize_semaphores(backend, &mut self.acquire_semaphores, self.images.len())?;
            resize_semaphores(backend, &mut self.present_semaphores, self.images.len())?;
        }
        Ok(())
    }

    /// Destroy views, semaphores and the swapchain; the surface is untouched.
    unsafe fn release_image_resources<B: SwapchainBackend>(&mut self, backend: &B) {
        unsafe {
            self.destroy_views(backend);
            for semaphore in self.acquire_semaphores.drain() {
                backend.destroy_semaphore(semaphore);
            }
            for semaphore in self.present_semaphores.drain() {
                backend.destroy_semaphore(semaphore);
            }
            if self.swapchain != vk::SwapchainKHR::null() {
                backend.destroy_swapchain(self.swapchain);
            }
        }

        self.images.clear();
        self.image_views.clear();
        self.image_count = 0;
        self.swapchain = vk::SwapchainKHR::null();
        self.pending_present = false;
    }

    /// Record a new window size; the next frame must recreate.
    ///
    /// An image acquired before the resize can still be presented.
    pub fn notify_resized(&mut self, extent: vk::Extent2D) {
        self.requested_extent = extent;
        if self.state == SwapchainState::Ready {
            self.state = SwapchainState::OutOfDate;
        }
    }

    /// Rebuild the swapchain for the surface's current properties.
    ///
    /// Waits for the device to go idle before touching anything, so no
    /// in-flight frame can still reference the old images.
    ///
    /// # Safety
    /// The backend must be the one used for [`Self::initialize`].
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub unsafe fn recreate<B: SwapchainBackend>(&mut self, backend: &B) -> Result<()> {
        if !matches!(
            self.state,
            SwapchainState::Ready | SwapchainState::OutOfDate
        ) {
            return Err(GpuError::InvalidState(format!(
                "Swapchain recreate called in state {:?}",
                self.state
            )));
        }

        unsafe { backend.wait_idle()? };
        self.state = SwapchainState::OutOfDate;

        unsafe { self.destroy_views(backend) };

        let old_swapchain = self.swapchain;
        let old_count = self.image_count;

        self.pending_present = false;

        let new_swapchain = match unsafe { self.create_handle(backend, old_swapchain) } {
            Ok(swapchain) => swapchain,
            Err(e) => {
                // The old handle is retired even when creation fails and must
                // not be passed as oldSwapchain again.
                if old_swapchain != vk::SwapchainKHR::null() {
                    unsafe { backend.destroy_swapchain(old_swapchain) };
                }
                self.swapchain = vk::SwapchainKHR::null();
                return Err(e);
            }
        };
        if old_swapchain != vk::SwapchainKHR::null() {
            unsafe { backend.destroy_swapchain(old_swapchain) };
        }
        self.swapchain = new_swapchain;

        let images = unsafe { backend.swapchain_images(self.swapchain) }
            .map_err(SwapchainError::Creation)?;
        let new_count = images.len() as u32;

        if new_count == old_count {
            self.images.copy_from_slice(&images);
        } else {
            tracing::debug!("Swapchain image count changed: {old_count} -> {new_count}");
            self.images = TaggedVec::from_vec(MemoryTag::Swapchain, &self.tracker, images);
            self.image_views =
                TaggedVec::with_capacity(MemoryTag::Swapchain, &self.tracker, new_count as usize);
            self.image_views
                .resize(new_count as usize, vk::ImageView::null());
            unsafe {
                resize_semaphores(backend, &mut self.acquire_semaphores, new_count as usize)?;
                resize_semaphores(backend, &mut self.present_semaphores, new_count as usize)?;
            }
        }
        self.image_count = new_count;

        unsafe { self.rebuild_views(backend)? };

        self.frame_index %= self.image_count.max(1);
        self.image_index = 0;
        self.suboptimal = false;
        self.state = SwapchainState::Ready;
        tracing::info!(
            "Swapchain recreated: {}x{}, {} images",
            self.extent.width,
            self.extent.height,
            self.image_count,
        );
        Ok(())
    }

    /// Acquire the next image, signaling the current frame's acquire semaphore.
    ///
    /// # Safety
    /// The backend must be the one used for [`Self::initialize`].
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub unsafe fn acquire_next_image<B: SwapchainBackend>(
        &mut self,
        backend: &B,
        timeout_ns: u64,
    ) -> Result<AcquireOutcome> {
        match self.state {
            SwapchainState::Ready => {}
            SwapchainState::OutOfDate => return Ok(AcquireOutcome::OutOfDate),
            state => {
                return Err(GpuError::InvalidState(format!(
                    "Cannot acquire from swapchain in state {state:?}"
                )))
            }
        }

        let semaphore = self.current_acquire_semaphore();
        let result = unsafe { backend.acquire_next_image(self.swapchain, timeout_ns, semaphore) };

        match result {
            Ok((image_index, suboptimal)) => {
                self.image_index = image_index;
                self.suboptimal |= suboptimal;
                self.pending_present = true;
                Ok(AcquireOutcome::Acquired {
                    image_index,
                    suboptimal,
                })
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.state = SwapchainState::OutOfDate;
                Ok(AcquireOutcome::OutOfDate)
            }
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => Ok(AcquireOutcome::Timeout),
            Err(e) => Err(SwapchainError::Operation(e).into()),
        }
    }

    /// Present the acquired image once the current present semaphore signals,
    /// then advance to the next frame slot.
    ///
    /// If the swapchain went out of date after the image was acquired (for
    /// example through [`Self::notify_resized`]) the image is still presented
    /// and [`PresentOutcome::OutOfDate`] is returned.
    ///
    /// # Safety
    /// `queue` must be a present-capable queue of the backend's device.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub unsafe fn present<B: SwapchainBackend>(
        &mut self,
        backend: &B,
        queue: vk::Queue,
    ) -> Result<PresentOutcome> {
        let stale = match self.state {
            SwapchainState::Ready => false,
            SwapchainState::OutOfDate if self.pending_present => true,
            state => {
                return Err(GpuError::InvalidState(format!(
                    "Cannot present to swapchain in state {state:?}"
                )))
            }
        };

        let semaphore = self.current_present_semaphore();
        let result =
            unsafe { backend.queue_present(queue, self.swapchain, self.image_index, semaphore) };
        self.pending_present = false;

        let outcome = match result {
            Ok(_) if stale => PresentOutcome::OutOfDate,
            Ok(suboptimal) if suboptimal || self.suboptimal => {
                self.state = SwapchainState::OutOfDate;
                PresentOutcome::Suboptimal
            }
            Ok(_) => PresentOutcome::Presented,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.state = SwapchainState::OutOfDate;
                PresentOutcome::OutOfDate
            }
            Err(e) => return Err(SwapchainError::Operation(e).into()),
        };

        self.frame_index = (self.frame_index + 1) % self.image_count.max(1);
        Ok(outcome)
    }

    /// Destroy views, semaphores, the swapchain and the surface, in that order.
    ///
    /// Calling this more than once is a no-op.
    ///
    /// # Safety
    /// The backend must be the one used for [`Self::initialize`].
    pub unsafe fn shutdown<B: SwapchainBackend>(&mut self, backend: &B) {
        if matches!(
            self.state,
            SwapchainState::Uninitialized | SwapchainState::Destroyed
        ) {
            return;
        }

        if let Err(e) = unsafe { backend.wait_idle() } {
            tracing::warn!("Device wait before swapchain shutdown failed: {e}");
        }

        unsafe {
            self.release_image_resources(backend);
            backend.destroy_surface(self.surface);
        }

        self.surface = vk::SurfaceKHR::null();
        self.state = SwapchainState::Destroyed;
    }

    /// Steps 1 to 6 of negotiation: query, choose, create.
    unsafe fn create_handle<B: SwapchainBackend>(
        &mut self,
        backend: &B,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<vk::SwapchainKHR> {
        let formats =
            unsafe { backend.surface_formats(self.surface) }.map_err(SwapchainError::SurfaceQuery)?;
        let format = select_surface_format(&formats, self.config.preferred_format)?;

        let capabilities = unsafe { backend.surface_capabilities(self.surface) }
            .map_err(SwapchainError::SurfaceQuery)?;
        let extent = resolve_extent(&capabilities, self.requested_extent);

        let modes =
            unsafe { backend.present_modes(self.surface) }.map_err(SwapchainError::SurfaceQuery)?;
        let present_mode = select_present_mode(&modes, self.config.preferred_present_mode);

        let params = SwapchainCreateParams {
            surface: self.surface,
            min_image_count: select_image_count(&capabilities),
            surface_format: format,
            extent,
            present_mode,
            pre_transform: select_pre_transform(&capabilities),
            composite_alpha: select_composite_alpha(&capabilities),
            image_usage: self.config.image_usage,
            concurrent_families: self.concurrent_families,
            old_swapchain,
        };

        let swapchain =
            unsafe { backend.create_swapchain(&params) }.map_err(SwapchainError::Creation)?;

        self.format = format;
        self.present_mode = present_mode;
        self.extent = vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        };
        Ok(swapchain)
    }

    unsafe fn rebuild_views<B: SwapchainBackend>(&mut self, backend: &B) -> Result<()> {
        for (view, &image) in self.image_views.iter_mut().zip(self.images.iter()) {
            *view = unsafe { backend.create_image_view(image, self.format.format) }
                .map_err(SwapchainError::Creation)?;
        }
        Ok(())
    }

    unsafe fn destroy_views<B: SwapchainBackend>(&mut self, backend: &B) {
        for view in self.image_views.iter_mut() {
            if *view != vk::ImageView::null() {
                unsafe { backend.destroy_image_view(*view) };
                *view = vk::ImageView::null();
            }
        }
    }

    /// Lifecycle state.
    pub const fn state(&self) -> SwapchainState {
        self.state
    }

    /// Raw swapchain handle.
    pub const fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Negotiated format and color space.
    pub const fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Negotiated present mode.
    pub const fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Image extent; depth is always 1.
    pub const fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    /// Number of images the driver returned.
    pub const fn image_count(&self) -> u32 {
        self.image_count
    }

    /// Index of the most recently acquired image.
    pub const fn image_index(&self) -> u32 {
        self.image_index
    }

    /// Frame slot selecting the semaphore pair, in `0..image_count`.
    pub const fn frame_index(&self) -> u32 {
        self.frame_index
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    pub fn acquire_semaphores(&self) -> &[vk::Semaphore] {
        &self.acquire_semaphores
    }

    pub fn present_semaphores(&self) -> &[vk::Semaphore] {
        &self.present_semaphores
    }

    /// Semaphore the current frame's acquire signals.
    pub fn current_acquire_semaphore(&self) -> vk::Semaphore {
        self.acquire_semaphores
            .get(self.frame_index as usize)
            .copied()
            .unwrap_or_default()
    }

    /// Semaphore the current frame's submission must signal before present.
    pub fn current_present_semaphore(&self) -> vk::Semaphore {
        self.present_semaphores
            .get(self.frame_index as usize)
            .copied()
            .unwrap_or_default()
    }

    /// Image and view targeted by the current frame.
    pub fn current_target(&self) -> Option<(vk::Image, vk::ImageView)> {
        let index = self.image_index as usize;
        Some((*self.images.get(index)?, *self.image_views.get(index)?))
    }
}

/// Grow or shrink a semaphore array, keeping existing semaphores where possible.
unsafe fn resize_semaphores<B: SwapchainBackend>(
    backend: &B,
    semaphores: &mut TaggedVec<vk::Semaphore>,
    len: usize,
) -> Result<()> {
    while semaphores.len() > len {
        if let Some(semaphore) = semaphores.pop() {
            unsafe { backend.destroy_semaphore(semaphore) };
        }
    }
    while semaphores.len() < len {
        semaphores.push(unsafe { backend.create_semaphore()? });
    }
    Ok(())
}
