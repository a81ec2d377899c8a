//! GPU context management.
//!
//! [`GpuContext`] is the explicit owner of the instance, the chosen device and
//! its allocator. It is passed by reference to everything that needs a device;
//! nothing in this crate keeps global state.

use crate::capabilities::PhysicalDeviceCapabilities;
use crate::device::LogicalDevice;
use crate::error::{GpuError, Result};
use crate::instance::{create_instance, enumerate_candidates, select_physical_device};
use crate::memory::GpuAllocator;
use crate::queues::{QueueAssignment, QueuePurpose};
use crate::requirements::DeviceRequirements;
use crate::surface::{create_surface, SurfaceContext};
use ash::vk;
use ember_core::MemoryTracker;
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::c_char;
use std::sync::Arc;

/// Main GPU context holding Vulkan resources.
///
/// Dropping it waits for the device, shuts the allocator down and destroys the
/// device and instance. Any [`SurfaceContext`] created alongside it must be
/// shut down first.
pub struct GpuContext {
    // Keeps the loader library alive.
    #[allow(dead_code)]
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device_summary: String,
    pub(crate) memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub(crate) device: LogicalDevice,
    pub(crate) allocator: Mutex<GpuAllocator>,
    pub(crate) tracker: Arc<MemoryTracker>,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    pub const fn device(&self) -> &ash::Device {
        self.device.raw()
    }

    /// The logical device with its queue assignment and queues.
    pub const fn logical_device(&self) -> &LogicalDevice {
        &self.device
    }

    pub const fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get the Vulkan instance handle.
    pub const fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// One-line description of the selected GPU.
    pub fn device_summary(&self) -> &str {
        &self.device_summary
    }

    pub const fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// Queue family assignment the device was created with.
    pub const fn queue_assignment(&self) -> &QueueAssignment {
        self.device.assignment()
    }

    /// Queue for `purpose`.
    pub fn queue(&self, purpose: QueuePurpose) -> Result<vk::Queue> {
        self.device.queue(purpose)
    }

    /// Queue family index for `purpose`.
    pub fn queue_family(&self, purpose: QueuePurpose) -> Result<u32> {
        self.device.queue_family(purpose)
    }

    /// Get access to the GPU allocator.
    pub const fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    /// Tracker for host-side tagged allocations made by this context.
    pub const fn memory_tracker(&self) -> &Arc<MemoryTracker> {
        &self.tracker
    }

    /// Wait for device to be idle.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.raw().device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.raw().device_wait_idle();

            // Allocator memory must be released before the device goes away.
            self.allocator.lock().shutdown();

            self.device.destroy();
            self.instance.destroy_instance(None);
        }
        self.tracker.log_summary();
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
    requirements: Option<DeviceRequirements>,
    tracker: Option<Arc<MemoryTracker>>,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "Ember".to_string(),
            enable_validation: cfg!(debug_assertions),
            requirements: None,
            tracker: None,
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Override the device requirements.
    ///
    /// Defaults to [`DeviceRequirements::headless`] for [`Self::build`] and
    /// [`DeviceRequirements::default`] for [`Self::build_for_window`].
    pub fn requirements(mut self, requirements: DeviceRequirements) -> Self {
        self.requirements = Some(requirements);
        self
    }

    /// Report tagged allocations to an existing tracker.
    pub fn memory_tracker(mut self, tracker: &Arc<MemoryTracker>) -> Self {
        self.tracker = Some(Arc::clone(tracker));
        self
    }

    /// Build a context without a presentation surface.
    pub fn build(self) -> Result<GpuContext> {
        let requirements = self
            .requirements
            .clone()
            .unwrap_or_else(DeviceRequirements::headless);
        if requirements.needs_present() {
            return Err(GpuError::InvalidState(
                "Presentation requires build_for_window".to_string(),
            ));
        }

        let tracker = self.tracker.clone().unwrap_or_else(MemoryTracker::shared);
        let entry = load_entry()?;
        let instance =
            unsafe { create_instance(&entry, &self.app_name, self.enable_validation, &[])? };

        let opened = unsafe { enumerate_candidates(&instance, None, &tracker) }.and_then(
            |candidates| unsafe { open_device(&instance, &candidates, &requirements, &tracker) },
        );
        match opened {
            Ok(opened) => Ok(opened.into_context(entry, instance, tracker)),
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                Err(e)
            }
        }
    }

    /// Build a context that can present to `window`.
    ///
    /// The surface is created first so that presentation support can take part
    /// in device selection.
    pub fn build_for_window<W>(self, window: &W) -> Result<(GpuContext, SurfaceContext)>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let requirements = self.requirements.clone().unwrap_or_default();
        let tracker = self.tracker.clone().unwrap_or_else(MemoryTracker::shared);
        let entry = load_entry()?;

        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
        let surface_extensions: &[*const c_char] =
            ash_window::enumerate_required_extensions(display.as_raw())
                .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;

        let instance = unsafe {
            create_instance(
                &entry,
                &self.app_name,
                self.enable_validation,
                surface_extensions,
            )?
        };

        let surface = match unsafe { create_surface(&entry, &instance, window) } {
            Ok(surface) => surface,
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                return Err(e);
            }
        };
        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

        let opened = unsafe {
            enumerate_candidates(&instance, Some((&surface_loader, surface)), &tracker)
        }
        .and_then(|candidates| unsafe {
            open_device(&instance, &candidates, &requirements, &tracker)
        });
        let opened = match opened {
            Ok(opened) => opened,
            Err(e) => {
                unsafe {
                    surface_loader.destroy_surface(surface, None);
                    instance.destroy_instance(None);
                }
                return Err(e);
            }
        };

        let context = opened.into_context(entry, instance, tracker);
        let swapchain_loader =
            ash::khr::swapchain::Device::new(context.instance(), context.device());
        Ok((
            context,
            SurfaceContext {
                surface,
                surface_loader,
                swapchain_loader,
            },
        ))
    }
}

fn load_entry() -> Result<ash::Entry> {
    unsafe { ash::Entry::load() }
        .map_err(|e| GpuError::Other(format!("Failed to load Vulkan: {e}")))
}

/// Device-level state created for the selected candidate.
struct OpenedDevice {
    physical_device: vk::PhysicalDevice,
    device_summary: String,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    device: LogicalDevice,
    allocator: GpuAllocator,
}

impl OpenedDevice {
    fn into_context(
        self,
        entry: ash::Entry,
        instance: ash::Instance,
        tracker: Arc<MemoryTracker>,
    ) -> GpuContext {
        GpuContext {
            entry,
            instance,
            physical_device: self.physical_device,
            device_summary: self.device_summary,
            memory_properties: self.memory_properties,
            device: self.device,
            allocator: Mutex::new(self.allocator),
            tracker,
        }
    }
}

/// Select a candidate, then create its logical device and allocator.
///
/// Leaves the instance alive on failure; the caller owns its cleanup.
unsafe fn open_device(
    instance: &ash::Instance,
    candidates: &[PhysicalDeviceCapabilities],
    requirements: &DeviceRequirements,
    tracker: &Arc<MemoryTracker>,
) -> Result<OpenedDevice> {
    let (index, assignment) = select_physical_device(candidates, requirements)?;
    let physical = &candidates[index];

    let device = unsafe { LogicalDevice::create(instance, physical, assignment, requirements)? };
    let allocator =
        match unsafe { GpuAllocator::new(instance, device.raw(), physical.handle, tracker) } {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy() };
                return Err(e);
            }
        };

    Ok(OpenedDevice {
        physical_device: physical.handle,
        device_summary: physical.summary(),
        memory_properties: physical.memory_properties,
        device,
        allocator,
    })
}
