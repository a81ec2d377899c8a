//! Logical device creation and queue retrieval.

use crate::capabilities::PhysicalDeviceCapabilities;
use crate::error::{GpuError, Result};
use crate::queues::{
    plan_queue_fetches, plan_queue_requests, QueueAssignment, QueueFamilyRequest, QueuePurpose,
};
use crate::requirements::DeviceRequirements;
use ash::vk;
use std::ffi::{c_char, CString};

/// Queue handles per purpose. Purposes may share the same underlying queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceQueues {
    pub graphics: Option<vk::Queue>,
    pub present: Option<vk::Queue>,
    pub compute: Option<vk::Queue>,
    pub transfer: Option<vk::Queue>,
}

impl DeviceQueues {
    /// Queue for `purpose`.
    pub const fn get(&self, purpose: QueuePurpose) -> Option<vk::Queue> {
        match purpose {
            QueuePurpose::Graphics => self.graphics,
            QueuePurpose::Present => self.present,
            QueuePurpose::Compute => self.compute,
            QueuePurpose::Transfer => self.transfer,
        }
    }

    fn set(&mut self, purpose: QueuePurpose, queue: vk::Queue) {
        match purpose {
            QueuePurpose::Graphics => self.graphics = Some(queue),
            QueuePurpose::Present => self.present = Some(queue),
            QueuePurpose::Compute => self.compute = Some(queue),
            QueuePurpose::Transfer => self.transfer = Some(queue),
        }
    }
}

/// The logical device and the queues fetched from it.
///
/// Destroyed by its owner exactly once, after every resource created from it.
pub struct LogicalDevice {
    pub(crate) device: ash::Device,
    pub(crate) assignment: QueueAssignment,
    pub(crate) requests: Vec<QueueFamilyRequest>,
    pub(crate) queues: DeviceQueues,
}

impl LogicalDevice {
    /// Create the logical device for a selected physical device.
    ///
    /// # Safety
    /// The instance must be valid and `physical` must describe one of its devices.
    pub unsafe fn create(
        instance: &ash::Instance,
        physical: &PhysicalDeviceCapabilities,
        assignment: QueueAssignment,
        requirements: &DeviceRequirements,
    ) -> Result<Self> {
        let requests = plan_queue_requests(&assignment, &physical.queue_families);
        for request in &requests {
            tracing::debug!(
                "Requesting {} queue(s) from family {} for {:?}",
                request.queue_count,
                request.family,
                request.purposes,
            );
        }

        let priorities: Vec<Vec<f32>> = requests
            .iter()
            .map(|r| vec![1.0; r.queue_count as usize])
            .collect();
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = requests
            .iter()
            .zip(&priorities)
            .map(|(request, priorities)| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(request.family)
                    .queue_priorities(priorities)
            })
            .collect();

        let extensions = requirements
            .extensions
            .iter()
            .map(|name| CString::new(name.as_str()))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| GpuError::Other(format!("Invalid extension name: {e}")))?;
        let extension_names: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();

        let wanted = requirements.features;
        let features = vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(wanted.sampler_anisotropy);
        let mut vulkan_1_3_features = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(wanted.dynamic_rendering)
            .synchronization2(wanted.synchronization2)
            .maintenance4(wanted.maintenance4);
        let needs_1_3 =
            wanted.dynamic_rendering || wanted.synchronization2 || wanted.maintenance4;

        let mut features2 = vk::PhysicalDeviceFeatures2::default().features(features);
        if needs_1_3 {
            features2 = features2.push_next(&mut vulkan_1_3_features);
        }

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .push_next(&mut features2);

        let device = unsafe { instance.create_device(physical.handle, &device_create_info, None)? };

        let plan = plan_queue_fetches(&assignment, &requests);
        let mut queues = DeviceQueues::default();
        for purpose in QueuePurpose::ALL {
            if let Some((family, index)) = plan.location(purpose) {
                queues.set(purpose, unsafe { device.get_device_queue(family, index) });
            }
        }

        Ok(Self {
            device,
            assignment,
            requests,
            queues,
        })
    }

    /// Get the Vulkan device handle.
    pub const fn raw(&self) -> &ash::Device {
        &self.device
    }

    /// Queue family assignment the device was created with.
    pub const fn assignment(&self) -> &QueueAssignment {
        &self.assignment
    }

    /// Per-family queue requests made at creation.
    pub fn requests(&self) -> &[QueueFamilyRequest] {
        &self.requests
    }

    /// Queue handles by purpose.
    pub const fn queues(&self) -> &DeviceQueues {
        &self.queues
    }

    /// Queue for `purpose`, or an error if that purpose was never assigned.
    pub fn queue(&self, purpose: QueuePurpose) -> Result<vk::Queue> {
        self.queues
            .get(purpose)
            .ok_or_else(|| GpuError::InvalidState(format!("No {purpose} queue on this device")))
    }

    /// Queue family for `purpose`.
    pub fn queue_family(&self, purpose: QueuePurpose) -> Result<u32> {
        self.assignment
            .family(purpose)
            .ok_or_else(|| GpuError::InvalidState(format!("No {purpose} queue family assigned")))
    }

    /// Destroy the device.
    ///
    /// # Safety
    /// Every object created from this device must already be destroyed.
    pub(crate) unsafe fn destroy(&self) {
        unsafe { self.device.destroy_device(None) };
    }
}
