//! GPU capability detection.

use crate::error::Result;
use ash::prelude::VkResult;
use ash::vk;
use ember_core::{MemoryTag, MemoryTracker, TaggedVec};
use std::ffi::CStr;
use std::sync::Arc;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub const fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Device features the core knows how to require and enable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceFeatures {
    pub sampler_anisotropy: bool,
    pub dynamic_rendering: bool,
    pub synchronization2: bool,
    pub maintenance4: bool,
}

impl DeviceFeatures {
    /// Name of the first feature requested here that `supported` lacks.
    pub fn first_missing(&self, supported: &Self) -> Option<&'static str> {
        [
            (self.sampler_anisotropy, supported.sampler_anisotropy, "samplerAnisotropy"),
            (self.dynamic_rendering, supported.dynamic_rendering, "dynamicRendering"),
            (self.synchronization2, supported.synchronization2, "synchronization2"),
            (self.maintenance4, supported.maintenance4, "maintenance4"),
        ]
        .into_iter()
        .find(|&(wanted, available, _)| wanted && !available)
        .map(|(_, _, name)| name)
    }
}

/// Read-only snapshot of one physical device, taken during selection.
#[derive(Debug)]
pub struct PhysicalDeviceCapabilities {
    pub handle: vk::PhysicalDevice,
    pub device_name: String,
    pub vendor: GpuVendor,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub driver_version: u32,
    pub features: DeviceFeatures,
    /// Driver-reported device extension names.
    pub extensions: TaggedVec<String>,
    pub queue_families: TaggedVec<vk::QueueFamilyProperties>,
    /// Per-family presentation support for the target surface; empty when headless.
    pub present_support: Vec<bool>,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub device_local_memory_mb: u64,
}

impl PhysicalDeviceCapabilities {
    /// Query capabilities from a physical device.
    ///
    /// When `surface` is given, presentation support is queried for every
    /// queue family against it.
    ///
    /// # Safety
    /// The instance, physical device and surface must be valid.
    pub unsafe fn query(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        surface: Option<(&ash::khr::surface::Instance, vk::SurfaceKHR)>,
        tracker: &Arc<MemoryTracker>,
    ) -> Result<Self> {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        let raw_extensions =
            unsafe { instance.enumerate_device_extension_properties(physical_device)? };
        let mut extensions =
            TaggedVec::with_capacity(MemoryTag::Enumeration, tracker, raw_extensions.len());
        extensions.extend(raw_extensions.iter().filter_map(|ext| {
            ext.extension_name_as_c_str()
                .ok()
                .and_then(|name| name.to_str().ok())
                .map(String::from)
        }));

        let queue_families = TaggedVec::from_vec(
            MemoryTag::Enumeration,
            tracker,
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) },
        );

        let present_support = match surface {
            Some((loader, surface)) => collect_present_support(queue_families.len(), |index| unsafe {
                loader.get_physical_device_surface_support(physical_device, index, surface)
            })?,
            None => Vec::new(),
        };

        let features = unsafe { query_features(instance, physical_device, properties.api_version) };

        let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        let device_local_memory_mb: u64 = memory_properties
            .memory_heaps
            .iter()
            .take(memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum();

        Ok(Self {
            handle: physical_device,
            device_name,
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_type: properties.device_type,
            api_version: properties.api_version,
            driver_version: properties.driver_version,
            features,
            extensions,
            queue_families,
            present_support,
            memory_properties,
            device_local_memory_mb,
        })
    }

    /// Exact, case-sensitive match against the driver's extension list.
    pub fn supports_extension(&self, name: &str) -> bool {
        self.extensions.iter().any(|ext| ext == name)
    }

    /// Whether queue family `index` can present to the selection surface.
    pub fn supports_present(&self, index: u32) -> bool {
        self.present_support
            .get(index as usize)
            .copied()
            .unwrap_or(false)
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}, {:?}) - Vulkan {}.{}.{} - {} MB VRAM",
            self.device_name,
            self.vendor,
            self.device_type,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
        )
    }
}

/// Query the feature bits the core cares about.
///
/// The 1.3 feature struct is only chained on devices that report 1.3.
unsafe fn query_features(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    api_version: u32,
) -> DeviceFeatures {
    let has_vulkan_1_3 = vk::api_version_major(api_version) > 1
        || (vk::api_version_major(api_version) == 1 && vk::api_version_minor(api_version) >= 3);

    if !has_vulkan_1_3 {
        let base = unsafe { instance.get_physical_device_features(physical_device) };
        return DeviceFeatures {
            sampler_anisotropy: base.sampler_anisotropy == vk::TRUE,
            ..DeviceFeatures::default()
        };
    }

    let mut vulkan_1_3 = vk::PhysicalDeviceVulkan13Features::default();
    let mut features2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut vulkan_1_3);
    unsafe { instance.get_physical_device_features2(physical_device, &mut features2) };
    let sampler_anisotropy = features2.features.sampler_anisotropy == vk::TRUE;

    DeviceFeatures {
        sampler_anisotropy,
        dynamic_rendering: vulkan_1_3.dynamic_rendering == vk::TRUE,
        synchronization2: vulkan_1_3.synchronization2 == vk::TRUE,
        maintenance4: vulkan_1_3.maintenance4 == vk::TRUE,
    }
}

/// Ask `query` for every family in turn; the first failure ends the scan.
fn collect_present_support(
    family_count: usize,
    mut query: impl FnMut(u32) -> VkResult<bool>,
) -> VkResult<Vec<bool>> {
    (0u32..)
        .take(family_count)
        .map(|index| {
            query(index).inspect_err(|e| {
                tracing::warn!("Surface support query for family {index} failed: {e}");
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }

    #[test]
    fn missing_feature_is_named() {
        let wanted = DeviceFeatures {
            dynamic_rendering: true,
            maintenance4: true,
            ..Default::default()
        };
        let supported = DeviceFeatures {
            dynamic_rendering: true,
            ..Default::default()
        };

        assert_eq!(wanted.first_missing(&supported), Some("maintenance4"));
        assert_eq!(wanted.first_missing(&wanted), None);
    }

    #[test]
    fn present_support_is_collected_per_family() {
        let support = collect_present_support(3, |index| Ok(index != 1)).unwrap();
        assert_eq!(support, vec![true, false, true]);
    }

    #[test]
    fn present_support_query_failure_is_propagated() {
        let mut asked = Vec::new();
        let result = collect_present_support(4, |index| {
            asked.push(index);
            if index == 1 {
                Err(vk::Result::ERROR_SURFACE_LOST_KHR)
            } else {
                Ok(true)
            }
        });

        assert_eq!(result, Err(vk::Result::ERROR_SURFACE_LOST_KHR));
        assert_eq!(asked, vec![0, 1]);
    }
}
