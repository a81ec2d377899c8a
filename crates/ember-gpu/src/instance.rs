//! Vulkan instance creation and physical device selection.

use crate::capabilities::PhysicalDeviceCapabilities;
use crate::error::{DeviceError, GpuError, Result};
use crate::queues::{assign_queue_families, QueueAssignment};
use crate::requirements::{DeviceRequirements, SelectionPolicy};
use ash::vk;
use ember_core::MemoryTracker;
use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;

/// Validation layers to enable in debug builds.
pub fn validation_layers() -> Vec<&'static CStr> {
    vec![c"VK_LAYER_KHRONOS_validation"]
}

/// Create a Vulkan instance.
///
/// `surface_extensions` are the platform surface extensions the window
/// needs; pass an empty slice for headless use.
///
/// # Safety
/// The entry must be a valid Vulkan entry point and every pointer in
/// `surface_extensions` must reference a NUL-terminated static string.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    enable_validation: bool,
    surface_extensions: &[*const c_char],
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name)
        .map_err(|e| GpuError::Other(format!("Invalid application name: {e}")))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"Ember")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_3);

    #[cfg_attr(not(target_os = "macos"), allow(unused_mut))]
    let mut extension_names: Vec<*const c_char> = surface_extensions.to_vec();
    #[cfg(target_os = "macos")]
    extension_names.push(ash::khr::portability_enumeration::NAME.as_ptr());

    let layers = if enable_validation {
        validation_layers()
    } else {
        vec![]
    };

    // Missing layers are dropped rather than failing instance creation.
    let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };
    let layers: Vec<&CStr> = layers
        .into_iter()
        .filter(|layer| {
            let found = available_layers
                .iter()
                .any(|props| props.layer_name_as_c_str() == Ok(*layer));
            if !found {
                tracing::warn!("Validation layer {:?} not available", layer);
            }
            found
        })
        .collect();
    let layer_names: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    let instance = unsafe { entry.create_instance(&create_info, None)? };

    Ok(instance)
}

/// Snapshot every physical device the instance reports.
///
/// # Safety
/// The instance and surface must be valid.
pub unsafe fn enumerate_candidates(
    instance: &ash::Instance,
    surface: Option<(&ash::khr::surface::Instance, vk::SurfaceKHR)>,
    tracker: &Arc<MemoryTracker>,
) -> Result<Vec<PhysicalDeviceCapabilities>> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    devices
        .into_iter()
        .map(|device| unsafe { PhysicalDeviceCapabilities::query(instance, device, surface, tracker) })
        .collect()
}

/// Check one candidate against the requirements.
pub fn check_candidate(
    candidate: &PhysicalDeviceCapabilities,
    requirements: &DeviceRequirements,
) -> std::result::Result<QueueAssignment, DeviceError> {
    if let Some(feature) = requirements.features.first_missing(&candidate.features) {
        return Err(DeviceError::MissingFeature {
            device: candidate.device_name.clone(),
            feature,
        });
    }

    if let Some(extension) = requirements
        .extensions
        .iter()
        .find(|name| !candidate.supports_extension(name))
    {
        return Err(DeviceError::MissingExtension {
            device: candidate.device_name.clone(),
            extension: extension.clone(),
        });
    }

    assign_queue_families(
        &candidate.queue_families,
        |index| candidate.supports_present(index),
        requirements.queues,
    )
    .map_err(|source| DeviceError::Queues {
        device: candidate.device_name.clone(),
        source,
    })
}

/// Pick the first candidate that satisfies the requirements.
///
/// Returns the candidate's index and its queue assignment.
pub fn select_physical_device(
    candidates: &[PhysicalDeviceCapabilities],
    requirements: &DeviceRequirements,
) -> std::result::Result<(usize, QueueAssignment), DeviceError> {
    if candidates.is_empty() {
        return Err(DeviceError::NoDevices);
    }

    let mut rejected = 0;
    for (index, candidate) in candidates.iter().enumerate() {
        match check_candidate(candidate, requirements) {
            Ok(assignment) => {
                tracing::info!("Selected GPU: {}", candidate.summary());
                tracing::info!("Queue families: {assignment}");
                return Ok((index, assignment));
            }
            Err(err) if requirements.policy == SelectionPolicy::FailFast => {
                tracing::error!("Device selection aborted: {err}");
                return Err(err);
            }
            Err(err) => {
                tracing::debug!("Skipping {}: {err}", candidate.device_name);
                rejected += 1;
            }
        }
    }

    Err(DeviceError::NoSuitableDevice { rejected })
}
