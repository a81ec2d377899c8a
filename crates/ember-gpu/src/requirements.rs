//! What a physical device must offer to be selected.

use crate::capabilities::DeviceFeatures;
use crate::queues::QueueRequirements;

/// How selection treats a candidate that fails the requirements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// Skip it and keep looking.
    #[default]
    FirstConforming,
    /// Abort selection on the first non-conforming candidate.
    FailFast,
}

/// Requirement bundle for device selection and creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRequirements {
    /// Device extensions, matched exactly against driver-reported names.
    pub extensions: Vec<String>,
    pub features: DeviceFeatures,
    pub queues: QueueRequirements,
    pub policy: SelectionPolicy,
}

impl Default for DeviceRequirements {
    fn default() -> Self {
        Self {
            extensions: vec![swapchain_extension_name()],
            features: DeviceFeatures {
                sampler_anisotropy: false,
                dynamic_rendering: true,
                synchronization2: true,
                maintenance4: true,
            },
            queues: QueueRequirements::default(),
            policy: SelectionPolicy::default(),
        }
    }
}

impl DeviceRequirements {
    /// Requirements for rendering without a window.
    pub fn headless() -> Self {
        Self {
            extensions: Vec::new(),
            queues: QueueRequirements::headless(),
            ..Self::default()
        }
    }

    /// Require an additional device extension.
    pub fn extension(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.extensions.contains(&name) {
            self.extensions.push(name);
        }
        self
    }

    /// Replace the required feature set.
    pub fn features(mut self, features: DeviceFeatures) -> Self {
        self.features = features;
        self
    }

    /// Replace the required queue purposes.
    pub fn queues(mut self, queues: QueueRequirements) -> Self {
        self.queues = queues;
        self
    }

    /// Set the selection policy.
    pub fn policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Whether presentation is part of the requirements.
    pub const fn needs_present(&self) -> bool {
        self.queues.present
    }
}

fn swapchain_extension_name() -> String {
    ash::khr::swapchain::NAME.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_requires_swapchain() {
        let req = DeviceRequirements::default();
        assert_eq!(req.extensions, vec!["VK_KHR_swapchain".to_string()]);
        assert!(req.needs_present());
    }

    #[test]
    fn headless_drops_presentation() {
        let req = DeviceRequirements::headless().extension("VK_EXT_memory_budget");
        assert_eq!(req.extensions, vec!["VK_EXT_memory_budget".to_string()]);
        assert!(!req.needs_present());
    }

    #[test]
    fn extension_is_not_duplicated() {
        let req = DeviceRequirements::default().extension("VK_KHR_swapchain");
        assert_eq!(req.extensions.len(), 1);
    }
}
