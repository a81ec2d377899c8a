//! Queue family assignment and queue request planning.
//!
//! Assignment scans a device's queue families once, then runs fallback passes
//! for any purpose the first scan left open. Planning turns an assignment into
//! one request per distinct family, sized by how many purposes share it.

use crate::error::QueueFamilyError;
use ash::vk;
use bitflags::bitflags;
use std::fmt;

/// What a queue is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueuePurpose {
    Graphics,
    Present,
    Compute,
    Transfer,
}

impl QueuePurpose {
    /// All purposes in fetch order.
    pub const ALL: [Self; 4] = [Self::Graphics, Self::Present, Self::Compute, Self::Transfer];

    /// Lowercase name used in logs and errors.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Graphics => "graphics",
            Self::Present => "present",
            Self::Compute => "compute",
            Self::Transfer => "transfer",
        }
    }

    const fn bit(self) -> QueuePurposes {
        match self {
            Self::Graphics => QueuePurposes::GRAPHICS,
            Self::Present => QueuePurposes::PRESENT,
            Self::Compute => QueuePurposes::COMPUTE,
            Self::Transfer => QueuePurposes::TRANSFER,
        }
    }
}

impl fmt::Display for QueuePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// Set of purposes served by one queue family.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct QueuePurposes: u8 {
        const GRAPHICS = 1 << 0;
        const PRESENT = 1 << 1;
        const COMPUTE = 1 << 2;
        const TRANSFER = 1 << 3;
    }
}

/// Which purposes must be served for a device to be usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueRequirements {
    pub graphics: bool,
    pub present: bool,
    pub compute: bool,
    pub transfer: bool,
}

impl Default for QueueRequirements {
    fn default() -> Self {
        Self {
            graphics: true,
            present: true,
            compute: true,
            transfer: true,
        }
    }
}

impl QueueRequirements {
    /// Requirements for rendering without a surface.
    pub const fn headless() -> Self {
        Self {
            graphics: true,
            present: false,
            compute: true,
            transfer: true,
        }
    }

    /// Whether `purpose` is required.
    pub const fn requires(&self, purpose: QueuePurpose) -> bool {
        match purpose {
            QueuePurpose::Graphics => self.graphics,
            QueuePurpose::Present => self.present,
            QueuePurpose::Compute => self.compute,
            QueuePurpose::Transfer => self.transfer,
        }
    }
}

/// Queue family index chosen for each purpose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueAssignment {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
    pub compute: Option<u32>,
    pub transfer: Option<u32>,
}

impl QueueAssignment {
    /// Family assigned to `purpose`.
    pub const fn family(&self, purpose: QueuePurpose) -> Option<u32> {
        match purpose {
            QueuePurpose::Graphics => self.graphics,
            QueuePurpose::Present => self.present,
            QueuePurpose::Compute => self.compute,
            QueuePurpose::Transfer => self.transfer,
        }
    }

    /// Distinct families used by at least one purpose, ascending.
    pub fn distinct_families(&self) -> Vec<u32> {
        let mut families: Vec<u32> = QueuePurpose::ALL
            .iter()
            .filter_map(|&p| self.family(p))
            .collect();
        families.sort_unstable();
        families.dedup();
        families
    }

    /// Graphics and present families when they differ.
    ///
    /// Swapchain images must be shared concurrently across these.
    pub fn concurrent_present_families(&self) -> Option<[u32; 2]> {
        match (self.graphics, self.present) {
            (Some(g), Some(p)) if g != p => Some([g, p]),
            _ => None,
        }
    }
}

impl fmt::Display for QueueAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |family: Option<u32>| family.map_or_else(|| "-".to_string(), |i| i.to_string());
        write!(
            f,
            "graphics: {}, present: {}, compute: {}, transfer: {}",
            show(self.graphics),
            show(self.present),
            show(self.compute),
            show(self.transfer),
        )
    }
}

/// Compute-capable without graphics.
pub fn is_dedicated_compute(flags: vk::QueueFlags) -> bool {
    flags.contains(vk::QueueFlags::COMPUTE) && !flags.contains(vk::QueueFlags::GRAPHICS)
}

/// Transfer-capable with none of graphics, compute or optical flow.
pub fn is_dedicated_transfer(flags: vk::QueueFlags) -> bool {
    let excluded =
        vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::OPTICAL_FLOW_NV;
    flags.contains(vk::QueueFlags::TRANSFER) && !flags.intersects(excluded)
}

/// Assign a family to each purpose.
///
/// `supports_present` answers whether family `i` can present to the target
/// surface; pass `|_| false` when rendering headless.
pub fn assign_queue_families(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> bool,
    required: QueueRequirements,
) -> Result<QueueAssignment, QueueFamilyError> {
    let mut assignment = QueueAssignment::default();

    for (index, family) in (0u32..).zip(families) {
        let flags = family.queue_flags;

        if assignment.graphics.is_none() && flags.contains(vk::QueueFlags::GRAPHICS) {
            assignment.graphics = Some(index);
            if supports_present(index) {
                assignment.present = Some(index);
            }
        }

        if assignment.compute.is_none() && is_dedicated_compute(flags) {
            assignment.compute = Some(index);
        }

        if assignment.transfer.is_none() && is_dedicated_transfer(flags) {
            assignment.transfer = Some(index);
        }
    }

    if assignment.present.is_none() {
        assignment.present = (0u32..)
            .take(families.len())
            .find(|&index| supports_present(index));
    }

    if assignment.compute.is_none() {
        assignment.compute = (0u32..)
            .zip(families)
            .find(|(_, family)| family.queue_flags.contains(vk::QueueFlags::COMPUTE))
            .map(|(index, _)| index);
    }

    // Graphics families always accept transfer work.
    if assignment.transfer.is_none() {
        if let Some(graphics) = assignment.graphics {
            assignment.transfer = Some(graphics);
            tracing::debug!("No dedicated transfer family, sharing graphics family {graphics}");
        }
    }

    let missing: Vec<QueuePurpose> = QueuePurpose::ALL
        .into_iter()
        .filter(|&p| required.requires(p) && assignment.family(p).is_none())
        .collect();

    if missing.is_empty() {
        Ok(assignment)
    } else {
        Err(QueueFamilyError { missing })
    }
}

/// Queues requested from one family at device creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyRequest {
    pub family: u32,
    /// Purposes assigned to this family.
    pub purposes: QueuePurposes,
    /// Distinct queues requested: purpose count capped at the family's queue count.
    pub queue_count: u32,
}

/// One request per distinct family that serves at least one purpose.
pub fn plan_queue_requests(
    assignment: &QueueAssignment,
    families: &[vk::QueueFamilyProperties],
) -> Vec<QueueFamilyRequest> {
    assignment
        .distinct_families()
        .into_iter()
        .filter_map(|family| {
            let purposes = QueuePurpose::ALL
                .iter()
                .filter(|&&p| assignment.family(p) == Some(family))
                .fold(QueuePurposes::empty(), |acc, &p| acc | p.bit());

            let available = families.get(family as usize)?.queue_count;
            let queue_count = purposes.bits().count_ones().min(available);
            (queue_count > 0).then_some(QueueFamilyRequest {
                family,
                purposes,
                queue_count,
            })
        })
        .collect()
}

/// `(family, queue index)` to fetch for each assigned purpose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFetchPlan {
    pub graphics: Option<(u32, u32)>,
    pub present: Option<(u32, u32)>,
    pub compute: Option<(u32, u32)>,
    pub transfer: Option<(u32, u32)>,
}

impl QueueFetchPlan {
    /// Location for `purpose`.
    pub const fn location(&self, purpose: QueuePurpose) -> Option<(u32, u32)> {
        match purpose {
            QueuePurpose::Graphics => self.graphics,
            QueuePurpose::Present => self.present,
            QueuePurpose::Compute => self.compute,
            QueuePurpose::Transfer => self.transfer,
        }
    }

    fn set(&mut self, purpose: QueuePurpose, location: (u32, u32)) {
        match purpose {
            QueuePurpose::Graphics => self.graphics = Some(location),
            QueuePurpose::Present => self.present = Some(location),
            QueuePurpose::Compute => self.compute = Some(location),
            QueuePurpose::Transfer => self.transfer = Some(location),
        }
    }
}

/// Hand out queue indices per family in purpose order.
///
/// Each family's index increments until its requested count is used up; any
/// further purpose on that family aliases queue 0.
pub fn plan_queue_fetches(
    assignment: &QueueAssignment,
    requests: &[QueueFamilyRequest],
) -> QueueFetchPlan {
    let mut plan = QueueFetchPlan::default();
    let mut next_index = vec![0u32; requests.len()];

    for purpose in QueuePurpose::ALL {
        let Some(family) = assignment.family(purpose) else {
            continue;
        };
        let Some(slot) = requests.iter().position(|r| r.family == family) else {
            continue;
        };

        let index = if next_index[slot] < requests[slot].queue_count {
            next_index[slot]
        } else {
            0
        };
        next_index[slot] += 1;
        plan.set(purpose, (family, index));
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties::default()
            .queue_flags(flags)
            .queue_count(count)
    }

    const GCT: vk::QueueFlags = vk::QueueFlags::from_raw(
        vk::QueueFlags::GRAPHICS.as_raw()
            | vk::QueueFlags::COMPUTE.as_raw()
            | vk::QueueFlags::TRANSFER.as_raw(),
    );
    const CT: vk::QueueFlags =
        vk::QueueFlags::from_raw(vk::QueueFlags::COMPUTE.as_raw() | vk::QueueFlags::TRANSFER.as_raw());

    fn assert_satisfies(assignment: &QueueAssignment, families: &[vk::QueueFamilyProperties]) {
        let flags = |i: Option<u32>| families[i.unwrap() as usize].queue_flags;
        assert!(flags(assignment.graphics).contains(vk::QueueFlags::GRAPHICS));
        assert!(flags(assignment.compute).contains(vk::QueueFlags::COMPUTE));
        let transfer = assignment.transfer.unwrap();
        assert!(
            flags(Some(transfer)).contains(vk::QueueFlags::TRANSFER)
                || Some(transfer) == assignment.graphics
        );
    }

    #[test]
    fn discrete_layout_gets_dedicated_queues() {
        let families = [
            family(GCT, 16),
            family(vk::QueueFlags::TRANSFER, 2),
            family(CT, 8),
        ];
        let assignment =
            assign_queue_families(&families, |i| i == 0, QueueRequirements::default()).unwrap();

        assert_eq!(assignment.graphics, Some(0));
        assert_eq!(assignment.present, Some(0));
        assert_eq!(assignment.compute, Some(2));
        assert_eq!(assignment.transfer, Some(1));
        assert_satisfies(&assignment, &families);
    }

    #[test]
    fn single_family_aliases_everything() {
        let families = [family(GCT, 1)];
        let assignment =
            assign_queue_families(&families, |_| true, QueueRequirements::default()).unwrap();

        assert_eq!(assignment.graphics, Some(0));
        assert_eq!(assignment.present, Some(0));
        assert_eq!(assignment.compute, Some(0));
        assert_eq!(assignment.transfer, Some(0));
    }

    #[test]
    fn present_falls_back_to_other_family() {
        let families = [family(GCT, 4), family(CT, 2)];
        let assignment =
            assign_queue_families(&families, |i| i == 1, QueueRequirements::default()).unwrap();

        assert_eq!(assignment.graphics, Some(0));
        assert_eq!(assignment.present, Some(1));
    }

    #[test]
    fn transfer_with_compute_is_not_dedicated() {
        // The compute+transfer family is dedicated compute, not dedicated transfer.
        let families = [family(GCT, 4), family(CT, 2)];
        let assignment =
            assign_queue_families(&families, |_| true, QueueRequirements::default()).unwrap();

        assert_eq!(assignment.compute, Some(1));
        assert_eq!(assignment.transfer, assignment.graphics);
    }

    #[test]
    fn optical_flow_family_is_not_dedicated_transfer() {
        let flags = vk::QueueFlags::TRANSFER | vk::QueueFlags::OPTICAL_FLOW_NV;
        assert!(!is_dedicated_transfer(flags));
        assert!(is_dedicated_transfer(vk::QueueFlags::TRANSFER));
        assert!(is_dedicated_transfer(
            vk::QueueFlags::TRANSFER | vk::QueueFlags::SPARSE_BINDING
        ));
    }

    #[test]
    fn missing_present_is_reported() {
        let families = [family(GCT, 4)];
        let err =
            assign_queue_families(&families, |_| false, QueueRequirements::default()).unwrap_err();

        assert_eq!(err.missing, vec![QueuePurpose::Present]);
    }

    #[test]
    fn headless_does_not_need_present() {
        let families = [family(GCT, 4)];
        let assignment =
            assign_queue_families(&families, |_| false, QueueRequirements::headless()).unwrap();

        assert_eq!(assignment.present, None);
        assert_eq!(assignment.graphics, Some(0));
    }

    #[test]
    fn compute_only_device_fails_graphics_and_present() {
        let families = [family(CT, 1)];
        let err =
            assign_queue_families(&families, |_| false, QueueRequirements::default()).unwrap_err();

        // Transfer aliases graphics, which is missing too.
        assert_eq!(
            err.missing,
            vec![
                QueuePurpose::Graphics,
                QueuePurpose::Present,
                QueuePurpose::Transfer
            ]
        );
    }

    #[test]
    fn transfer_stays_unassigned_without_graphics() {
        let families = [family(CT, 1)];
        let compute_only = QueueRequirements {
            graphics: false,
            present: false,
            compute: true,
            transfer: false,
        };
        let assignment = assign_queue_families(&families, |_| false, compute_only).unwrap();

        assert_eq!(assignment.compute, Some(0));
        assert_eq!(assignment.graphics, None);
        assert_eq!(assignment.transfer, None);
    }

    #[test]
    fn one_purpose_requests_one_queue() {
        let families = [family(GCT, 16), family(vk::QueueFlags::TRANSFER, 2), family(CT, 8)];
        let assignment = QueueAssignment {
            graphics: Some(0),
            present: Some(0),
            compute: Some(2),
            transfer: Some(1),
        };
        let requests = plan_queue_requests(&assignment, &families);

        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].queue_count, 2);
        assert_eq!(requests[1].queue_count, 1);
        assert_eq!(requests[1].purposes, QueuePurposes::TRANSFER);
        assert_eq!(requests[2].queue_count, 1);
    }

    #[test]
    fn four_purposes_request_four_queues() {
        let families = [family(GCT, 16)];
        let assignment = QueueAssignment {
            graphics: Some(0),
            present: Some(0),
            compute: Some(0),
            transfer: Some(0),
        };
        let requests = plan_queue_requests(&assignment, &families);

        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].purposes, QueuePurposes::all());
        assert_eq!(requests[0].queue_count, 4);
    }

    #[test]
    fn request_is_capped_at_family_queue_count() {
        let families = [family(GCT, 2)];
        let assignment = QueueAssignment {
            graphics: Some(0),
            present: Some(0),
            compute: Some(0),
            transfer: Some(0),
        };
        let requests = plan_queue_requests(&assignment, &families);

        assert_eq!(requests[0].queue_count, 2);
        for request in &requests {
            let available = families[request.family as usize].queue_count;
            assert!(request.queue_count <= available);
        }
    }

    #[test]
    fn fetches_alias_queue_zero_when_exhausted() {
        let families = [family(GCT, 2)];
        let assignment = QueueAssignment {
            graphics: Some(0),
            present: Some(0),
            compute: Some(0),
            transfer: Some(0),
        };
        let requests = plan_queue_requests(&assignment, &families);
        let plan = plan_queue_fetches(&assignment, &requests);

        assert_eq!(plan.graphics, Some((0, 0)));
        assert_eq!(plan.present, Some((0, 1)));
        assert_eq!(plan.compute, Some((0, 0)));
        assert_eq!(plan.transfer, Some((0, 0)));
    }

    #[test]
    fn fetches_use_distinct_queues_when_available() {
        let families = [family(GCT, 16), family(CT, 8)];
        let assignment = QueueAssignment {
            graphics: Some(0),
            present: Some(0),
            compute: Some(1),
            transfer: Some(0),
        };
        let requests = plan_queue_requests(&assignment, &families);
        let plan = plan_queue_fetches(&assignment, &requests);

        assert_eq!(plan.graphics, Some((0, 0)));
        assert_eq!(plan.present, Some((0, 1)));
        assert_eq!(plan.compute, Some((1, 0)));
        assert_eq!(plan.transfer, Some((0, 2)));
    }

    #[test]
    fn concurrent_sharing_only_when_families_differ() {
        let mut assignment = QueueAssignment {
            graphics: Some(0),
            present: Some(0),
            ..Default::default()
        };
        assert_eq!(assignment.concurrent_present_families(), None);

        assignment.present = Some(2);
        assert_eq!(assignment.concurrent_present_families(), Some([0, 2]));
    }
}
