//! Descriptor set layouts and a growable descriptor set allocator.
//!
//! [`GrowableDescriptorAllocator`] keeps a list of pools that still have room
//! and a list of pools that ran out. When a pool reports exhaustion it is
//! retired to the used list and a larger pool is created, so callers never see
//! pool exhaustion. [`GrowableDescriptorAllocator::clear_pools`] resets every
//! pool and makes all of them available again without creating new handles.

use crate::error::{GpuError, Result};
use ash::prelude::VkResult;
use ash::vk;
use ember_core::{MemoryTag, MemoryTracker, TaggedVec};
use std::sync::Arc;

/// Descriptor set layout builder.
pub struct DescriptorSetLayoutBuilder<'a> {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'a>>,
}

impl DescriptorSetLayoutBuilder<'_> {
    /// Create an empty builder.
    pub const fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Add a binding.
    pub fn binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        count: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(count)
                .stage_flags(stage_flags),
        );
        self
    }

    pub fn storage_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::STORAGE_BUFFER, 1, stage_flags)
    }

    pub fn uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::UNIFORM_BUFFER, 1, stage_flags)
    }

    pub fn storage_image(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::STORAGE_IMAGE, 1, stage_flags)
    }

    pub fn sampled_image(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(
            binding,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            1,
            stage_flags,
        )
    }

    /// Number of bindings added so far.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Build the descriptor set layout.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn build(self, device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);

        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None)? };
        Ok(layout)
    }
}

impl Default for DescriptorSetLayoutBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Descriptors of one type to reserve per set in a pool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolSizeRatio {
    pub descriptor_type: vk::DescriptorType,
    pub ratio: f32,
}

impl PoolSizeRatio {
    pub const fn new(descriptor_type: vk::DescriptorType, ratio: f32) -> Self {
        Self {
            descriptor_type,
            ratio,
        }
    }
}

/// Pool sizing for [`GrowableDescriptorAllocator`].
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorAllocatorConfig {
    /// Set capacity of the first pool.
    pub initial_sets_per_pool: u32,
    pub ratios: Vec<PoolSizeRatio>,
    /// Each new pool holds this many times the sets of the previous one.
    pub growth_factor: f32,
    /// Upper bound on any single pool's set capacity.
    pub max_sets_per_pool: u32,
}

impl Default for DescriptorAllocatorConfig {
    fn default() -> Self {
        Self {
            initial_sets_per_pool: 1000,
            ratios: vec![
                PoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 3.0),
                PoolSizeRatio::new(vk::DescriptorType::STORAGE_BUFFER, 3.0),
                PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 3.0),
                PoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 4.0),
            ],
            growth_factor: 1.5,
            max_sets_per_pool: 4092,
        }
    }
}

impl DescriptorAllocatorConfig {
    /// Set the first pool's set capacity.
    pub fn initial_sets(mut self, sets: u32) -> Self {
        self.initial_sets_per_pool = sets;
        self
    }

    /// Replace the ratio table.
    pub fn ratios(mut self, ratios: Vec<PoolSizeRatio>) -> Self {
        self.ratios = ratios;
        self
    }

    pub fn growth_factor(mut self, factor: f32) -> Self {
        self.growth_factor = factor;
        self
    }

    pub fn max_sets(mut self, sets: u32) -> Self {
        self.max_sets_per_pool = sets;
        self
    }
}

/// Scale `ratios` to a pool holding `max_sets` sets.
///
/// Every entry reserves at least one descriptor.
pub fn pool_sizes(max_sets: u32, ratios: &[PoolSizeRatio]) -> Vec<vk::DescriptorPoolSize> {
    ratios
        .iter()
        .map(|r| vk::DescriptorPoolSize {
            ty: r.descriptor_type,
            descriptor_count: ((r.ratio * max_sets as f32) as u32).max(1),
        })
        .collect()
}

/// Driver calls the allocator makes. Implemented for [`ash::Device`].
pub trait DescriptorBackend {
    unsafe fn create_pool(
        &self,
        max_sets: u32,
        sizes: &[vk::DescriptorPoolSize],
    ) -> VkResult<vk::DescriptorPool>;

    unsafe fn allocate_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VkResult<vk::DescriptorSet>;

    unsafe fn reset_pool(&self, pool: vk::DescriptorPool) -> VkResult<()>;

    unsafe fn destroy_pool(&self, pool: vk::DescriptorPool);
}

impl DescriptorBackend for ash::Device {
    unsafe fn create_pool(
        &self,
        max_sets: u32,
        sizes: &[vk::DescriptorPoolSize],
    ) -> VkResult<vk::DescriptorPool> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(sizes);
        unsafe { self.create_descriptor_pool(&create_info, None) }
    }

    unsafe fn allocate_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VkResult<vk::DescriptorSet> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        let sets = unsafe { self.allocate_descriptor_sets(&alloc_info)? };
        sets.into_iter()
            .next()
            .ok_or(vk::Result::ERROR_OUT_OF_POOL_MEMORY)
    }

    unsafe fn reset_pool(&self, pool: vk::DescriptorPool) -> VkResult<()> {
        unsafe { self.reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty()) }
    }

    unsafe fn destroy_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.destroy_descriptor_pool(pool, None) };
    }
}

/// A pool handle and the sizing it was created with.
#[derive(Debug, Clone)]
pub struct DescriptorPool {
    handle: vk::DescriptorPool,
    max_sets: u32,
    sizes: Vec<vk::DescriptorPoolSize>,
}

impl DescriptorPool {
    pub const fn handle(&self) -> vk::DescriptorPool {
        self.handle
    }

    pub const fn max_sets(&self) -> u32 {
        self.max_sets
    }

    pub fn sizes(&self) -> &[vk::DescriptorPoolSize] {
        &self.sizes
    }
}

const fn is_pool_exhausted(result: vk::Result) -> bool {
    matches!(
        result,
        vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL
    )
}

/// Pool-of-pools descriptor set allocator.
///
/// Every pool is in exactly one of the ready and used lists. Sets are never
/// freed individually; [`Self::clear_pools`] releases all of them at once.
pub struct GrowableDescriptorAllocator {
    config: DescriptorAllocatorConfig,
    ready: TaggedVec<DescriptorPool>,
    used: TaggedVec<DescriptorPool>,
    sets_per_pool: u32,
}

impl GrowableDescriptorAllocator {
    /// Create an allocator. No pool exists until the first allocation.
    pub fn new(config: DescriptorAllocatorConfig, tracker: &Arc<MemoryTracker>) -> Self {
        let sets_per_pool = config
            .initial_sets_per_pool
            .clamp(1, config.max_sets_per_pool.max(1));
        Self {
            config,
            ready: TaggedVec::tracked(MemoryTag::Descriptors, tracker),
            used: TaggedVec::tracked(MemoryTag::Descriptors, tracker),
            sets_per_pool,
        }
    }

    /// Allocate one set with `layout`.
    ///
    /// Pool exhaustion is absorbed by retiring the pool and retrying once in a
    /// fresh one. An error is returned only if the fresh pool also refuses the
    /// set, or for any other driver failure.
    ///
    /// # Safety
    /// The backend and layout must be valid and [`Self::destroy_pools`] must not
    /// have been called.
    pub unsafe fn allocate<B: DescriptorBackend>(
        &mut self,
        backend: &B,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet> {
        let mut pool = unsafe { self.take_pool(backend)? };

        let set = match unsafe { backend.allocate_set(pool.handle, layout) } {
            Ok(set) => set,
            Err(result) if is_pool_exhausted(result) => {
                tracing::debug!(
                    "Descriptor pool {:?} exhausted ({result}), retiring it",
                    pool.handle
                );
                self.used.push(pool);
                pool = unsafe { self.take_pool(backend)? };
                match unsafe { backend.allocate_set(pool.handle, layout) } {
                    Ok(set) => set,
                    Err(result) => {
                        self.ready.push(pool);
                        return Err(GpuError::AllocationFailed(format!(
                            "Descriptor set does not fit a fresh pool: {result}"
                        )));
                    }
                }
            }
            Err(result) => {
                self.ready.push(pool);
                return Err(result.into());
            }
        };

        self.ready.push(pool);
        Ok(set)
    }

    /// Reset every pool and make all of them available again.
    ///
    /// # Safety
    /// No set allocated from this allocator may still be in use by the device.
    pub unsafe fn clear_pools<B: DescriptorBackend>(&mut self, backend: &B) -> Result<()> {
        for pool in self.ready.iter().chain(self.used.iter()) {
            unsafe { backend.reset_pool(pool.handle)? };
        }
        self.ready.extend(self.used.drain());
        Ok(())
    }

    /// Destroy every pool handle.
    ///
    /// # Safety
    /// No set allocated from this allocator may still be in use by the device.
    pub unsafe fn destroy_pools<B: DescriptorBackend>(&mut self, backend: &B) {
        for pool in self.ready.drain().chain(self.used.drain()) {
            unsafe { backend.destroy_pool(pool.handle) };
        }
    }

    /// Number of pools that still accept allocations.
    pub fn ready_count(&self) -> usize {
        self.ready.len()
    }

    /// Number of pools retired until the next clear.
    pub fn used_count(&self) -> usize {
        self.used.len()
    }

    pub fn pool_count(&self) -> usize {
        self.ready.len() + self.used.len()
    }

    /// Set capacity the next new pool will get.
    pub const fn sets_per_pool(&self) -> u32 {
        self.sets_per_pool
    }

    pub const fn config(&self) -> &DescriptorAllocatorConfig {
        &self.config
    }

    unsafe fn take_pool<B: DescriptorBackend>(&mut self, backend: &B) -> Result<DescriptorPool> {
        if let Some(pool) = self.ready.pop() {
            return Ok(pool);
        }

        let max_sets = self.sets_per_pool;
        let sizes = pool_sizes(max_sets, &self.config.ratios);
        let handle = unsafe { backend.create_pool(max_sets, &sizes)? };

        let grown = (max_sets as f32 * self.config.growth_factor) as u32;
        self.sets_per_pool = grown.clamp(max_sets, self.config.max_sets_per_pool.max(max_sets));
        tracing::debug!(
            "Created descriptor pool with {max_sets} sets, next pool gets {}",
            self.sets_per_pool
        );

        Ok(DescriptorPool {
            handle,
            max_sets,
            sizes,
        })
    }
}

impl Drop for GrowableDescriptorAllocator {
    fn drop(&mut self) {
        let leaked = self.pool_count();
        if leaked > 0 {
            tracing::warn!("GrowableDescriptorAllocator dropped with {leaked} live pool(s)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeDevice {
        next_handle: Cell<u64>,
        /// Pool handle -> (capacity, sets handed out).
        pools: RefCell<HashMap<u64, (u32, u32)>>,
        created: Cell<u32>,
        destroyed: Cell<u32>,
        resets: Cell<u32>,
        /// Refuse every allocation, as if the layout never fits.
        reject_all: Cell<bool>,
    }

    impl FakeDevice {
        fn handle(&self) -> u64 {
            let raw = self.next_handle.get() + 1;
            self.next_handle.set(raw);
            raw
        }
    }

    impl DescriptorBackend for FakeDevice {
        unsafe fn create_pool(
            &self,
            max_sets: u32,
            sizes: &[vk::DescriptorPoolSize],
        ) -> VkResult<vk::DescriptorPool> {
            assert!(sizes.iter().all(|s| s.descriptor_count > 0));
            let raw = self.handle();
            self.pools.borrow_mut().insert(raw, (max_sets, 0));
            self.created.set(self.created.get() + 1);
            Ok(vk::DescriptorPool::from_raw(raw))
        }

        unsafe fn allocate_set(
            &self,
            pool: vk::DescriptorPool,
            _layout: vk::DescriptorSetLayout,
        ) -> VkResult<vk::DescriptorSet> {
            if self.reject_all.get() {
                return Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
            }
            let mut pools = self.pools.borrow_mut();
            let (capacity, used) = pools
                .get_mut(&pool.as_raw())
                .ok_or(vk::Result::ERROR_UNKNOWN)?;
            if *used == *capacity {
                return Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
            }
            *used += 1;
            drop(pools);
            Ok(vk::DescriptorSet::from_raw(self.handle()))
        }

        unsafe fn reset_pool(&self, pool: vk::DescriptorPool) -> VkResult<()> {
            if let Some((_, used)) = self.pools.borrow_mut().get_mut(&pool.as_raw()) {
                *used = 0;
            }
            self.resets.set(self.resets.get() + 1);
            Ok(())
        }

        unsafe fn destroy_pool(&self, pool: vk::DescriptorPool) {
            assert!(self.pools.borrow_mut().remove(&pool.as_raw()).is_some());
            self.destroyed.set(self.destroyed.get() + 1);
        }
    }

    fn small_config() -> DescriptorAllocatorConfig {
        DescriptorAllocatorConfig::default()
            .initial_sets(4)
            .max_sets(8)
    }

    fn small_allocator() -> GrowableDescriptorAllocator {
        GrowableDescriptorAllocator::new(small_config(), &MemoryTracker::shared())
    }

    fn layout() -> vk::DescriptorSetLayout {
        vk::DescriptorSetLayout::from_raw(0x1a7)
    }

    #[test]
    fn default_ratio_table() {
        let sizes = pool_sizes(10, &DescriptorAllocatorConfig::default().ratios);
        assert_eq!(sizes.len(), 4);
        assert_eq!(sizes[0].ty, vk::DescriptorType::STORAGE_IMAGE);
        assert_eq!(sizes[0].descriptor_count, 30);
        assert_eq!(sizes[3].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(sizes[3].descriptor_count, 40);
    }

    #[test]
    fn tiny_ratio_still_reserves_one() {
        let sizes = pool_sizes(1, &[PoolSizeRatio::new(vk::DescriptorType::SAMPLER, 0.1)]);
        assert_eq!(sizes[0].descriptor_count, 1);
    }

    #[test]
    fn no_pool_before_first_allocation() {
        let allocator = small_allocator();
        assert_eq!(allocator.pool_count(), 0);
        assert_eq!(allocator.sets_per_pool(), 4);
    }

    #[test]
    fn grows_past_one_pool_capacity() {
        let device = FakeDevice::default();
        let mut allocator = small_allocator();

        let sets: Vec<_> = (0..20)
            .map(|_| unsafe { allocator.allocate(&device, layout()) }.unwrap())
            .collect();

        assert_eq!(sets.len(), 20);
        // 4 + 6 + 8 + 8 = 26 >= 20
        assert_eq!(device.created.get(), 4);
        assert_eq!(allocator.pool_count(), 4);
        assert_eq!(allocator.used_count(), 3);
        assert_eq!(allocator.ready_count(), 1);
        assert_eq!(allocator.sets_per_pool(), 8);

        unsafe { allocator.destroy_pools(&device) };
    }

    #[test]
    fn clear_reuses_pools_without_creating_more() {
        let device = FakeDevice::default();
        let mut allocator = small_allocator();

        for _ in 0..20 {
            unsafe { allocator.allocate(&device, layout()) }.unwrap();
        }
        let created = device.created.get();

        unsafe { allocator.clear_pools(&device) }.unwrap();
        assert_eq!(device.resets.get(), created);
        assert_eq!(allocator.ready_count(), created as usize);
        assert_eq!(allocator.used_count(), 0);

        for _ in 0..20 {
            unsafe { allocator.allocate(&device, layout()) }.unwrap();
        }
        assert_eq!(device.created.get(), created);

        unsafe { allocator.destroy_pools(&device) };
    }

    #[test]
    fn destroy_releases_every_handle() {
        let device = FakeDevice::default();
        let mut allocator = small_allocator();
        for _ in 0..11 {
            unsafe { allocator.allocate(&device, layout()) }.unwrap();
        }

        unsafe { allocator.destroy_pools(&device) };

        assert_eq!(device.destroyed.get(), device.created.get());
        assert!(device.pools.borrow().is_empty());
        assert_eq!(allocator.pool_count(), 0);
    }

    #[test]
    fn oversized_set_is_reported() {
        let device = FakeDevice::default();
        let mut allocator = small_allocator();
        device.reject_all.set(true);

        let err = unsafe { allocator.allocate(&device, layout()) }.unwrap_err();
        assert!(matches!(err, GpuError::AllocationFailed(_)));
        assert_eq!(allocator.pool_count(), 2);

        unsafe { allocator.destroy_pools(&device) };
        assert_eq!(device.destroyed.get(), 2);
    }

    #[test]
    fn growth_is_capped() {
        let device = FakeDevice::default();
        let config = DescriptorAllocatorConfig::default()
            .initial_sets(100)
            .growth_factor(10.0)
            .max_sets(250);
        let mut allocator = GrowableDescriptorAllocator::new(config, &MemoryTracker::shared());

        unsafe { allocator.allocate(&device, layout()) }.unwrap();
        assert_eq!(allocator.sets_per_pool(), 250);

        unsafe { allocator.destroy_pools(&device) };
    }
}
