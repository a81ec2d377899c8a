//! Command pools and one-shot submission.

use crate::error::Result;
use crate::sync::{create_fence, reset_fence, wait_for_fence};
use ash::vk;

/// Command pool bound to one queue family.
pub struct CommandPool {
    pool: vk::CommandPool,
    queue_family: u32,
}

impl CommandPool {
    /// Create a new command pool.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(
        device: &ash::Device,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);

        let pool = unsafe { device.create_command_pool(&create_info, None)? };

        Ok(Self { pool, queue_family })
    }

    /// Get the raw pool handle.
    pub const fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    pub const fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Allocate one primary command buffer.
    ///
    /// # Safety
    /// The device must be the one the pool was created on.
    pub unsafe fn allocate_primary(&self, device: &ash::Device) -> Result<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { device.allocate_command_buffers(&alloc_info)? };
        buffers
            .into_iter()
            .next()
            .ok_or_else(|| vk::Result::ERROR_OUT_OF_HOST_MEMORY.into())
    }

    /// Destroy the command pool and every buffer allocated from it.
    ///
    /// # Safety
    /// No buffer from this pool may be pending execution.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe { device.destroy_command_pool(self.pool, None) };
    }
}

/// Records and submits one-off work, then blocks until the device finishes it.
///
/// This stalls the host on a fence. It is meant for uploads at load time and
/// must stay off the per-frame path.
pub struct ImmediateSubmit {
    pool: CommandPool,
    cmd: vk::CommandBuffer,
    fence: vk::Fence,
}

impl ImmediateSubmit {
    /// Create the pool, command buffer and fence for `queue_family`.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(device: &ash::Device, queue_family: u32) -> Result<Self> {
        let pool = unsafe {
            CommandPool::new(
                device,
                queue_family,
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )?
        };
        let cmd = unsafe { pool.allocate_primary(device)? };
        let fence = unsafe { create_fence(device, false)? };

        Ok(Self { pool, cmd, fence })
    }

    /// Record with `record`, submit to `queue` and wait for completion.
    ///
    /// # Safety
    /// `queue` must belong to the family this was created for, and everything
    /// `record` references must stay alive until this returns.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub unsafe fn submit<F>(&self, device: &ash::Device, queue: vk::Queue, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        unsafe {
            device.reset_command_buffer(self.cmd, vk::CommandBufferResetFlags::empty())?;

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device.begin_command_buffer(self.cmd, &begin_info)?;
            record(device, self.cmd);
            device.end_command_buffer(self.cmd)?;

            let command_buffers = [self.cmd];
            let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
            device.queue_submit(queue, &[submit_info], self.fence)?;

            wait_for_fence(device, self.fence, u64::MAX)?;
            reset_fence(device, self.fence)?;
        }
        Ok(())
    }

    /// Queue family the command pool was created for.
    pub const fn queue_family(&self) -> u32 {
        self.pool.queue_family()
    }

    /// Destroy the fence and the command pool.
    ///
    /// # Safety
    /// No submission may be pending.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_fence(self.fence, None);
            self.pool.destroy(device);
        }
    }
}
