use std::sync::Arc;

use ash::vk;

use crate::context::{Device, Queue};
use crate::error::CommandBufferError;

pub struct CommandPool {
    ///Device this pool was created on.
    pub device: Arc<Device>,
    ///The queue family this pool's buffers can be used on.
    pub queue_family: u32,
    ///the raw vulkan handle.
    pub inner: vk::CommandPool,
    pub can_reset_buffer: bool,
}

impl CommandPool {
    pub fn new(
        device: &Arc<Device>,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self, CommandBufferError> {
        let create_info = vk::CommandPoolCreateInfo::builder()
            .flags(flags)
            .queue_family_index(queue_family);

        let pool = unsafe { device.inner.create_command_pool(&create_info, None)? };

        let can_reset_buffer = flags.contains(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        Ok(CommandPool {
            device: device.clone(),
            inner: pool,
            queue_family,
            can_reset_buffer,
        })
    }

    ///Pool on the device's graphics family whose buffers can be reset individually, which is what per-frame re-recording needs.
    pub fn new_resettable(device: &Arc<Device>) -> Result<Self, CommandBufferError> {
        Self::new(
            device,
            device.families.graphics,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_command_pool(self.inner, None) }
    }
}

impl CommandBufferAllocator for Arc<CommandPool> {
    fn reset(
        &self,
        command_buffer: &vk::CommandBuffer,
        release_resources: bool,
    ) -> Result<(), CommandBufferError> {
        if !self.can_reset_buffer {
            return Err(CommandBufferError::PoolNotResetable);
        }

        let flag = if release_resources {
            vk::CommandBufferResetFlags::RELEASE_RESOURCES
        } else {
            vk::CommandBufferResetFlags::empty()
        };
        unsafe {
            self.device
                .inner
                .reset_command_buffer(*command_buffer, flag)?
        };
        Ok(())
    }

    fn allocate_buffers(
        &self,
        level: vk::CommandBufferLevel,
        count: u32,
    ) -> Result<Vec<CommandBuffer<Self>>, CommandBufferError> {
        let buffers = unsafe {
            self.device.inner.allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::builder()
                    .command_pool(self.inner)
                    .command_buffer_count(count)
                    .level(level),
            )?
        };

        if buffers.len() != count as usize {
            #[cfg(feature = "logging")]
            log::error!(
                "Allocated wrong number of command buffers, expected {}, got {}",
                count,
                buffers.len()
            );
            let allocated = buffers.len();
            if !buffers.is_empty() {
                unsafe {
                    self.device
                        .inner
                        .free_command_buffers(self.inner, &buffers)
                };
            }
            return Err(CommandBufferError::FailedToAllocate {
                allocated,
                count: count as usize,
            });
        }

        Ok(buffers
            .into_iter()
            .map(|inner| CommandBuffer {
                pool: self.clone(),
                inner,
            })
            .collect())
    }

    fn device(&self) -> &ash::Device {
        &self.device.inner
    }
    fn raw(&self) -> &vk::CommandPool {
        &self.inner
    }
}

///Command buffer allocation implementation.
pub trait CommandBufferAllocator {
    ///Tries to reset the command buffer. Might fail, for instance if the pool was not created with the `RESET_COMMAND_BUFFER` flag.
    ///
    /// `release_resources` is a synonym to [this](https://www.khronos.org/registry/vulkan/specs/1.3-extensions/man/html/VkCommandBufferResetFlagBits.html) flag.
    fn reset(
        &self,
        command_buffer: &vk::CommandBuffer,
        release_resources: bool,
    ) -> Result<(), CommandBufferError>;

    ///Allocates `count` command buffers at once. Either all or none are returned.
    fn allocate_buffers(
        &self,
        level: vk::CommandBufferLevel,
        count: u32,
    ) -> Result<Vec<CommandBuffer<Self>>, CommandBufferError>
    where
        Self: Sized;

    ///Allocates a single command buffer.
    fn allocate_buffer(
        &self,
        level: vk::CommandBufferLevel,
    ) -> Result<CommandBuffer<Self>, CommandBufferError>
    where
        Self: Sized,
    {
        self.allocate_buffers(level, 1)?
            .pop()
            .ok_or(CommandBufferError::FailedToAllocate {
                allocated: 0,
                count: 1,
            })
    }

    fn device(&self) -> &ash::Device;
    fn raw(&self) -> &vk::CommandPool;
}

pub struct CommandBuffer<P: CommandBufferAllocator> {
    ///Pool this command buffer was created from. Used for reset operations, and freeing on drop.
    pub pool: P,
    ///the raw vulkan handle
    pub inner: vk::CommandBuffer,
}

impl<P: CommandBufferAllocator> CommandBuffer<P> {
    pub fn reset(&mut self, release_resources: bool) -> Result<(), CommandBufferError> {
        self.pool.reset(&self.inner, release_resources)
    }

    ///Starts recording. `flags` usually is `ONE_TIME_SUBMIT` for per-frame buffers.
    pub fn begin(&mut self, flags: vk::CommandBufferUsageFlags) -> Result<(), CommandBufferError> {
        let begin_info = vk::CommandBufferBeginInfo::builder().flags(flags);
        unsafe {
            self.pool
                .device()
                .begin_command_buffer(self.inner, &begin_info)?
        };
        Ok(())
    }

    pub fn end(&mut self) -> Result<(), CommandBufferError> {
        unsafe { self.pool.device().end_command_buffer(self.inner)? };
        Ok(())
    }

    ///Submits this buffer to `queue`. Each semaphore in `wait` is waited on at the matching stage of `wait_stages`. `fence`
    /// is signaled once execution has finished.
    pub fn submit(
        &self,
        queue: &Queue,
        wait: &[vk::Semaphore],
        wait_stages: &[vk::PipelineStageFlags],
        signal: &[vk::Semaphore],
        fence: vk::Fence,
    ) -> Result<(), CommandBufferError> {
        debug_assert_eq!(wait.len(), wait_stages.len());

        let submit_info = vk::SubmitInfo::builder()
            .command_buffers(core::slice::from_ref(&self.inner))
            .wait_semaphores(wait)
            .wait_dst_stage_mask(wait_stages)
            .signal_semaphores(signal);

        unsafe {
            self.pool
                .device()
                .queue_submit(queue.inner, core::slice::from_ref(&*submit_info), fence)
                .map_err(CommandBufferError::SubmitFailed)
        }
    }
}

impl<P: CommandBufferAllocator> Drop for CommandBuffer<P> {
    fn drop(&mut self) {
        unsafe {
            self.pool
                .device()
                .free_command_buffers(*self.pool.raw(), core::slice::from_ref(&self.inner))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(CommandPool: Send, Sync);
        assert_impl_all!(CommandBuffer<Arc<CommandPool>>: Send, Sync);
    }
}
