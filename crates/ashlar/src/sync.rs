//! # Synchronisation
//!
//! ashlar uses a thin wrapper around Vulkan's native synchronisation primitives. There are mainly
//! - semaphores: binary semaphores order work on the GPU, for instance "render only after the swapchain image was acquired" and
//!   "present only after rendering finished".
//! - fences: let the host wait for the GPU. The frame loop uses one per frame in flight, so the CPU never records into a command
//!   buffer that is still executing.
//!
//! ## Frames in flight
//!
//! Each frame in flight owns a [FrameSync]. Its fence is created in the signaled state, which lets the very first wait on it
//! return immediately. The fence is only reset right before the next submit, so a frame that is skipped (for instance because the
//! swapchain was out of date) never leaves an unsignaled fence behind.

use crate::context::Device;
use crate::error::SyncError;
use ash::vk;
use std::sync::Arc;

///Binary semaphore.
pub struct Semaphore {
    pub inner: vk::Semaphore,
    pub device: Arc<Device>,
}

impl Semaphore {
    pub fn new(device: &Arc<Device>) -> Result<Self, SyncError> {
        let ci = vk::SemaphoreCreateInfo::builder();
        let semaphore = unsafe { device.inner.create_semaphore(&ci, None)? };

        Ok(Semaphore {
            inner: semaphore,
            device: device.clone(),
        })
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_semaphore(self.inner, None) }
    }
}

///Host-device synchronisation primitive.
pub struct Fence {
    pub inner: vk::Fence,
    pub device: Arc<Device>,
}

impl Fence {
    ///Creates a fence. If `signaled` is true the first [wait](Fence::wait) won't block.
    pub fn new(device: &Arc<Device>, signaled: bool) -> Result<Self, SyncError> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let ci = vk::FenceCreateInfo::builder().flags(flags);
        let fence = unsafe { device.inner.create_fence(&ci, None)? };

        Ok(Fence {
            inner: fence,
            device: device.clone(),
        })
    }

    ///Blocks until the fence is signaled, or `timeout` (in nanoseconds) passed.
    pub fn wait(&self, timeout: u64) -> Result<(), SyncError> {
        match unsafe {
            self.device
                .inner
                .wait_for_fences(core::slice::from_ref(&self.inner), true, timeout)
        } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(SyncError::Timeout(timeout)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn reset(&self) -> Result<(), SyncError> {
        unsafe {
            self.device
                .inner
                .reset_fences(core::slice::from_ref(&self.inner))?
        };
        Ok(())
    }

    pub fn is_signaled(&self) -> Result<bool, SyncError> {
        Ok(unsafe { self.device.inner.get_fence_status(self.inner)? })
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_fence(self.inner, None) }
    }
}

///Primitives owned by one frame in flight.
pub struct FrameSync {
    ///Signaled by the presentation engine once the acquired image can be rendered to.
    pub image_available: Semaphore,
    ///Signaled once the frame's submission finished executing. Created signaled.
    pub in_flight: Fence,
}

impl FrameSync {
    pub fn new(device: &Arc<Device>) -> Result<Self, SyncError> {
        Ok(FrameSync {
            image_available: Semaphore::new(device)?,
            in_flight: Fence::new(device, true)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Semaphore: Send, Sync);
        assert_impl_all!(Fence: Send, Sync);
        assert_impl_all!(FrameSync: Send, Sync);
    }
}
