//! ## Allocator
//!
//! In Vulkan the application itself is responsible for allocating memory.
//! Most of the time however this will be done trough some external allocator.
//!
//! ashlar therefore only defines the `Allocator` trait, which is what [Buffer](crate::resources::Buffer) is created through.
//!
//! A default implementation based on [Traverse Research's](https://github.com/Traverse-Research/gpu-allocator) `gpu-allocator` crate is included trough the `default_allocator` feature that is enabled by default.

use std::sync::{Arc, Mutex};

use ash::vk;

#[cfg(feature = "default_allocator")]
mod gpu_allocator;

///Types of memory usage. Make sure to use GpuOnly wherever it applies to get optimal performance.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MemoryUsage {
    Unknown,
    GpuOnly,
    CpuToGpu,
    GpuToCpu,
}

impl MemoryUsage {
    ///True if the CPU can map memory of this usage.
    pub fn is_host_visible(&self) -> bool {
        matches!(self, MemoryUsage::CpuToGpu | MemoryUsage::GpuToCpu)
    }
}

///An allocation that frees itself when dropped.
pub struct ManagedAllocation<A: Allocator + Send + 'static> {
    pub allocator: Arc<Mutex<A>>,
    pub allocation: Option<<A as Allocator>::Allocation>,
}

impl<A: Allocator + Send + 'static> ManagedAllocation<A> {
    ///Returns false if the allocation is for some reason invalid, aka. shouldn't be used.
    pub fn is_valid(&self) -> bool {
        self.allocation.is_some()
    }

    pub fn memory(&self) -> Option<vk::DeviceMemory> {
        self.allocation.as_ref().map(|a| a.memory())
    }

    pub fn offset(&self) -> Option<u64> {
        self.allocation.as_ref().map(|a| a.offset())
    }

    pub fn mapped_slice(&self) -> Option<&[u8]> {
        self.allocation.as_ref().and_then(|a| a.mapped_slice())
    }

    pub fn mapped_slice_mut(&mut self) -> Option<&mut [u8]> {
        self.allocation.as_mut().and_then(|a| a.mapped_slice_mut())
    }
}

impl<A: Allocator + Send + 'static> Drop for ManagedAllocation<A> {
    fn drop(&mut self) {
        let allocation = match self.allocation.take() {
            Some(a) => a,
            None => return,
        };

        match self.allocator.lock() {
            Ok(mut lck) => {
                if let Err(_e) = lck.free(allocation) {
                    //NOTE: failed free happens "silently" as in, we don't panic. The allocator
                    //      won't hand out that memory again anyways.
                    #[cfg(feature = "logging")]
                    log::error!("Freeing allocation failed with: {}", _e);
                }
            }
            Err(_) => {
                #[cfg(feature = "logging")]
                log::warn!("Could not free managed allocation, allocator lock is poisoned");
            }
        }
    }
}

///Implemented for all managed allocations. Allows [Buffer](crate::resources::Buffer) to hide its allocator type.
pub trait AnonymAllocation {
    fn as_slice_ref(&self) -> Option<&[u8]>;
    fn as_slice_mut(&mut self) -> Option<&mut [u8]>;
}

impl<A: Allocator + Send + 'static> AnonymAllocation for ManagedAllocation<A> {
    fn as_slice_ref(&self) -> Option<&[u8]> {
        self.mapped_slice()
    }

    fn as_slice_mut(&mut self) -> Option<&mut [u8]> {
        self.mapped_slice_mut()
    }
}

///Abstract allocation trait that allows finding the memory handle of an allocation, as well as its offset on that memory.
pub trait Allocation {
    fn memory(&self) -> vk::DeviceMemory;
    fn offset(&self) -> u64;
    fn size(&self) -> u64;
    ///Host visible view of the allocation, `None` if the memory is not mapped.
    fn mapped_slice(&self) -> Option<&[u8]>;
    fn mapped_slice_mut(&mut self) -> Option<&mut [u8]>;
}

///Trait that can be implemented by anything that can handle allocation for a initialized [ash::Device](ash::Device).
pub trait Allocator {
    type Allocation: Allocation + Send + Sync + 'static;
    type AllocationError: std::error::Error + Send + Sync + 'static;
    ///creates a single allocation (possibly tagged via `name` for debugging).
    fn allocate(
        &mut self,
        name: Option<&str>,
        requirements: vk::MemoryRequirements,
        usage: MemoryUsage,
        is_linear: bool,
    ) -> Result<Self::Allocation, Self::AllocationError>;

    ///Frees a allocation
    fn free(&mut self, allocation: Self::Allocation) -> Result<(), Self::AllocationError>;

    ///Allocates for a provided buffer
    fn allocate_buffer(
        &mut self,
        device: &ash::Device,
        name: Option<&str>,
        buffer: &vk::Buffer,
        usage: MemoryUsage,
    ) -> Result<Self::Allocation, Self::AllocationError> {
        let requirements = unsafe { device.get_buffer_memory_requirements(*buffer) };
        //NOTE: Buffers are always "linear" in memory
        self.allocate(name, requirements, usage, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_visibility() {
        assert!(MemoryUsage::CpuToGpu.is_host_visible());
        assert!(MemoryUsage::GpuToCpu.is_host_visible());
        assert!(!MemoryUsage::GpuOnly.is_host_visible());
        assert!(!MemoryUsage::Unknown.is_host_visible());
    }
}
