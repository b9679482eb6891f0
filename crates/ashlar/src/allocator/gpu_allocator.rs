use ash::vk;
use gpu_allocator::{
    vulkan::{AllocationCreateDesc, AllocationScheme},
    MemoryLocation,
};

use super::{Allocation, MemoryUsage};

pub fn memory_usage_to_location(usage: MemoryUsage) -> MemoryLocation {
    match usage {
        MemoryUsage::CpuToGpu => MemoryLocation::CpuToGpu,
        MemoryUsage::GpuOnly => MemoryLocation::GpuOnly,
        MemoryUsage::GpuToCpu => MemoryLocation::GpuToCpu,
        MemoryUsage::Unknown => MemoryLocation::Unknown,
    }
}

impl Allocation for gpu_allocator::vulkan::Allocation {
    fn memory(&self) -> vk::DeviceMemory {
        unsafe { gpu_allocator::vulkan::Allocation::memory(self) }
    }

    fn offset(&self) -> u64 {
        gpu_allocator::vulkan::Allocation::offset(self)
    }

    fn size(&self) -> u64 {
        gpu_allocator::vulkan::Allocation::size(self)
    }

    fn mapped_slice(&self) -> Option<&[u8]> {
        gpu_allocator::vulkan::Allocation::mapped_slice(self)
    }

    fn mapped_slice_mut(&mut self) -> Option<&mut [u8]> {
        gpu_allocator::vulkan::Allocation::mapped_slice_mut(self)
    }
}

///Default memory allocator implementation.
impl super::Allocator for gpu_allocator::vulkan::Allocator {
    type Allocation = gpu_allocator::vulkan::Allocation;
    type AllocationError = gpu_allocator::AllocationError;

    fn allocate(
        &mut self,
        name: Option<&str>,
        requirements: vk::MemoryRequirements,
        usage: MemoryUsage,
        is_linear: bool,
    ) -> Result<Self::Allocation, Self::AllocationError> {
        let alloc_desc = AllocationCreateDesc {
            linear: is_linear,
            location: memory_usage_to_location(usage),
            name: name.unwrap_or("ashlar allocation"),
            requirements,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        };

        gpu_allocator::vulkan::Allocator::allocate(self, &alloc_desc)
    }

    ///Frees a allocation
    fn free(&mut self, allocation: Self::Allocation) -> Result<(), Self::AllocationError> {
        gpu_allocator::vulkan::Allocator::free(self, allocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_maps_to_location() {
        assert_eq!(
            memory_usage_to_location(MemoryUsage::CpuToGpu),
            MemoryLocation::CpuToGpu
        );
        assert_eq!(
            memory_usage_to_location(MemoryUsage::GpuOnly),
            MemoryLocation::GpuOnly
        );
    }
}
