use std::{
    hash::{Hash, Hasher},
    sync::{Arc, Mutex},
};

use crate::{
    allocator::{Allocation, Allocator, AnonymAllocation, ManagedAllocation, MemoryUsage},
    context::Device,
    error::BufferError,
};
use ash::vk;

use super::SharingMode;

#[derive(Clone, Debug)]
pub struct BufDesc {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub sharing: SharingMode,
}

impl BufDesc {
    pub fn set_on_builder<'a>(
        &'a self,
        mut builder: vk::BufferCreateInfoBuilder<'a>,
    ) -> vk::BufferCreateInfoBuilder<'a> {
        builder = builder.size(self.size).usage(self.usage);

        match &self.sharing {
            SharingMode::Exclusive => builder = builder.sharing_mode(vk::SharingMode::EXCLUSIVE),
            SharingMode::Concurrent {
                queue_family_indices,
            } => {
                builder = builder
                    .sharing_mode(vk::SharingMode::CONCURRENT)
                    .queue_family_indices(queue_family_indices)
            }
        }

        builder
    }

    ///Exclusive, host written uniform buffer description for `size` bytes.
    pub fn uniform(size: vk::DeviceSize) -> Self {
        BufDesc {
            size,
            usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
            sharing: SharingMode::Exclusive,
        }
    }
}

///Number of bytes that can be written at `offset` into a buffer of `size` bytes when `len` bytes are supplied.
fn writable_len(size: usize, offset: usize, len: usize) -> Result<usize, BufferError> {
    if offset > size {
        return Err(BufferError::OffsetTooLarge);
    }
    Ok(len.min(size - offset))
}

///Self managing buffer that uses the allocator `A` to create the buffer, and free it when dropped.
//Note Freeing happens in `ManagedAllocation`'s implementation.
pub struct Buffer {
    pub desc: BufDesc,
    pub inner: vk::Buffer,
    pub usage: MemoryUsage,
    pub device: Arc<Device>,
    //NOTE: type erased, so buffers of different allocators can be collected in one Vec<Buffer>.
    pub allocation: Box<dyn AnonymAllocation + Send + Sync + 'static>,
}

impl Drop for Buffer {
    fn drop(&mut self) {
        //the allocation is freed after this, when the fields are dropped
        unsafe { self.device.inner.destroy_buffer(self.inner, None) }
    }
}

///The hash implementation is based on [Buffer](ash::vk::Buffer)'s hash.
impl Hash for Buffer {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.inner.hash(hasher)
    }
}

impl Buffer {
    ///Creates a buffer for `description`, allocates memory of `usage` for it and binds the two.
    pub fn new<A: Allocator + Send + 'static>(
        device: &Arc<Device>,
        allocator: &Arc<Mutex<A>>,
        description: BufDesc,
        usage: MemoryUsage,
        name: Option<&str>,
    ) -> Result<Self, BufferError> {
        let mut builder = vk::BufferCreateInfo::builder();
        builder = description.set_on_builder(builder);

        //create buffer handle
        let buffer = unsafe { device.inner.create_buffer(&builder, None)? };

        let allocation = allocator
            .lock()
            .map_err(|_| BufferError::Allocation(String::from("allocator lock is poisoned")))
            .and_then(|mut alloc| {
                alloc
                    .allocate_buffer(&device.inner, name, &buffer, usage)
                    .map_err(|e| BufferError::Allocation(e.to_string()))
            });
        let allocation = match allocation {
            Ok(a) => a,
            Err(e) => {
                unsafe { device.inner.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let (memory, offset) = (allocation.memory(), allocation.offset());
        //from here on the allocation frees itself.
        let buffer = Buffer {
            device: device.clone(),
            allocation: Box::new(ManagedAllocation {
                allocator: allocator.clone(),
                allocation: Some(allocation),
            }),
            usage,
            desc: description,
            inner: buffer,
        };

        unsafe {
            device
                .inner
                .bind_buffer_memory(buffer.inner, memory, offset)?
        };

        Ok(buffer)
    }

    ///Host visible uniform buffer that can hold exactly one `T`.
    pub fn new_uniform<A: Allocator + Send + 'static, T: bytemuck::Pod>(
        device: &Arc<Device>,
        allocator: &Arc<Mutex<A>>,
        name: Option<&str>,
    ) -> Result<Self, BufferError> {
        Self::new(
            device,
            allocator,
            BufDesc::uniform(core::mem::size_of::<T>() as vk::DeviceSize),
            MemoryUsage::CpuToGpu,
            name,
        )
    }

    ///Host visible buffer of `usage` that is initialized to `data`. Usually used for small vertex or index buffers.
    pub fn new_with_data<A: Allocator + Send + 'static, T: bytemuck::Pod>(
        device: &Arc<Device>,
        allocator: &Arc<Mutex<A>>,
        usage: vk::BufferUsageFlags,
        name: Option<&str>,
        data: &[T],
    ) -> Result<Self, BufferError> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let desc = BufDesc {
            size: bytes.len() as vk::DeviceSize,
            usage,
            sharing: SharingMode::Exclusive,
        };
        let mut buffer = Self::new(device, allocator, desc, MemoryUsage::CpuToGpu, name)?;
        buffer.write(0, bytes)?;
        Ok(buffer)
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.desc.size
    }

    ///Writes `data` to the buffer at `offset`.
    ///If `offset + data.len() > buffer.size` only the bytes that fit are written and an error is returned.
    ///
    ///If the buffer is not mapable by the host (usually if the buffer us created with MemoryUsage::GpuOnly) nothing is
    /// written and an error is returned.
    pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), BufferError> {
        if !self.usage.is_host_visible() {
            #[cfg(feature = "logging")]
            log::error!("Tried to map buffer that has usage: {:?}", self.usage);
            return Err(BufferError::NotMapable);
        }

        let write_size = writable_len(self.desc.size as usize, offset, data.len())?;

        let mapped = self
            .allocation
            .as_slice_mut()
            .ok_or(BufferError::NotMapable)?;
        mapped[offset..offset + write_size].copy_from_slice(&data[..write_size]);

        if write_size < data.len() {
            Err(BufferError::PartialyWritten {
                written: write_size,
                size: data.len(),
            })
        } else {
            Ok(())
        }
    }

    ///Writes a single plain-old-data value, for instance a uniform block.
    pub fn write_pod<T: bytemuck::Pod>(&mut self, offset: usize, value: &T) -> Result<(), BufferError> {
        self.write(offset, bytemuck::bytes_of(value))
    }

    ///Returns (if possible) a reference to the buffers data. Note that the data might be aligned, or not even be of one type. Turning this data into actual types should probably be implemented
    /// by whoever knows the actual data layout.
    pub fn read(&self) -> Result<&[u8], BufferError> {
        if !self.usage.is_host_visible() {
            return Err(BufferError::NotMapable);
        }

        self.allocation
            .as_slice_ref()
            .map(|slice| &slice[..(self.desc.size as usize).min(slice.len())])
            .ok_or(BufferError::NotMapable)
    }

    ///Descriptor info that covers the whole buffer.
    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.inner,
            offset: 0,
            range: vk::WHOLE_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Buffer: Send, Sync);
    }

    #[test]
    fn writes_are_clamped_to_buffer() {
        assert_eq!(writable_len(64, 0, 16).unwrap(), 16);
        assert_eq!(writable_len(64, 60, 16).unwrap(), 4);
        assert_eq!(writable_len(64, 64, 16).unwrap(), 0);
        assert!(matches!(
            writable_len(64, 65, 1),
            Err(BufferError::OffsetTooLarge)
        ));
    }

    #[test]
    fn uniform_description() {
        let desc = BufDesc::uniform(64);
        assert_eq!(desc.size, 64);
        assert_eq!(desc.usage, vk::BufferUsageFlags::UNIFORM_BUFFER);
        assert_eq!(desc.sharing, SharingMode::Exclusive);
    }
}
