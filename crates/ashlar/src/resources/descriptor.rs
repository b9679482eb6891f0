use std::sync::Arc;

use ahash::AHashMap;
use ash::vk;

use crate::{context::Device, error::DescriptorError};

use super::Buffer;

#[cfg(feature = "shader_reflection")]
pub(crate) mod shader_interface;

///One binding slot of a descriptor set layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub ty: vk::DescriptorType,
    pub count: u32,
    pub stages: vk::ShaderStageFlags,
}

impl DescriptorBinding {
    ///Single uniform buffer at `binding`, visible to `stages`.
    pub fn uniform_buffer(binding: u32, stages: vk::ShaderStageFlags) -> Self {
        DescriptorBinding {
            binding,
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            count: 1,
            stages,
        }
    }

    pub fn as_layout_binding(&self) -> vk::DescriptorSetLayoutBinding {
        vk::DescriptorSetLayoutBinding {
            binding: self.binding,
            descriptor_type: self.ty,
            descriptor_count: self.count,
            stage_flags: self.stages,
            p_immutable_samplers: core::ptr::null(),
        }
    }
}

impl From<vk::DescriptorSetLayoutBinding> for DescriptorBinding {
    fn from(b: vk::DescriptorSetLayoutBinding) -> Self {
        DescriptorBinding {
            binding: b.binding,
            ty: b.descriptor_type,
            count: b.descriptor_count,
            stages: b.stage_flags,
        }
    }
}

/// Wrapped descriptor set layout. Can either be created through [new](DescriptorSetLayout::new), or by filling
/// the struct. Handles on-drop destruction of the resource.
pub struct DescriptorSetLayout {
    pub device: Arc<Device>,
    pub inner: vk::DescriptorSetLayout,
    ///The bindings this layout was created from.
    pub bindings: Vec<DescriptorBinding>,
}

impl DescriptorSetLayout {
    ///Generates a descriptor set layout from a set of bindings. The easiest way to obtain those is to use
    /// [reflection](shader_interface::Reflection), or by hand.
    pub fn new(device: &Arc<Device>, bindings: &[DescriptorBinding]) -> Result<Self, DescriptorError> {
        let raw = bindings
            .iter()
            .map(|b| b.as_layout_binding())
            .collect::<Vec<_>>();
        let info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&raw);

        let layout = unsafe { device.inner.create_descriptor_set_layout(&info, None)? };

        Ok(DescriptorSetLayout {
            device: device.clone(),
            inner: layout,
            bindings: bindings.to_vec(),
        })
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .inner
                .destroy_descriptor_set_layout(self.inner, None)
        }
    }
}

///Sums up the descriptors of all `layouts`, each allocated `sets_per_layout` times. One size per descriptor type, ordered
/// by type for a stable result. Fails if a count doesn't fit into a `u32`.
pub fn sizes_for_layouts(
    layouts: &[&[DescriptorBinding]],
    sets_per_layout: u32,
) -> Result<Vec<vk::DescriptorPoolSize>, DescriptorError> {
    let mut map: AHashMap<vk::DescriptorType, u32> = AHashMap::default();
    for binding in layouts.iter().flat_map(|l| l.iter()) {
        let overflow = || DescriptorError::CountOverflow {
            count: binding.count,
            sets: sets_per_layout,
        };
        let count = binding.count.checked_mul(sets_per_layout).ok_or_else(overflow)?;
        let entry = map.entry(binding.ty).or_insert(0);
        *entry = entry.checked_add(count).ok_or_else(overflow)?;
    }

    let mut sizes = map
        .into_iter()
        .map(|(ty, descriptor_count)| vk::DescriptorPoolSize {
            ty,
            descriptor_count,
        })
        .collect::<Vec<_>>();
    sizes.sort_by_key(|s| s.ty.as_raw());
    Ok(sizes)
}

///Number of sets a pool for `layout_count` layouts, each allocated `sets_per_layout` times, has to hold.
pub fn max_sets_for(layout_count: usize, sets_per_layout: u32) -> Result<u32, DescriptorError> {
    if layout_count == 0 || sets_per_layout == 0 {
        return Err(DescriptorError::NoLayouts);
    }
    u32::try_from(layout_count)
        .ok()
        .and_then(|count| count.checked_mul(sets_per_layout))
        .ok_or(DescriptorError::CountOverflow {
            count: u32::try_from(layout_count).unwrap_or(u32::MAX),
            sets: sets_per_layout,
        })
}

pub struct DescriptorPool {
    pub device: Arc<Device>,
    ///actual inner pool
    pub inner: vk::DescriptorPool,
    ///Allocatable sizes
    pub sizes: AHashMap<vk::DescriptorType, u32>,
    pub max_sets: u32,

    ///True if descriptor sets can be freed for this pool
    pub can_free: bool,
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        //implicitly frees all sets allocated from it
        unsafe { self.device.inner.destroy_descriptor_pool(self.inner, None) }
    }
}

impl DescriptorPool {
    ///Simple [vk::DescriptorPool](ash::vk::DescriptorPool) creation wrapper.
    pub fn new(
        device: &Arc<Device>,
        flags: vk::DescriptorPoolCreateFlags,
        sizes: &[vk::DescriptorPoolSize],
        max_sets: u32,
    ) -> Result<Self, DescriptorError> {
        let create_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(flags)
            .max_sets(max_sets)
            .pool_sizes(sizes);

        let pool = unsafe { device.inner.create_descriptor_pool(&create_info, None)? };

        let can_free = flags.contains(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);

        Ok(DescriptorPool {
            can_free,
            device: device.clone(),
            inner: pool,
            max_sets,
            sizes: sizes.iter().fold(AHashMap::default(), |mut map, size| {
                *map.entry(size.ty).or_insert(0) += size.descriptor_count;
                map
            }),
        })
    }

    ///Creates a pool that can hold `sets_per_layout` sets of every layout in `layouts`.
    pub fn new_for_layouts(
        device: &Arc<Device>,
        flags: vk::DescriptorPoolCreateFlags,
        layouts: &[&DescriptorSetLayout],
        sets_per_layout: u32,
    ) -> Result<Self, DescriptorError> {
        let bindings = layouts
            .iter()
            .map(|l| l.bindings.as_slice())
            .collect::<Vec<_>>();
        let max_sets = max_sets_for(layouts.len(), sets_per_layout)?;
        let sizes = sizes_for_layouts(&bindings, sets_per_layout)?;
        Self::new(device, flags, &sizes, max_sets)
    }
}

///Trait that exposes allocation and freeing capabilities of a descriptor pool implementation. The simplest implementation is the
/// [DescriptorPool](DescriptorPool). Other implementations might implement self-growth of the pool or other techniques.
pub trait DescriptorAllocator {
    ///Tries to allocate one descriptor set per entry in `layouts`. Might fail, for instance if no descriptors of a certain type are left.
    fn allocate(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<DescriptorSet<Self>>, DescriptorError>
    where
        Self: Sized;
    ///Tries to free `set`. Note that `set.inner` becomes invalid by this operation
    fn free(&self, set: &vk::DescriptorSet) -> Result<(), DescriptorError>;
    fn can_free(&self) -> bool;
    ///provides the device this pool was created on
    fn device(&self) -> &ash::Device;
}

impl DescriptorAllocator for Arc<DescriptorPool> {
    fn allocate(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<DescriptorSet<Self>>, DescriptorError> {
        let create_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.inner)
            .set_layouts(layouts);

        let sets = unsafe { self.device.inner.allocate_descriptor_sets(&create_info)? };

        if sets.len() != layouts.len() {
            return Err(DescriptorError::Allocation {
                requested: layouts.len(),
                count: sets.len(),
            });
        }

        Ok(sets
            .into_iter()
            .map(|inner| DescriptorSet {
                inner,
                is_freed: false,
                parent_pool: self.clone(),
            })
            .collect())
    }

    fn free(&self, set: &vk::DescriptorSet) -> Result<(), DescriptorError> {
        if self.can_free {
            unsafe {
                self.device
                    .inner
                    .free_descriptor_sets(self.inner, core::slice::from_ref(set))?
            };
            Ok(())
        } else {
            Err(DescriptorError::UnFreeable)
        }
    }

    fn can_free(&self) -> bool {
        self.can_free
    }

    fn device(&self) -> &ash::Device {
        &self.device.inner
    }
}

///Simple wrapper around [vk::DescriptorSet](ash::vk::DescriptorSet). Keeps its pool alive and frees itself on drop if the pool allows it.
/// Otherwise the set is reclaimed once the pool is destroyed.
pub struct DescriptorSet<P>
where
    P: DescriptorAllocator,
{
    ///The pool this set was allocated from. Is used when dropping `self` if the pool implements freeing allocations.
    pub parent_pool: P,
    pub is_freed: bool,
    pub inner: vk::DescriptorSet,
}

impl<P> DescriptorSet<P>
where
    P: DescriptorAllocator,
{
    ///Executes the write operation on the descriptor set. Does no checking against the descriptor sets layout. If validation is
    ///activated this might fail.
    ///
    /// the `set` field of `write` is update with this descriptor set's handle before execution.
    pub fn write(&mut self, write: vk::WriteDescriptorSetBuilder<'_>) {
        let write = write.dst_set(self.inner);

        unsafe {
            self.parent_pool
                .device()
                .update_descriptor_sets(core::slice::from_ref(&write), &[])
        }
    }

    ///Points `binding` to the first `range` bytes of `buffer`.
    pub fn write_uniform_buffer(&mut self, binding: u32, buffer: &Buffer, range: vk::DeviceSize) {
        let info = vk::DescriptorBufferInfo {
            buffer: buffer.inner,
            offset: 0,
            range,
        };
        let write = vk::WriteDescriptorSet::builder()
            .dst_binding(binding)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(core::slice::from_ref(&info));
        self.write(write);
    }
}

impl<P> Drop for DescriptorSet<P>
where
    P: DescriptorAllocator,
{
    fn drop(&mut self) {
        if self.is_freed || !self.parent_pool.can_free() {
            return;
        }
        self.is_freed = true;
        if let Err(_e) = self.parent_pool.free(&self.inner) {
            #[cfg(feature = "logging")]
            log::error!("Failed to free descriptor set: {}", _e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(DescriptorSetLayout: Send, Sync);
        assert_impl_all!(DescriptorPool: Send, Sync);
        assert_impl_all!(DescriptorSet<Arc<DescriptorPool>>: Send, Sync);
    }

    #[test]
    fn uniform_binding_conversion() {
        let binding = DescriptorBinding::uniform_buffer(3, vk::ShaderStageFlags::VERTEX);
        let raw = binding.as_layout_binding();
        assert_eq!(raw.binding, 3);
        assert_eq!(raw.descriptor_count, 1);
        assert_eq!(raw.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert!(raw.p_immutable_samplers.is_null());
        assert_eq!(DescriptorBinding::from(raw), binding);
    }

    #[test]
    fn pool_sizes_sum_per_type() {
        let stages = vk::ShaderStageFlags::ALL_GRAPHICS;
        let a = [
            DescriptorBinding::uniform_buffer(0, stages),
            DescriptorBinding {
                binding: 1,
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                count: 4,
                stages,
            },
        ];
        let b = [DescriptorBinding::uniform_buffer(0, stages)];

        let sizes = sizes_for_layouts(&[&a[..], &b[..]], 2).unwrap();
        assert_eq!(sizes.len(), 2);
        //COMBINED_IMAGE_SAMPLER (1) sorts before UNIFORM_BUFFER (6)
        assert_eq!(sizes[0].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(sizes[0].descriptor_count, 8);
        assert_eq!(sizes[1].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[1].descriptor_count, 4);
    }

    #[test]
    fn no_layouts_no_sizes() {
        assert!(sizes_for_layouts(&[], 3).unwrap().is_empty());
    }

    #[test]
    fn descriptor_counts_do_not_overflow() {
        let huge = [DescriptorBinding {
            binding: 0,
            ty: vk::DescriptorType::STORAGE_BUFFER,
            count: u32::MAX / 2,
            stages: vk::ShaderStageFlags::COMPUTE,
        }];
        assert!(matches!(
            sizes_for_layouts(&[&huge[..]], 3),
            Err(DescriptorError::CountOverflow { sets: 3, .. })
        ));
        //each fits alone, but not summed up
        assert!(matches!(
            sizes_for_layouts(&[&huge[..], &huge[..]], 2),
            Err(DescriptorError::CountOverflow { .. })
        ));
    }

    #[test]
    fn pool_needs_at_least_one_set() {
        assert_eq!(max_sets_for(2, 3).unwrap(), 6);
        assert!(matches!(max_sets_for(0, 3), Err(DescriptorError::NoLayouts)));
        assert!(matches!(max_sets_for(1, 0), Err(DescriptorError::NoLayouts)));
        assert!(matches!(
            max_sets_for(2, u32::MAX),
            Err(DescriptorError::CountOverflow { count: 2, .. })
        ));
    }
}
