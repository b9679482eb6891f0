//!# Push Constants
//! Push constants are small blocks of data that are recorded directly into a command buffer. They are best used for data
//! that changes every draw, like a transform or a frame time.

use ash::vk;

///A push constant with some data. The range is derived from `T` and the given offset.
pub struct PushConstant<T: bytemuck::Pod> {
    inner_range: vk::PushConstantRange,
    content: T,
}

impl<T: bytemuck::Pod> PushConstant<T> {
    ///Creates a new push constant at offset 0, visible to `stages`.
    pub fn new(content: T, stages: vk::ShaderStageFlags) -> Self {
        Self::new_at(content, stages, 0)
    }

    ///Same as [new](PushConstant::new), but places the block at `offset` bytes. Vulkan requires both offset and size to be
    /// a multiple of 4.
    pub fn new_at(content: T, stages: vk::ShaderStageFlags, offset: u32) -> Self {
        let inner_range = vk::PushConstantRange {
            stage_flags: stages,
            offset,
            size: core::mem::size_of::<T>() as u32,
        };

        PushConstant {
            inner_range,
            content,
        }
    }

    pub fn range(&self) -> &vk::PushConstantRange {
        &self.inner_range
    }

    pub fn get_content(&self) -> &T {
        &self.content
    }

    pub fn get_content_mut(&mut self) -> &mut T {
        &mut self.content
    }

    pub fn get_stage(&self) -> vk::ShaderStageFlags {
        self.inner_range.stage_flags
    }

    pub fn content_as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(&self.content)
    }

    ///Records the push into `command_buffer`. `layout` must contain this constant's range.
    pub fn push(&self, device: &ash::Device, command_buffer: vk::CommandBuffer, layout: vk::PipelineLayout) {
        unsafe {
            device.cmd_push_constants(
                command_buffer,
                layout,
                self.inner_range.stage_flags,
                self.inner_range.offset,
                self.content_as_bytes(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    struct Transform {
        offset: [f32; 2],
        scale: f32,
        time: f32,
    }

    #[test]
    fn range_follows_type() {
        let pc = PushConstant::new(
            Transform {
                offset: [0.0; 2],
                scale: 1.0,
                time: 0.0,
            },
            vk::ShaderStageFlags::VERTEX,
        );
        assert_eq!(pc.range().offset, 0);
        assert_eq!(pc.range().size, 16);
        assert_eq!(pc.get_stage(), vk::ShaderStageFlags::VERTEX);
        assert_eq!(pc.content_as_bytes().len(), 16);
    }

    #[test]
    fn content_is_mutable() {
        let mut pc = PushConstant::new_at(0u32, vk::ShaderStageFlags::FRAGMENT, 16);
        *pc.get_content_mut() = 7;
        assert_eq!(pc.range().offset, 16);
        assert_eq!(pc.content_as_bytes(), &7u32.to_ne_bytes());
    }
}
