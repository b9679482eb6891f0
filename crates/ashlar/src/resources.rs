mod image;
pub use image::{ImageView, ImgViewDesc};

mod buffer;
pub use buffer::{BufDesc, Buffer};

mod push_constant;
pub use push_constant::PushConstant;

mod descriptor;
#[cfg(feature = "shader_reflection")]
pub use descriptor::shader_interface::Reflection;
pub use descriptor::{
    max_sets_for, sizes_for_layouts, DescriptorAllocator, DescriptorBinding, DescriptorPool, DescriptorSet,
    DescriptorSetLayout,
};

pub mod pipeline;
pub use pipeline::{
    compute::ComputePipeline, graphics::GraphicsPipeline, ColorBlend, FixedFunctionState,
    PipelineLayout,
};

pub mod render_pass;
pub use render_pass::RenderPass;

mod framebuffer;
pub use framebuffer::Framebuffer;

mod command_buffer;
pub use command_buffer::{CommandBuffer, CommandBufferAllocator, CommandPool};

mod shader_module;
#[cfg(feature = "shader_compiler")]
pub use shader_module::compile_glsl;
pub use shader_module::{ShaderKind, ShaderModule, ShaderStage};

use smallvec::SmallVec;

///How a resource is shared between queue families.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SharingMode {
    Exclusive,
    Concurrent {
        ///The queue family indices of families that can access the resource concurrently.
        queue_family_indices: SmallVec<[u32; 4]>,
    },
}
