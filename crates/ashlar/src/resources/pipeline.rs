use crate::context::Device;
use crate::error::PipelineError;
use ash::vk;
use std::sync::Arc;

pub mod compute;
pub mod graphics;

pub struct PipelineLayout {
    pub device: Arc<Device>,
    pub layout: vk::PipelineLayout,
}

impl PipelineLayout {
    pub fn new(
        device: &Arc<Device>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self, PipelineError> {
        let create_info = vk::PipelineLayoutCreateInfo::builder()
            .push_constant_ranges(push_constant_ranges)
            .set_layouts(descriptor_set_layouts);

        let layout = unsafe { device.inner.create_pipeline_layout(&create_info, None)? };

        Ok(PipelineLayout {
            device: device.clone(),
            layout,
        })
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_pipeline_layout(self.layout, None) }
    }
}

///How the single colour attachment is blended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorBlend {
    ///Overwrite the attachment.
    Opaque,
    ///Classic `src_alpha, 1 - src_alpha` blending.
    Alpha,
}

///Everything of a graphics pipeline that is neither a shader nor the layout.
///
/// Viewport and scissor are always dynamic, so a pipeline survives swapchain recreation. Set them while recording, or use
/// [FrameLoop](crate::frame::FrameLoop) which does it for you.
#[derive(Clone, Debug)]
pub struct FixedFunctionState {
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub line_width: f32,
    pub samples: vk::SampleCountFlags,
    ///If set, depth testing and writing is enabled with the given compare op.
    pub depth_test: Option<vk::CompareOp>,
    pub blend: ColorBlend,
    ///Additional dynamic state. Viewport and scissor are always added.
    pub extra_dynamic_states: Vec<vk::DynamicState>,
}

impl Default for FixedFunctionState {
    fn default() -> Self {
        FixedFunctionState {
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::CLOCKWISE,
            line_width: 1.0,
            samples: vk::SampleCountFlags::TYPE_1,
            depth_test: None,
            blend: ColorBlend::Opaque,
            extra_dynamic_states: Vec::new(),
        }
    }
}

impl FixedFunctionState {
    pub fn with_vertex_input(
        mut self,
        bindings: Vec<vk::VertexInputBindingDescription>,
        attributes: Vec<vk::VertexInputAttributeDescription>,
    ) -> Self {
        self.vertex_bindings = bindings;
        self.vertex_attributes = attributes;
        self
    }

    pub fn with_depth_test(mut self, op: vk::CompareOp) -> Self {
        self.depth_test = Some(op);
        self
    }

    pub fn with_blend(mut self, blend: ColorBlend) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_cull_mode(mut self, mode: vk::CullModeFlags, front_face: vk::FrontFace) -> Self {
        self.cull_mode = mode;
        self.front_face = front_face;
        self
    }

    pub fn dynamic_states(&self) -> Vec<vk::DynamicState> {
        let mut states = vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        for s in &self.extra_dynamic_states {
            if !states.contains(s) {
                states.push(*s);
            }
        }
        states
    }

    pub fn vertex_input(&self) -> vk::PipelineVertexInputStateCreateInfoBuilder<'_> {
        vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes)
    }

    pub fn input_assembly(&self) -> vk::PipelineInputAssemblyStateCreateInfo {
        vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(self.topology)
            .primitive_restart_enable(false)
            .build()
    }

    pub fn rasterization(&self) -> vk::PipelineRasterizationStateCreateInfo {
        vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(self.polygon_mode)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face)
            .line_width(self.line_width)
            .depth_bias_enable(false)
            .build()
    }

    pub fn multisample(&self) -> vk::PipelineMultisampleStateCreateInfo {
        vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(self.samples)
            .sample_shading_enable(false)
            .min_sample_shading(1.0)
            .build()
    }

    pub fn depth_stencil(&self) -> vk::PipelineDepthStencilStateCreateInfo {
        let (enabled, op) = match self.depth_test {
            Some(op) => (true, op),
            None => (false, vk::CompareOp::ALWAYS),
        };
        vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(enabled)
            .depth_write_enable(enabled)
            .depth_compare_op(op)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0)
            .build()
    }

    pub fn color_blend_attachment(&self) -> vk::PipelineColorBlendAttachmentState {
        let builder = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA);
        let builder = match self.blend {
            ColorBlend::Opaque => builder.blend_enable(false),
            ColorBlend::Alpha => builder
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                .alpha_blend_op(vk::BlendOp::ADD),
        };
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(PipelineLayout: Send, Sync);
        assert_impl_all!(FixedFunctionState: Send, Sync);
    }

    #[test]
    fn defaults_draw_opaque_triangles() {
        let state = FixedFunctionState::default();
        assert_eq!(
            state.input_assembly().topology,
            vk::PrimitiveTopology::TRIANGLE_LIST
        );

        let raster = state.rasterization();
        assert_eq!(raster.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(raster.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(raster.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(raster.line_width, 1.0);

        assert_eq!(
            state.multisample().rasterization_samples,
            vk::SampleCountFlags::TYPE_1
        );
        assert_eq!(state.depth_stencil().depth_test_enable, vk::FALSE);

        let blend = state.color_blend_attachment();
        assert_eq!(blend.blend_enable, vk::FALSE);
        assert_eq!(blend.color_write_mask, vk::ColorComponentFlags::RGBA);
    }

    #[test]
    fn viewport_and_scissor_are_always_dynamic() {
        let state = FixedFunctionState {
            extra_dynamic_states: vec![vk::DynamicState::SCISSOR, vk::DynamicState::LINE_WIDTH],
            ..Default::default()
        };
        assert_eq!(
            state.dynamic_states(),
            vec![
                vk::DynamicState::VIEWPORT,
                vk::DynamicState::SCISSOR,
                vk::DynamicState::LINE_WIDTH
            ]
        );
    }

    #[test]
    fn depth_and_alpha_options() {
        let state = FixedFunctionState::default()
            .with_depth_test(vk::CompareOp::LESS)
            .with_blend(ColorBlend::Alpha);
        let depth = state.depth_stencil();
        assert_eq!(depth.depth_test_enable, vk::TRUE);
        assert_eq!(depth.depth_write_enable, vk::TRUE);
        assert_eq!(depth.depth_compare_op, vk::CompareOp::LESS);

        let blend = state.color_blend_attachment();
        assert_eq!(blend.blend_enable, vk::TRUE);
        assert_eq!(blend.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(
            blend.dst_color_blend_factor,
            vk::BlendFactor::ONE_MINUS_SRC_ALPHA
        );
    }

    #[test]
    fn vertex_input_counts() {
        let state = FixedFunctionState::default().with_vertex_input(
            vec![vk::VertexInputBindingDescription {
                binding: 0,
                stride: 20,
                input_rate: vk::VertexInputRate::VERTEX,
            }],
            vec![
                vk::VertexInputAttributeDescription {
                    location: 0,
                    binding: 0,
                    format: vk::Format::R32G32_SFLOAT,
                    offset: 0,
                },
                vk::VertexInputAttributeDescription {
                    location: 1,
                    binding: 0,
                    format: vk::Format::R32G32B32_SFLOAT,
                    offset: 8,
                },
            ],
        );
        let info = state.vertex_input();
        assert_eq!(info.vertex_binding_description_count, 1);
        assert_eq!(info.vertex_attribute_description_count, 2);
    }
}
