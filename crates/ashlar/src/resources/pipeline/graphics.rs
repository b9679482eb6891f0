use std::sync::Arc;

use super::{FixedFunctionState, PipelineLayout};
use crate::ash::vk;
use crate::context::Device;
use crate::error::PipelineError;
use crate::resources::{RenderPass, ShaderStage};

///Pipeline that manages its own lifetime and keeps resources alive needed for its correct execution, namely its layout and render pass.
pub struct GraphicsPipeline {
    pub device: Arc<Device>,
    pub pipeline: vk::Pipeline,
    pub layout: Arc<PipelineLayout>,
    pub render_pass: Arc<RenderPass>,
    pub subpass: u32,
}

impl GraphicsPipeline {
    ///Assembles the pipeline from its `stages`, the fixed function `state`, the `layout` and the `subpass` of `render_pass` it is used in.
    /// Shader modules can be dropped once the pipeline is created.
    pub fn new(
        device: &Arc<Device>,
        stages: &[ShaderStage],
        state: &FixedFunctionState,
        layout: &Arc<PipelineLayout>,
        render_pass: &Arc<RenderPass>,
        subpass: u32,
    ) -> Result<Self, PipelineError> {
        if stages.is_empty() {
            return Err(PipelineError::NoStages);
        }

        let stage_infos = stages
            .iter()
            .map(|s| s.as_create_info().build())
            .collect::<Vec<_>>();

        let vertex_input = state.vertex_input();
        let input_assembly = state.input_assembly();
        //counts only, the actual rectangles are dynamic
        let viewport = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);
        let rasterization = state.rasterization();
        let multisample = state.multisample();
        let depth_stencil = state.depth_stencil();
        let blend_attachment = state.color_blend_attachment();
        let color_blend = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(core::slice::from_ref(&blend_attachment));
        let dynamic_states = state.dynamic_states();
        let dynamic = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let create_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stage_infos)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic)
            .layout(layout.layout)
            .render_pass(render_pass.inner)
            .subpass(subpass);

        let mut pipelines = unsafe {
            match device.inner.create_graphics_pipelines(
                vk::PipelineCache::null(),
                core::slice::from_ref(&*create_info),
                None,
            ) {
                Ok(p) => p,
                Err((_plines, err)) => {
                    return Err(err.into());
                }
            }
        };

        if pipelines.len() != 1 {
            return Err(PipelineError::Allocation);
        }

        let pipeline = pipelines.remove(0);

        #[cfg(feature = "logging")]
        log::trace!("Created graphics pipeline with {} stages", stages.len());

        Ok(GraphicsPipeline {
            device: device.clone(),
            pipeline,
            layout: layout.clone(),
            render_pass: render_pass.clone(),
            subpass,
        })
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_pipeline(self.pipeline, None) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(GraphicsPipeline: Send, Sync);
    }
}
