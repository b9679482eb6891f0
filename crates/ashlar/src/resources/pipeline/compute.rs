use std::sync::Arc;

use ash::vk;

use crate::{
    context::Device,
    error::PipelineError,
    resources::shader_module::{ShaderKind, ShaderStage},
};

use super::PipelineLayout;

///Pipeline that manages its own lifetime and keeps its layout alive.
pub struct ComputePipeline {
    pub device: Arc<Device>,
    pub pipeline: vk::Pipeline,
    pub layout: Arc<PipelineLayout>,
}

impl ComputePipeline {
    pub fn new(
        device: &Arc<Device>,
        stage: &ShaderStage,
        layout: &Arc<PipelineLayout>,
    ) -> Result<Self, PipelineError> {
        check_compute_stage(stage.kind)?;

        let create_info = vk::ComputePipelineCreateInfo::builder()
            .stage(*stage.as_create_info())
            .layout(layout.layout);

        let mut pipelines = unsafe {
            match device.inner.create_compute_pipelines(
                vk::PipelineCache::null(),
                &[*create_info],
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

        Ok(ComputePipeline {
            device: device.clone(),
            pipeline,
            layout: layout.clone(),
        })
    }
}

fn check_compute_stage(kind: ShaderKind) -> Result<(), PipelineError> {
    if kind.stage_flags() == vk::ShaderStageFlags::COMPUTE {
        Ok(())
    } else {
        Err(PipelineError::WrongStage(kind))
    }
}

impl Drop for ComputePipeline {
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
        assert_impl_all!(ComputePipeline: Send, Sync);
    }

    #[test]
    fn rejects_non_compute_stages() {
        assert!(check_compute_stage(ShaderKind::Compute).is_ok());
        assert!(matches!(
            check_compute_stage(ShaderKind::Vertex),
            Err(PipelineError::WrongStage(ShaderKind::Vertex))
        ));
        assert!(matches!(
            check_compute_stage(ShaderKind::Fragment),
            Err(PipelineError::WrongStage(ShaderKind::Fragment))
        ));
    }
}
