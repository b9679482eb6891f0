use std::sync::Arc;

use ash::vk;

use crate::context::Device;
use crate::error::PipelineError;

///Colour attachment that is cleared on load, stored, and handed to the presentation engine afterwards.
pub fn present_color_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription {
        format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        ..Default::default()
    }
}

///Depth attachment that is cleared on load and discarded after the pass.
pub fn depth_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription {
        format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::DONT_CARE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ..Default::default()
    }
}

///Makes the subpass wait for the swapchain image to be released (signaled through the acquire semaphore at the colour output
/// stage) before writing to it.
pub fn external_dependency(with_depth: bool) -> vk::SubpassDependency {
    let mut stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
    let mut access = vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
    if with_depth {
        stages |= vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
        access |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
    }

    vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: stages,
        src_access_mask: vk::AccessFlags::empty(),
        dst_stage_mask: stages,
        dst_access_mask: access,
        dependency_flags: vk::DependencyFlags::empty(),
    }
}

///Renderpass describing the attachments and subpasses of a draw. Note that this is only a thin wrapper over the creation and destruction process.
pub struct RenderPass {
    pub device: Arc<Device>,
    pub inner: vk::RenderPass,
    ///Number of attachments a framebuffer for this pass needs.
    pub attachment_count: usize,
    ///Format of attachment 0, `UNDEFINED` if the pass has no attachments.
    pub color_format: vk::Format,
}

impl RenderPass {
    pub fn new(
        device: &Arc<Device>,
        create_info: &vk::RenderPassCreateInfo,
    ) -> Result<Self, PipelineError> {
        let color_format = if create_info.attachment_count > 0 && !create_info.p_attachments.is_null() {
            unsafe { (*create_info.p_attachments).format }
        } else {
            vk::Format::UNDEFINED
        };

        let renderpass = unsafe { device.inner.create_render_pass(create_info, None)? };
        Ok(RenderPass {
            device: device.clone(),
            inner: renderpass,
            attachment_count: create_info.attachment_count as usize,
            color_format,
        })
    }

    ///Single subpass pass that renders into a swapchain image of `color_format`, and optionally into a depth buffer of `depth_format`.
    /// The colour attachment is attachment 0, depth (if any) attachment 1.
    pub fn for_swapchain(
        device: &Arc<Device>,
        color_format: vk::Format,
        depth_format: Option<vk::Format>,
    ) -> Result<Self, PipelineError> {
        let mut attachments = vec![present_color_attachment(color_format)];
        if let Some(depth) = depth_format {
            attachments.push(depth_attachment(depth));
        }

        let color_ref = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };

        let mut subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(core::slice::from_ref(&color_ref));
        if depth_format.is_some() {
            subpass = subpass.depth_stencil_attachment(&depth_ref);
        }

        let dependency = external_dependency(depth_format.is_some());

        let create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(core::slice::from_ref(&subpass))
            .dependencies(core::slice::from_ref(&dependency));

        Self::new(device, &create_info)
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_render_pass(self.inner, None) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(RenderPass: Send, Sync);
    }

    #[test]
    fn color_attachment_ends_presentable() {
        let att = present_color_attachment(vk::Format::B8G8R8A8_SRGB);
        assert_eq!(att.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(att.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(att.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(att.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn depth_is_discarded() {
        let att = depth_attachment(vk::Format::D32_SFLOAT);
        assert_eq!(att.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(
            att.final_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
    }

    #[test]
    fn dependency_waits_on_color_output() {
        let dep = external_dependency(false);
        assert_eq!(dep.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(dep.dst_subpass, 0);
        assert_eq!(
            dep.dst_stage_mask,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
        assert_eq!(dep.dst_access_mask, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);

        let dep = external_dependency(true);
        assert!(dep
            .dst_stage_mask
            .contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS));
        assert!(dep
            .dst_access_mask
            .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
    }
}
