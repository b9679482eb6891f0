use std::sync::Arc;

use ash::vk;

use super::RenderPass;
use crate::{context::Device, error::PipelineError, swapchain::Swapchain};

///Framebuffer that keeps its render pass alive. The attachment views are not owned and have to outlive the framebuffer.
pub struct Framebuffer {
    pub device: Arc<Device>,
    pub inner: vk::Framebuffer,
    pub render_pass: Arc<RenderPass>,
    pub extent: vk::Extent2D,
}

impl Framebuffer {
    pub fn new(
        device: &Arc<Device>,
        render_pass: &Arc<RenderPass>,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> Result<Self, PipelineError> {
        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass.inner)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.inner.create_framebuffer(&create_info, None)? };

        Ok(Framebuffer {
            device: device.clone(),
            inner: framebuffer,
            render_pass: render_pass.clone(),
            extent,
        })
    }

    ///One framebuffer per swapchain image, in image order. `depth` is appended as second attachment to each.
    pub fn for_swapchain(
        device: &Arc<Device>,
        render_pass: &Arc<RenderPass>,
        swapchain: &Swapchain,
        depth: Option<vk::ImageView>,
    ) -> Result<Vec<Self>, PipelineError> {
        swapchain
            .views
            .iter()
            .map(|view| {
                let mut attachments = smallvec::SmallVec::<[vk::ImageView; 2]>::new();
                attachments.push(view.view);
                if let Some(depth) = depth {
                    attachments.push(depth);
                }
                Self::new(device, render_pass, &attachments, swapchain.extent())
            })
            .collect()
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_framebuffer(self.inner, None) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Framebuffer: Send, Sync);
    }
}
