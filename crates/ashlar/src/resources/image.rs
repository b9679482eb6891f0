use ash::vk;

use crate::context::Device;
use std::sync::Arc;

///Describes all static parameters of an image view. Usually created through [ImgViewDesc::color_2d]
/// and then altered if needed. Usually only the subresource range is changed.
#[derive(Clone, Copy, Debug)]
pub struct ImgViewDesc {
    pub view_type: vk::ImageViewType,
    pub format: vk::Format,
    pub component_mapping: vk::ComponentMapping,
    pub range: vk::ImageSubresourceRange,
}

impl ImgViewDesc {
    ///2D colour view with identity swizzle over the first mip level and array layer.
    pub fn color_2d(format: vk::Format) -> Self {
        ImgViewDesc {
            view_type: vk::ImageViewType::TYPE_2D,
            format,
            component_mapping: vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            },
            range: vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
        }
    }

    ///Overwrites all fields (that apply) of `build` with the data in `self`
    pub fn set_on_builder<'a>(
        &'a self,
        builder: vk::ImageViewCreateInfoBuilder<'a>,
    ) -> vk::ImageViewCreateInfoBuilder<'a> {
        builder
            .components(self.component_mapping)
            .view_type(self.view_type)
            .format(self.format)
            .subresource_range(self.range)
    }

    pub fn with_aspect(mut self, aspect_flag: vk::ImageAspectFlags) -> Self {
        self.range.aspect_mask = aspect_flag;
        self
    }
}

///[vk::ImageView](ash::vk::ImageView) wrapper that safes its description data and destroys itself when not in use anymore.
///
/// The source image is not owned. For swapchain images the [Swapchain](crate::swapchain::Swapchain) makes sure the views
/// are dropped before the images go away.
pub struct ImageView {
    pub desc: ImgViewDesc,
    pub device: Arc<Device>,
    pub view: vk::ImageView,
    pub image: vk::Image,
}

impl ImageView {
    pub fn new(device: &Arc<Device>, image: vk::Image, desc: ImgViewDesc) -> Result<Self, vk::Result> {
        let mut builder = vk::ImageViewCreateInfo::builder().image(image);
        builder = desc.set_on_builder(builder);

        let view = unsafe { device.inner.create_image_view(&builder, None)? };

        Ok(ImageView {
            desc,
            device: device.clone(),
            view,
            image,
        })
    }

    ///Shortcut for a [color_2d](ImgViewDesc::color_2d) view of `image`.
    pub fn new_2d(device: &Arc<Device>, image: vk::Image, format: vk::Format) -> Result<Self, vk::Result> {
        Self::new(device, image, ImgViewDesc::color_2d(format))
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_image_view(self.view, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(ImageView: Send, Sync);
    }

    #[test]
    fn color_view_is_single_level_identity() {
        let desc = ImgViewDesc::color_2d(vk::Format::B8G8R8A8_SRGB);
        assert_eq!(desc.view_type, vk::ImageViewType::TYPE_2D);
        assert_eq!(desc.component_mapping.r, vk::ComponentSwizzle::IDENTITY);
        assert_eq!(desc.component_mapping.a, vk::ComponentSwizzle::IDENTITY);
        assert_eq!(desc.range.level_count, 1);
        assert_eq!(desc.range.layer_count, 1);
        assert_eq!(desc.range.aspect_mask, vk::ImageAspectFlags::COLOR);

        let depth = desc.with_aspect(vk::ImageAspectFlags::DEPTH);
        assert_eq!(depth.range.aspect_mask, vk::ImageAspectFlags::DEPTH);
    }
}
