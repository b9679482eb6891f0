use std::sync::Arc;

use ash::vk;

use crate::{
    config::RendererConfig,
    context::{Device, Queue, QueueFamilyIndices},
    error::SwapchainError,
    resources::{ImageView, SharingMode},
    surface::{Surface, SurfaceSupport},
    sync::Semaphore,
    util::extent_is_zero,
};

///Picks the first entry of `preference` that the surface lists. If none is listed the first available format is used.
///
/// A surface that only reports `UNDEFINED` has no preferred format at all, in that case the first preference is taken as is.
pub fn choose_surface_format(
    available: &[vk::SurfaceFormatKHR],
    preference: &[vk::SurfaceFormatKHR],
) -> Option<vk::SurfaceFormatKHR> {
    if let [only] = available {
        if only.format == vk::Format::UNDEFINED {
            return preference.first().copied().or(Some(*only));
        }
    }

    preference
        .iter()
        .find(|pref| available.contains(pref))
        .or_else(|| available.first())
        .copied()
}

///First preferred mode that is supported. FIFO is the fallback, since it is the only mode every surface has to support.
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    preference: &[vk::PresentModeKHR],
) -> vk::PresentModeKHR {
    preference
        .iter()
        .find(|pref| available.contains(pref))
        .copied()
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

///Uses the surface's current extent, unless the surface reports `u32::MAX`. In that case the window decides and
/// `window_extent` is clamped into the supported range.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window_extent: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: window_extent.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width.max(capabilities.min_image_extent.width),
        ),
        height: window_extent.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height.max(capabilities.min_image_extent.height),
        ),
    }
}

///Extent a builder starts out with. `u32::MAX` marks a surface whose size is decided by the window, that value is never
/// a usable extent, so it is replaced by an empty one until [SwapchainBuilder::with_extent] provides the window's size.
pub fn initial_extent(capabilities: &vk::SurfaceCapabilitiesKHR) -> vk::Extent2D {
    if capabilities.current_extent.width == u32::MAX || capabilities.current_extent.height == u32::MAX {
        vk::Extent2D::default()
    } else {
        capabilities.current_extent
    }
}

///One more than the minimum, so the driver never blocks us while it still holds an image. A `max_image_count` of zero means
/// "no limit".
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

///Images are shared between graphics and present family if those differ.
pub fn sharing_mode_for(families: &QueueFamilyIndices) -> SharingMode {
    if families.is_shared() {
        SharingMode::Exclusive
    } else {
        SharingMode::Concurrent {
            queue_family_indices: families.unique().into_iter().collect(),
        }
    }
}

///Prefers `OPAQUE`, otherwise takes whatever the surface supports first.
fn choose_composite_alpha(capabilities: &vk::SurfaceCapabilitiesKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::INHERIT,
    ]
    .into_iter()
    .find(|flag| capabilities.supported_composite_alpha.contains(*flag))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

///Settings a swapchain is (re)created from. Everything that is not a preference is resolved against the
/// surface at creation time.
#[derive(Clone, Debug)]
pub struct SwapchainSettings {
    ///Ordered preferred image formats. If none is available, the first supported one is taken.
    pub format_preference: Vec<vk::SurfaceFormatKHR>,
    ///Ordered list of preferred present modes. If none is supported FIFO is used.
    pub present_mode_preference: Vec<vk::PresentModeKHR>,
    ///Extent of the window. Only used if the surface lets the window decide.
    pub extent: vk::Extent2D,
    pub usage: vk::ImageUsageFlags,
    pub is_clipped: bool,
}

impl Default for SwapchainSettings {
    fn default() -> Self {
        SwapchainSettings {
            format_preference: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_mode_preference: vec![vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO],
            extent: vk::Extent2D::default(),
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            is_clipped: true,
        }
    }
}

///Everything that was chosen for one particular swapchain.
#[derive(Clone, Debug)]
pub struct SwapchainDesc {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub sharing_mode: SharingMode,
    pub transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
}

impl SwapchainDesc {
    ///Resolves `settings` against the surface `support`.
    pub fn resolve(
        settings: &SwapchainSettings,
        support: &SurfaceSupport,
        families: &QueueFamilyIndices,
    ) -> Result<Self, SwapchainError> {
        if !support.is_adequate() {
            return Err(SwapchainError::InadequateSurface);
        }

        let format = choose_surface_format(&support.formats, &settings.format_preference)
            .ok_or(SwapchainError::InadequateSurface)?;
        let extent = choose_extent(&support.capabilities, settings.extent);
        if extent_is_zero(extent) {
            return Err(SwapchainError::ZeroExtent(extent));
        }

        Ok(SwapchainDesc {
            format,
            present_mode: choose_present_mode(
                &support.present_modes,
                &settings.present_mode_preference,
            ),
            extent,
            image_count: choose_image_count(&support.capabilities),
            sharing_mode: sharing_mode_for(families),
            transform: support.capabilities.current_transform,
            composite_alpha: choose_composite_alpha(&support.capabilities),
        })
    }
}

pub struct SwapchainBuilder {
    ///Surface based on which the swapchain will be build.
    pub surface: Arc<Surface>,
    ///Device for which the swapchain will be build.
    pub device: Arc<Device>,
    pub settings: SwapchainSettings,
}

impl SwapchainBuilder {
    ///enables you to chain multiple assignments to a constructed builder. For instance
    ///
    ///```ignore
    /// builder.with(|b| b.settings.usage |= ash::vk::ImageUsageFlags::TRANSFER_DST)
    ///    .build()
    ///```
    pub fn with(mut self, mut mapping: impl FnMut(&mut Self)) -> Self {
        mapping(&mut self);
        self
    }

    pub fn with_extent(mut self, extent: vk::Extent2D) -> Self {
        self.settings.extent = extent;
        self
    }

    ///Takes format and present mode preferences from the config.
    pub fn with_config(mut self, config: &RendererConfig) -> Self {
        self.settings.format_preference = vec![config.surface_format.into()];
        self.settings.present_mode_preference = config.present_mode_preference();
        self
    }

    pub fn build(self) -> Result<Swapchain, SwapchainError> {
        let loader = ash::extensions::khr::Swapchain::new(&self.device.instance.inner, &self.device.inner);
        let chain = create_chain(
            &loader,
            &self.device,
            &self.surface,
            &self.settings,
            vk::SwapchainKHR::null(),
        )?;

        Ok(Swapchain {
            views: chain.views,
            images: chain.images,
            desc: chain.desc,
            swapchain: chain.swapchain,
            loader,
            settings: self.settings,
            surface: self.surface,
            device: self.device,
        })
    }
}

struct Chain {
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<ImageView>,
    desc: SwapchainDesc,
}

fn create_chain(
    loader: &ash::extensions::khr::Swapchain,
    device: &Arc<Device>,
    surface: &Surface,
    settings: &SwapchainSettings,
    old_swapchain: vk::SwapchainKHR,
) -> Result<Chain, SwapchainError> {
    let support = SurfaceSupport::query(surface, &device.physical_device)?;
    let desc = SwapchainDesc::resolve(settings, &support, &device.families)?;

    let mut builder = vk::SwapchainCreateInfoKHR::builder()
        .surface(surface.surface)
        .min_image_count(desc.image_count)
        .image_format(desc.format.format)
        .image_color_space(desc.format.color_space)
        .image_extent(desc.extent)
        .image_array_layers(1)
        .image_usage(settings.usage)
        .pre_transform(desc.transform)
        .composite_alpha(desc.composite_alpha)
        .present_mode(desc.present_mode)
        .clipped(settings.is_clipped)
        .old_swapchain(old_swapchain);

    match &desc.sharing_mode {
        SharingMode::Exclusive => builder = builder.image_sharing_mode(vk::SharingMode::EXCLUSIVE),
        SharingMode::Concurrent {
            queue_family_indices,
        } => {
            builder = builder
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(queue_family_indices)
        }
    }

    let swapchain = unsafe { loader.create_swapchain(&builder, None)? };

    let images = match unsafe { loader.get_swapchain_images(swapchain) } {
        Ok(images) => images,
        Err(e) => {
            unsafe { loader.destroy_swapchain(swapchain, None) };
            return Err(e.into());
        }
    };

    //the swapchain owns its images, we only create views for them.
    let views = match images
        .iter()
        .map(|img| ImageView::new_2d(device, *img, desc.format.format))
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(views) => views,
        Err(e) => {
            unsafe { loader.destroy_swapchain(swapchain, None) };
            return Err(e.into());
        }
    };

    #[cfg(feature = "logging")]
    log::info!(
        "Created swapchain: {} images, {:?}, {:?}, {:?}",
        images.len(),
        desc.extent,
        desc.format.format,
        desc.present_mode
    );

    Ok(Chain {
        swapchain,
        images,
        views,
        desc,
    })
}

///Image that was acquired for rendering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AcquiredImage {
    pub index: u32,
    ///The image can still be presented, but the swapchain no longer matches the surface exactly.
    pub suboptimal: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    Optimal,
    Suboptimal,
}

pub struct Swapchain {
    ///One view per image, same order as `images`.
    pub views: Vec<ImageView>,
    ///Images are owned by the swapchain.
    pub images: Vec<vk::Image>,
    pub desc: SwapchainDesc,
    pub swapchain: vk::SwapchainKHR,
    pub loader: ash::extensions::khr::Swapchain,
    ///settings used on recreation.
    pub settings: SwapchainSettings,
    ///associated surface. Needed to keep the surface alive until the swapchain is dropped.
    pub surface: Arc<Surface>,
    pub device: Arc<Device>,
}

impl Swapchain {
    ///Creates a new swapchain builder with default settings. Fails early if the surface can't be used with the device at all.
    pub fn builder(
        device: &Arc<Device>,
        surface: &Arc<Surface>,
    ) -> Result<SwapchainBuilder, SwapchainError> {
        let support = SurfaceSupport::query(surface, &device.physical_device)?;
        if !support.is_adequate() {
            return Err(SwapchainError::InadequateSurface);
        }

        Ok(SwapchainBuilder {
            surface: surface.clone(),
            device: device.clone(),
            settings: SwapchainSettings {
                extent: initial_extent(&support.capabilities),
                ..Default::default()
            },
        })
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }

    pub fn format(&self) -> vk::Format {
        self.desc.format.format
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    ///Retrieves the index of the next image that should be written to. `signal` is signaled once the presentation engine
    /// releases the image.
    pub fn acquire_next_image(&self, signal: &Semaphore) -> Result<AcquiredImage, SwapchainError> {
        let (index, suboptimal) = unsafe {
            self.loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                signal.inner,
                vk::Fence::null(),
            )?
        };

        #[cfg(feature = "logging")]
        if suboptimal {
            log::warn!("Acquired image is suboptimal!");
        }

        Ok(AcquiredImage { index, suboptimal })
    }

    ///Enqueues the present of `index` after all `wait` semaphores are signaled. Fails with [SwapchainError::OutOfDate]
    /// if the surface changed in a way that the swapchain can't be used anymore.
    pub fn present(
        &self,
        queue: &Queue,
        index: u32,
        wait: &[vk::Semaphore],
    ) -> Result<PresentStatus, SwapchainError> {
        let present_info = vk::PresentInfoKHR::builder()
            .swapchains(core::slice::from_ref(&self.swapchain))
            .image_indices(core::slice::from_ref(&index))
            .wait_semaphores(wait);

        match unsafe { self.loader.queue_present(queue.inner, &present_info) } {
            Ok(false) => Ok(PresentStatus::Optimal),
            Ok(true) => Ok(PresentStatus::Suboptimal),
            Err(e) => {
                #[cfg(feature = "logging")]
                log::warn!("Presenting image {} failed: {}", index, e);
                Err(e.into())
            }
        }
    }

    ///Recreates the swapchain for `extent` with the settings it was created from. The caller has to make sure that none of the
    /// images is in use anymore.
    ///
    /// The new chain is created from the current one and only replaces it on success. On failure `self` stays valid
    /// for destruction, but, as Vulkan retires the old chain either way, has to be recreated again before acquiring.
    pub fn recreate(&mut self, extent: vk::Extent2D) -> Result<(), SwapchainError> {
        if extent_is_zero(extent) {
            return Err(SwapchainError::ZeroExtent(extent));
        }

        let mut settings = self.settings.clone();
        settings.extent = extent;

        let chain = create_chain(
            &self.loader,
            &self.device,
            &self.surface,
            &settings,
            self.swapchain,
        )?;

        //views first, they reference the old images
        self.views = chain.views;
        unsafe { self.loader.destroy_swapchain(self.swapchain, None) };
        self.swapchain = chain.swapchain;
        self.images = chain.images;
        self.desc = chain.desc;
        self.settings = settings;

        #[cfg(feature = "logging")]
        log::info!("Recreated swapchain for {:?}", self.desc.extent);

        Ok(())
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.views.clear();
        #[cfg(feature = "logging")]
        log::trace!("Destroying swapchain");
        unsafe {
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    const SRGB: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };
    const UNORM: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_UNORM,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };

    fn caps(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        }
    }

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Swapchain: Send, Sync);
    }

    #[test]
    fn format_prefers_requested() {
        assert_eq!(choose_surface_format(&[UNORM, SRGB], &[SRGB]), Some(SRGB));
        //falls back to first available
        assert_eq!(choose_surface_format(&[UNORM], &[SRGB]), Some(UNORM));
        assert_eq!(choose_surface_format(&[], &[SRGB]), None);
    }

    #[test]
    fn undefined_format_means_free_choice() {
        let undefined = vk::SurfaceFormatKHR {
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(choose_surface_format(&[undefined], &[SRGB]), Some(SRGB));
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let pref = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
        assert_eq!(
            choose_present_mode(
                &[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
                &pref
            ),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE], &pref),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_uses_current_if_defined() {
        let c = caps((800, 600), (1, 1), (4096, 4096));
        let window = vk::Extent2D {
            width: 1024,
            height: 768,
        };
        assert_eq!(choose_extent(&c, window), c.current_extent);
    }

    #[test]
    fn extent_is_clamped_if_window_decides() {
        let c = caps((u32::MAX, u32::MAX), (64, 64), (1920, 1080));
        let huge = vk::Extent2D {
            width: 4000,
            height: 10,
        };
        assert_eq!(
            choose_extent(&c, huge),
            vk::Extent2D {
                width: 1920,
                height: 64
            }
        );
    }

    #[test]
    fn initial_extent_ignores_window_decided_marker() {
        let window_decides = caps((u32::MAX, u32::MAX), (1, 1), (16384, 16384));
        assert_eq!(initial_extent(&window_decides), vk::Extent2D::default());

        let fixed = caps((800, 600), (1, 1), (16384, 16384));
        assert_eq!(initial_extent(&fixed), fixed.current_extent);
    }

    #[test]
    fn window_decided_surface_uses_window_size() {
        let families = QueueFamilyIndices {
            graphics: 0,
            present: 0,
        };
        let support = SurfaceSupport {
            capabilities: caps((u32::MAX, u32::MAX), (1, 1), (16384, 16384)),
            formats: vec![SRGB],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        let window = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        let settings = SwapchainSettings {
            extent: initial_extent(&support.capabilities),
            ..Default::default()
        };
        //without the window's size the swapchain must not grow to the maximum
        let desc = SwapchainDesc::resolve(&settings, &support, &families).unwrap();
        assert_ne!(desc.extent, support.capabilities.max_image_extent);

        let settings = SwapchainSettings {
            extent: window,
            ..settings
        };
        let desc = SwapchainDesc::resolve(&settings, &support, &families).unwrap();
        assert_eq!(desc.extent, window);
    }

    #[test]
    fn image_count_is_min_plus_one_within_max() {
        let mut c = caps((1, 1), (1, 1), (1, 1));
        assert_eq!(choose_image_count(&c), 3);
        c.max_image_count = 2;
        assert_eq!(choose_image_count(&c), 2);
        c.max_image_count = 8;
        assert_eq!(choose_image_count(&c), 3);
    }

    #[test]
    fn sharing_depends_on_families() {
        let shared = QueueFamilyIndices {
            graphics: 0,
            present: 0,
        };
        assert_eq!(sharing_mode_for(&shared), SharingMode::Exclusive);

        let split = QueueFamilyIndices {
            graphics: 0,
            present: 2,
        };
        match sharing_mode_for(&split) {
            SharingMode::Concurrent {
                queue_family_indices,
            } => assert_eq!(queue_family_indices.as_slice(), &[0, 2]),
            other => panic!("expected concurrent sharing, got {:?}", other),
        }
    }

    #[test]
    fn resolve_rejects_zero_extent_and_empty_surfaces() {
        let families = QueueFamilyIndices {
            graphics: 0,
            present: 0,
        };
        let settings = SwapchainSettings::default();
        let mut support = SurfaceSupport {
            capabilities: caps((0, 0), (0, 0), (0, 0)),
            formats: vec![SRGB],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(matches!(
            SwapchainDesc::resolve(&settings, &support, &families),
            Err(SwapchainError::ZeroExtent(_))
        ));

        support.capabilities = caps((640, 480), (1, 1), (4096, 4096));
        let desc = SwapchainDesc::resolve(&settings, &support, &families).unwrap();
        assert_eq!(desc.format, SRGB);
        assert_eq!(desc.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(desc.image_count, 3);
        assert_eq!(desc.composite_alpha, vk::CompositeAlphaFlagsKHR::OPAQUE);

        support.present_modes.clear();
        assert!(matches!(
            SwapchainDesc::resolve(&settings, &support, &families),
            Err(SwapchainError::InadequateSurface)
        ));
    }
}
