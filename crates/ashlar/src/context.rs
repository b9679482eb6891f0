//! ## Context
//!
//! When working with Vulkan the [Device](ash::Device) is entry point for most of the operations.
//! It therefore is needed in most structures and functions calls that somehow transform state related to Vulkan.
//! The device is created from an [Instance](ash::Instance) which represents a runtime instance of Vulkan.
//!
//! Additionally to the device one or two [queues](ash::vk::Queue) are created. One that can execute graphics work,
//! and one that can present to the window surface. On most hardware those are the same queue.
//!
//! When working with buffers another structure, the allocator is relevant.
//! It takes care of tracking where and which memory is in-use on the GPU etc.
//!
//! Since those structures closely work together we define an abstraction called [Ctx](context::Ctx), or "Context".
//! Creating it runs the first half of the setup protocol:
//!
//! 1. Instance (with validation layers and debug messenger if requested)
//! 2. Surface
//! 3. Physical device selection, logical device and queues
//! 4. Memory allocator
//!
//! Dropping it tears those down in reverse.
//!
//! The `Instance` and `Device` are always created by ash, the allocator however can be defined by the
//! application. Have a look at the [allocator](crate::allocator) module for its definition and default implementation.
use std::sync::{Arc, Mutex};

mod instance;
pub use instance::{GetDeviceFilter, Instance, InstanceBuilder, ValidationFeatures, VALIDATION_LAYER};

pub mod debugger;
pub use debugger::Debugger;

mod device;
pub use device::{Device, DeviceBuilder};

mod queue;
pub use queue::{Queue, QueueBuilder};

mod physical_device;
pub use physical_device::{
    device_type_score, sort_by_preference, PhyDeviceProperties, PhysicalDeviceFilter,
    QueueFamilyIndices,
};

use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};

use crate::{
    allocator::Allocator, config::RendererConfig, error::DeviceError, surface::Surface,
    AshlarError,
};

///ashlar's Vulkan context. Can either be constructed by hand, or via helper functions.
///
/// Fields are declared in reverse creation order, which is the order Rust drops them in.
pub struct Ctx<A: Allocator + Send> {
    ///Allocator instance used for all buffer allocation in this context.
    pub allocator: Arc<Mutex<A>>,
    ///Vulkan device including associated queues.
    pub device: Arc<Device>,
    ///Window surface, `None` for headless contexts.
    pub surface: Option<Arc<Surface>>,
    ///The initial vulkan instance used for the context.
    pub instance: Arc<Instance>,
}

impl<A: Allocator + Send> Ctx<A> {
    ///Creates the context from its elements.
    ///
    /// # Safety
    /// Assumes that the allocator was created for the device, which is in turn created for the instance.
    pub fn new(
        allocator: A,
        device: Arc<Device>,
        surface: Option<Arc<Surface>>,
        instance: Arc<Instance>,
    ) -> Self {
        Ctx {
            allocator: Arc::new(Mutex::new(allocator)),
            device,
            surface,
            instance,
        }
    }

    pub fn queue_families(&self) -> QueueFamilyIndices {
        self.device.families
    }

    ///The surface of this context. Fails for headless contexts.
    pub fn surface(&self) -> Result<&Arc<Surface>, DeviceError> {
        self.surface
            .as_ref()
            .ok_or(DeviceError::UnsupportedFeature(String::from("surface on headless context")))
    }
}

///Builds the instance according to `config`. Surface extensions are enabled if `window` is given.
fn instance_for_config(
    config: &RendererConfig,
    window: Option<&dyn HasRawDisplayHandle>,
) -> Result<Arc<Instance>, AshlarError> {
    let mut builder =
        Instance::load()?.with_application(&config.application_name, vk::make_api_version(0, 0, 1, 0))?;
    if let Some(window) = window {
        builder = builder.for_surface(window)?;
    }

    if config.validation {
        if let Some(_missing) = builder.missing_validation_requirement() {
            #[cfg(feature = "logging")]
            log::warn!("Validation requested, but {:?} is not available", _missing);
        } else {
            let features = if config.verbose_validation {
                ValidationFeatures::all()
            } else {
                ValidationFeatures::errors_and_warnings()
            };
            builder = builder.enable_validation(features);
        }
    }

    Ok(builder.build()?)
}

///Selects the best physical device and creates the logical device for it. If `surface` is given, the device must be able
/// to present to it and gets the swapchain extension enabled.
pub fn create_device(
    instance: &Arc<Instance>,
    surface: Option<&Surface>,
) -> Result<Arc<Device>, AshlarError> {
    let mut filter = instance
        .create_physical_device_filter()?
        .filter_queue_flags(vk::QueueFlags::GRAPHICS);

    if let Some(surface) = surface {
        filter = filter
            .filter_extensions(&[ash::extensions::khr::Swapchain::name()])
            .filter_presentable(surface)
            .filter(|dev| match crate::surface::SurfaceSupport::query(surface, &dev.phydev) {
                Ok(support) => support.is_adequate(),
                Err(_) => false,
            });
    }

    let candidates = filter.sort_by_preference().release();

    #[cfg(feature = "logging")]
    {
        log::info!("Device candidates (in order):");
        for dev in candidates.iter() {
            log::info!("    {} ({:?})", dev.name(), dev.properties.device_type);
        }
    }

    //take the first candidate for which the queue families resolve
    for candidate in candidates {
        let families = QueueFamilyIndices::find(&candidate.queue_properties, |idx| match surface {
            Some(surface) => surface
                .supports_family(&candidate.phydev, idx)
                .unwrap_or(false),
            None => true,
        });

        let families = match families {
            Some(f) => f,
            None => continue,
        };

        #[cfg(feature = "logging")]
        log::info!("Using {} with families {:?}", candidate.name(), families);

        let mut builder = candidate.into_device_builder(instance.clone(), families)?;
        if surface.is_some() {
            builder = builder.with_extension(ash::extensions::khr::Swapchain::name());
        }
        return Ok(builder.build()?);
    }

    Err(DeviceError::NoPhysicalDevice.into())
}

#[cfg(feature = "default_allocator")]
impl Ctx<gpu_allocator::vulkan::Allocator> {
    ///Creates a new context that does not check for any surface availability.
    pub fn new_headless(config: &RendererConfig) -> Result<Self, AshlarError> {
        let instance = instance_for_config(config, None)?;
        let device = create_device(&instance, None)?;
        let allocator = Self::default_allocator(&instance, &device)?;
        Ok(Ctx::new(allocator, device, None, instance))
    }

    ///Runs instance, surface, device and allocator creation for `window`.
    pub fn new_for_window<T>(window: &T, config: &RendererConfig) -> Result<Self, AshlarError>
    where
        T: HasRawDisplayHandle + HasRawWindowHandle,
    {
        let instance = instance_for_config(config, Some(window as &dyn HasRawDisplayHandle))?;
        //create the surface, so we can check for compatible devices in the filter.
        let surface = Arc::new(Surface::new(&instance, window)?);
        let device = create_device(&instance, Some(surface.as_ref()))?;
        let allocator = Self::default_allocator(&instance, &device)?;
        Ok(Ctx::new(allocator, device, Some(surface), instance))
    }

    fn default_allocator(
        instance: &Instance,
        device: &Device,
    ) -> Result<gpu_allocator::vulkan::Allocator, DeviceError> {
        gpu_allocator::vulkan::Allocator::new(&gpu_allocator::vulkan::AllocatorCreateDesc {
            buffer_device_address: false,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_leaks_on_shutdown: true,
                ..Default::default()
            },
            device: device.inner.clone(),
            instance: instance.inner.clone(),
            physical_device: device.physical_device,
        })
        .map_err(|e| DeviceError::GpuAllocatorError(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Device: Send, Sync);
    }

    #[cfg(feature = "default_allocator")]
    #[test]
    fn default_ctx_is_send_sync() {
        assert_impl_all!(Ctx<gpu_allocator::vulkan::Allocator>: Send, Sync);
    }
}
