use super::{Queue, QueueBuilder, QueueFamilyIndices};
use crate::error::DeviceError;
use crate::util::fixed_array_to_cstr;
use ash::vk;
use std::{
    ffi::{CStr, CString},
    sync::Arc,
};

///Helper that lets you setup device properties and possibly needed extensions before creating the actual
/// device.
pub struct DeviceBuilder {
    ///Instance based on which the device is creates
    pub instance: Arc<crate::context::Instance>,
    ///The physical device from which this will be an abstraction
    pub physical_device: vk::PhysicalDevice,
    ///Extensions the physical device reported as supported.
    pub supported_extensions: Vec<vk::ExtensionProperties>,
    ///Queue family index, and properties of all queues that will be created.
    pub queues: Vec<QueueBuilder>,
    ///Graphics and present families the queues were derived from.
    pub families: QueueFamilyIndices,
    pub features: vk::PhysicalDeviceFeatures,

    ///List of device extensions that are enabled.
    pub device_extensions: Vec<CString>,

    ///p_next elements
    pub p_next: Vec<Box<dyn vk::ExtendsDeviceCreateInfo>>,
}

impl DeviceBuilder {
    ///Checks that all device extensions are supported.
    fn check_extensions(&self) -> Result<(), DeviceError> {
        #[cfg(feature = "logging")]
        {
            log::trace!("Supported device extensions");
            for ext in self.supported_extensions.iter() {
                if let Some(name) = fixed_array_to_cstr(&ext.extension_name) {
                    log::trace!("  {:?}", name);
                }
            }
        }

        for ext in self.device_extensions.iter() {
            let supported = self
                .supported_extensions
                .iter()
                .any(|sup| fixed_array_to_cstr(&sup.extension_name) == Some(ext.as_c_str()));
            if !supported {
                return Err(DeviceError::UnsupportedExtension(
                    ext.to_string_lossy().into_owned(),
                ));
            }
        }

        Ok(())
    }

    ///Allows changing `self` builder style
    pub fn with(mut self, mut mapping: impl FnMut(&mut DeviceBuilder)) -> Self {
        mapping(&mut self);
        self
    }

    ///Pushes the new extension, if it wasn't pushed already. The name is usually obtained from the extensions definition like this:
    ///```ignore
    ///  builder.with_extension(ash::extensions::khr::Swapchain::name());
    ///```
    pub fn with_extension(mut self, ext_name: &CStr) -> Self {
        if !self.device_extensions.iter().any(|e| e.as_c_str() == ext_name) {
            self.device_extensions.push(ext_name.to_owned());
        }
        self
    }

    ///Pushes an additional feature into the `p_next` chain
    pub fn with_additional_feature<T>(mut self, feature: T) -> Self
    where
        T: vk::ExtendsDeviceCreateInfo + 'static,
    {
        self.p_next.push(Box::new(feature));
        self
    }

    pub fn build(self) -> Result<Arc<Device>, DeviceError> {
        //before starting anything, check that the extensions are supported
        self.check_extensions()?;

        let DeviceBuilder {
            instance,
            physical_device,
            supported_extensions: _,
            queues,
            families,
            features,
            device_extensions,
            mut p_next,
        } = self;

        let queue_create_infos = queues
            .iter()
            .map(|q| q.as_create_info().build())
            .collect::<Vec<_>>();

        let extension_ptrs = device_extensions
            .iter()
            .map(|e| e.as_ptr())
            .collect::<Vec<_>>();

        //NOTE: according to the vulkan doc device layers are deprecated. We therefore don't expose
        //anything related to that.
        let mut create_info = vk::DeviceCreateInfo::builder()
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&features)
            .queue_create_infos(&queue_create_infos)
            .build();

        //Chain the features together, each element points to the one pushed before it.
        if !p_next.is_empty() {
            let mut last: *mut vk::BaseOutStructure = std::ptr::null_mut();
            for feature in p_next.iter_mut() {
                let ptr = feature.as_mut() as *mut _ as *mut vk::BaseOutStructure;
                unsafe { (*ptr).p_next = last };
                last = ptr;
            }
            create_info.p_next = last as *const core::ffi::c_void;
        }

        let mut device =
            unsafe { Device::new_from_info(instance, physical_device, &create_info, &queues)? };
        device.families = families;
        device.enabled_extensions = device_extensions;

        Ok(Arc::new(device))
    }
}

///Thin device abstraction that keeps the underlying instance (and therefore entrypoint) alive.
/// and takes care of device destruction once its dropped.
///
/// # Safety and self creation
/// Since the struct is completely public it is possible to create a device "on your own". In that case you'll have to make sure
/// that the instance is associated with the device and the queues actually exist.
pub struct Device {
    ///The raw ash device
    pub inner: ash::Device,
    pub instance: Arc<crate::context::Instance>,
    pub physical_device: vk::PhysicalDevice,
    pub queues: Vec<Queue>,
    pub families: QueueFamilyIndices,
    pub enabled_extensions: Vec<CString>,
}

impl Device {
    ///Mini helper function that creates the device from an already created instance and physical device, using
    /// the supplied device and creation infos.
    /// The function assumes that device and queues can be created from the device. No additional checking is done.
    ///
    /// The returned device assumes that the first queue builder is the graphics *and* present family. Override `families`
    /// if that is not the case.
    ///
    /// # Safety
    /// The biggest concern when using this function should be that the queue_families of the `queue_builder` actually exist in that way,
    /// and that possibly enabled extensions in the `device_create_info` exist. Otherwise this either panics or fails, depending on the
    /// configured validation.
    pub unsafe fn new_from_info(
        instance: Arc<crate::context::Instance>,
        physical_device: vk::PhysicalDevice,
        device_create_info: &vk::DeviceCreateInfo,
        queue_builder: &[QueueBuilder],
    ) -> Result<Self, DeviceError> {
        let device = instance
            .inner
            .create_device(physical_device, device_create_info, None)?;

        //now setup the queues for the infos we prepared before
        let queues = queue_builder
            .iter()
            .flat_map(|queue_family| {
                (0..queue_family.priorities.len()).map(|queue_index| Queue {
                    family_index: queue_family.family_index,
                    properties: queue_family.properties,
                    inner: device.get_device_queue(queue_family.family_index, queue_index as u32),
                })
            })
            .collect();

        let first_family = queue_builder.first().map(|q| q.family_index).unwrap_or(0);

        #[cfg(feature = "logging")]
        log::info!("Created logical device with {} queue families", queue_builder.len());

        Ok(Device {
            inner: device,
            instance,
            physical_device,
            queues,
            families: QueueFamilyIndices {
                graphics: first_family,
                present: first_family,
            },
            enabled_extensions: Vec::new(),
        })
    }

    ///Returns the first queue for the given family, if there is any.
    pub fn get_first_queue_for_family(&self, family: u32) -> Option<&Queue> {
        self.queues.iter().find(|q| q.family_index == family)
    }

    pub fn graphics_queue(&self) -> Result<&Queue, DeviceError> {
        self.get_first_queue_for_family(self.families.graphics)
            .ok_or(DeviceError::NoQueueFamily("graphics"))
    }

    pub fn present_queue(&self) -> Result<&Queue, DeviceError> {
        self.get_first_queue_for_family(self.families.present)
            .ok_or(DeviceError::NoQueueFamily("present"))
    }

    pub fn extension_enabled(&self, name: &CStr) -> bool {
        self.enabled_extensions.iter().any(|e| e.as_c_str() == name)
    }

    ///Blocks until all queues of this device are idle.
    pub fn wait_idle(&self) -> Result<(), DeviceError> {
        unsafe { self.inner.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        #[cfg(feature = "logging")]
        log::trace!("Destroying device");
        unsafe { self.inner.destroy_device(None) };
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
}
