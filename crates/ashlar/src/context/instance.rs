use std::{
    ffi::{CStr, CString},
    sync::Arc,
};

use ash::vk;
use const_cstr::const_cstr;
use raw_window_handle::HasRawDisplayHandle;

use crate::error::InstanceError;
use crate::util::fixed_array_to_cstr;

use super::{debugger::Debugger, PhysicalDeviceFilter};

//Khronos validation layer that gets enabled by `InstanceBuilder::enable_validation`.
const_cstr! {
    pub VALIDATION_LAYER = "VK_LAYER_KHRONOS_validation";
}

const_cstr! {
    ENGINE_NAME = "ashlar";
}

///Signals which message severities of the validation layer are forwarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidationFeatures {
    pub severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    pub message_types: vk::DebugUtilsMessageTypeFlagsEXT,
}

impl ValidationFeatures {
    ///Only warnings and errors.
    pub fn errors_and_warnings() -> Self {
        ValidationFeatures {
            severity: vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            message_types: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        }
    }

    ///Everything the layer has to say.
    pub fn all() -> Self {
        ValidationFeatures {
            severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            ..Self::errors_and_warnings()
        }
    }
}

///Instance configuration as well as the source entry point. Usually this struct is created via [Instance::load].
pub struct InstanceBuilder {
    pub entry: ash::Entry,
    pub validation: Option<ValidationFeatures>,
    pub enabled_layers: Vec<CString>,
    pub enabled_extensions: Vec<CString>,
    pub application_name: CString,
    pub application_version: u32,
    available_layers: Vec<vk::LayerProperties>,
    available_extensions: Vec<vk::ExtensionProperties>,
}

impl InstanceBuilder {
    ///Builds the instance from the current information.
    ///if validation is enabled, the debug messenger is created right after the instance.
    pub fn build(mut self) -> Result<Arc<Instance>, InstanceError> {
        //check if validation is enabled, in that case push the validation layers
        let validation = self.validation;
        if validation.is_some() {
            self = self.with_layer(VALIDATION_LAYER.as_cstr().to_owned())?;
            self = self.with_extension(ash::extensions::ext::DebugUtils::name().to_owned())?;
        }

        let InstanceBuilder {
            entry,
            validation: _,
            enabled_layers,
            enabled_extensions,
            application_name,
            application_version,
            available_layers: _,
            available_extensions: _,
        } = self;

        let app_desc = vk::ApplicationInfo::builder()
            .application_name(&application_name)
            .application_version(application_version)
            .engine_name(ENGINE_NAME.as_cstr())
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::make_api_version(
                0,
                Instance::API_VERSION_MAJOR,
                Instance::API_VERSION_MINOR,
                Instance::API_VERSION_PATCH,
            ));

        //at this point, if we are logging, write out instance creation data
        #[cfg(feature = "logging")]
        {
            log::info!("Instance creation:");
            let apiversion = app_desc.api_version;
            log::info!(
                "  Vulkan version: {}.{}.{}",
                vk::api_version_major(apiversion),
                vk::api_version_minor(apiversion),
                vk::api_version_patch(apiversion),
            );
            log::info!("  Layers:");
            for l in &enabled_layers {
                log::info!("    {:?}", l);
            }
            log::info!("  Extensions:");
            for e in &enabled_extensions {
                log::info!("    {:?}", e);
            }
        }

        let extension_ptrs = enabled_extensions
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<_>>();

        let layer_ptrs = enabled_layers
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<_>>();

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_desc)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        //Chaining the messenger info lets the layer report problems of vkCreateInstance/vkDestroyInstance themselves.
        let mut messenger_info = validation.map(Debugger::create_info);
        if let Some(info) = messenger_info.as_mut() {
            create_info = create_info.push_next(info);
        }

        let inner = unsafe { entry.create_instance(&create_info, None)? };

        let debugger = match validation {
            Some(features) => match Debugger::new(&entry, &inner, features) {
                Ok(d) => Some(d),
                Err(e) => {
                    unsafe { inner.destroy_instance(None) };
                    return Err(e.into());
                }
            },
            None => None,
        };

        Ok(Arc::new(Instance {
            debugger,
            entry,
            inner,
            enabled_layers,
            enabled_extensions,
        }))
    }

    ///Name of the first layer or extension validation needs that this Vulkan installation lacks. `None` if validation can be
    /// enabled.
    pub fn missing_validation_requirement(&self) -> Option<&'static CStr> {
        missing_validation_requirement(&self.available_layers, &self.available_extensions)
    }

    pub fn is_layer_available(&self, name: &CStr) -> bool {
        self.available_layers
            .iter()
            .any(|al| fixed_array_to_cstr(&al.layer_name) == Some(name))
    }

    ///Returns true if a instance-extension with the given name was found
    pub fn is_extension_available(&self, extension_name: &CStr) -> bool {
        self.available_extensions
            .iter()
            .any(|ext| fixed_array_to_cstr(&ext.extension_name) == Some(extension_name))
    }

    ///adds an extensions with the given name, if it was not added yet.
    pub fn with_extension(mut self, name: CString) -> Result<Self, InstanceError> {
        if !self.is_extension_available(&name) {
            return Err(InstanceError::MissingExtension(name));
        }

        if self.enabled_extensions.contains(&name) {
            #[cfg(feature = "logging")]
            log::warn!("Tried to enable extension twice: {:?}", name);
            return Ok(self);
        }

        #[cfg(feature = "logging")]
        log::info!("Enabling instance-extension: {:?}", name);
        self.enabled_extensions.push(name);

        Ok(self)
    }

    ///adds an layer with the given name to the list of layers
    pub fn with_layer(mut self, name: CString) -> Result<Self, InstanceError> {
        if !self.is_layer_available(&name) {
            return Err(InstanceError::MissingLayer(name));
        }

        if self.enabled_layers.contains(&name) {
            #[cfg(feature = "logging")]
            log::warn!("Tried to enable layer twice: {:?}", name);
            return Ok(self);
        }

        self.enabled_layers.push(name);

        Ok(self)
    }

    ///Enables all extensions that are needed for the surface behind `handle` to work.
    pub fn for_surface(mut self, handle: &dyn HasRawDisplayHandle) -> Result<Self, InstanceError> {
        let required_extensions =
            ash_window::enumerate_required_extensions(handle.raw_display_handle())?;
        for r in required_extensions {
            let st = unsafe { CStr::from_ptr(*r).to_owned() };
            self = self.with_extension(st)?;
        }

        Ok(self)
    }

    ///Sets the application name and version reported to the driver.
    pub fn with_application(mut self, name: &str, version: u32) -> Result<Self, InstanceError> {
        self.application_name =
            CString::new(name).map_err(|_| InstanceError::InvalidName(name.to_owned()))?;
        self.application_version = version;
        Ok(self)
    }

    ///enables validation layers and the debug messenger that forwards messages of the requested severity.
    /// Messages are printed either via [println](println), or via the log crate if the `logging` feature is enabled.
    pub fn enable_validation(mut self, features: ValidationFeatures) -> Self {
        self.validation = Some(features);
        self
    }
}

fn missing_validation_requirement(
    layers: &[vk::LayerProperties],
    extensions: &[vk::ExtensionProperties],
) -> Option<&'static CStr> {
    let layer = VALIDATION_LAYER.as_cstr();
    let debug_utils = ash::extensions::ext::DebugUtils::name();
    if !layers
        .iter()
        .any(|l| fixed_array_to_cstr(&l.layer_name) == Some(layer))
    {
        return Some(layer);
    }
    if !extensions
        .iter()
        .any(|e| fixed_array_to_cstr(&e.extension_name) == Some(debug_utils))
    {
        return Some(debug_utils);
    }
    None
}

///ashlar instance. Wraps the entry point as well as the created instance into one object.
///
/// # Safety
///
/// This struct is un-clonable for a reason. It implements [Drop] which takes care of destroying the vulkan instance, as well as the debug
/// messenger if it was loaded.
pub struct Instance {
    ///Debug messenger, present if validation was requested. Has to be destroyed before `inner`.
    pub debugger: Option<Debugger>,
    pub entry: ash::Entry,
    pub inner: ash::Instance,
    pub enabled_layers: Vec<CString>,
    pub enabled_extensions: Vec<CString>,
}

impl Instance {
    ///The major version of Vulkan loaded.
    pub const API_VERSION_MAJOR: u32 = 1;
    ///The minor version of Vulkan loaded.
    pub const API_VERSION_MINOR: u32 = 2;
    ///The patch version of Vulkan loaded.
    pub const API_VERSION_PATCH: u32 = 0;

    ///Loads the Vulkan library at runtime via [Entry::load](ash::Entry::load) and caches the
    /// available layers and extensions.
    pub fn load() -> Result<InstanceBuilder, InstanceError> {
        let entry = unsafe { ash::Entry::load()? };

        let available_layers = entry.enumerate_instance_layer_properties()?;
        let available_extensions = entry.enumerate_instance_extension_properties(None)?;

        Ok(InstanceBuilder {
            entry,
            enabled_extensions: Vec::new(),
            enabled_layers: Vec::new(),
            validation: None,
            application_name: ENGINE_NAME.as_cstr().to_owned(),
            application_version: vk::make_api_version(0, 0, 1, 0),
            available_layers,
            available_extensions,
        })
    }

    pub fn validation_enabled(&self) -> bool {
        self.debugger.is_some()
    }

    ///Returns the feature list of the given physical device
    pub fn get_physical_device_features(
        &self,
        physical_device: &vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceFeatures {
        unsafe { self.inner.get_physical_device_features(*physical_device) }
    }
}

pub trait GetDeviceFilter {
    fn create_physical_device_filter(&self) -> Result<PhysicalDeviceFilter, InstanceError>;
}

impl GetDeviceFilter for Arc<Instance> {
    fn create_physical_device_filter(&self) -> Result<PhysicalDeviceFilter, InstanceError> {
        let devices = unsafe { self.inner.enumerate_physical_devices()? };
        Ok(PhysicalDeviceFilter::new(&self.inner, devices))
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        //messenger is a child of the instance
        self.debugger.take();
        #[cfg(feature = "logging")]
        log::trace!("Destroying instance");
        unsafe {
            self.inner.destroy_instance(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Instance: Send, Sync);
    }

    #[test]
    fn validation_presets() {
        let quiet = ValidationFeatures::errors_and_warnings();
        assert!(!quiet
            .severity
            .contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO));
        assert!(quiet
            .message_types
            .contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION));

        let all = ValidationFeatures::all();
        assert!(all
            .severity
            .contains(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE));
        assert_eq!(all.message_types, quiet.message_types);
    }

    fn fill_name(target: &mut [std::os::raw::c_char], name: &CStr) {
        for (dst, src) in target.iter_mut().zip(name.to_bytes_with_nul()) {
            *dst = *src as std::os::raw::c_char;
        }
    }

    fn layer(name: &CStr) -> vk::LayerProperties {
        let mut props = vk::LayerProperties::default();
        fill_name(&mut props.layer_name, name);
        props
    }

    fn extension(name: &CStr) -> vk::ExtensionProperties {
        let mut props = vk::ExtensionProperties::default();
        fill_name(&mut props.extension_name, name);
        props
    }

    #[test]
    fn validation_needs_layer_and_debug_utils() {
        let debug_utils = ash::extensions::ext::DebugUtils::name();
        let layers = [layer(VALIDATION_LAYER.as_cstr())];
        let extensions = [extension(debug_utils)];

        assert_eq!(missing_validation_requirement(&layers, &extensions), None);
        assert_eq!(
            missing_validation_requirement(&[], &extensions),
            Some(VALIDATION_LAYER.as_cstr())
        );
        //layer installed, but the loader doesn't expose the messenger extension
        assert_eq!(
            missing_validation_requirement(&layers, &[]),
            Some(debug_utils)
        );
    }
}
