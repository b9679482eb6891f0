use std::ffi::CStr;

use ash::extensions::ext::DebugUtils;
use ash::vk::{self, Handle};
use const_cstr::const_cstr;

use super::instance::ValidationFeatures;

const_cstr! {
    UNKNOWNID = "unknown id";
    NOMSG = "no message";
}

///The external callback print function for debugging
pub unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    #[allow(unused)] message_types: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut core::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        #[cfg(feature = "logging")]
        log::error!("AshlarDebugMsg: Got Msg, but no data!");
        return vk::FALSE;
    }

    let data = &*p_callback_data;
    let id = data.message_id_number;
    let idname = if !data.p_message_id_name.is_null() {
        CStr::from_ptr(data.p_message_id_name)
    } else {
        UNKNOWNID.as_cstr()
    };
    let msg = if !data.p_message.is_null() {
        CStr::from_ptr(data.p_message)
    } else {
        NOMSG.as_cstr()
    };

    //use log if the feature is enabled, otherwise use println
    #[cfg(feature = "logging")]
    {
        if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            log::error!("[{}: {:?}]: {:?}", id, idname, msg);
        } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            log::warn!("[{}: {:?}]: {:?}", id, idname, msg);
        } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
            log::info!("[{}: {:?}]: {:?}", id, idname, msg);
        } else {
            log::trace!("[{}: {:?}]: {:?}", id, idname, msg);
        }
    }

    #[cfg(not(feature = "logging"))]
    {
        println!(
            "AshlarDebugMsg: Level: {:?}, Type: {:?}\nId[{}: {:?}]\nMsg: {:?}",
            message_severity, message_types, id, idname, msg
        );
    }

    //the call that triggered the message must not be aborted
    vk::FALSE
}

///Owns the `VK_EXT_debug_utils` messenger that gets created by activating validation layers.
/// Allows to use all `VK_EXT_DEBUG_UTILS` functions.
pub struct Debugger {
    pub loader: DebugUtils,
    pub messenger: vk::DebugUtilsMessengerEXT,
}

impl Debugger {
    ///Messenger create info for the given filter, routed to [vulkan_debug_callback].
    pub fn create_info(features: ValidationFeatures) -> vk::DebugUtilsMessengerCreateInfoEXT {
        vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(features.severity)
            .message_type(features.message_types)
            .pfn_user_callback(Some(vulkan_debug_callback))
            .build()
    }

    pub fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        features: ValidationFeatures,
    ) -> Result<Self, vk::Result> {
        let loader = DebugUtils::new(entry, instance);
        let info = Self::create_info(features);
        let messenger = unsafe { loader.create_debug_utils_messenger(&info, None)? };

        #[cfg(feature = "logging")]
        log::info!("Created debug messenger for {:?}", features.severity);

        Ok(Debugger { loader, messenger })
    }

    ///Attaches `name` to `handle`, which makes validation messages and graphics debuggers a lot more readable.
    pub fn name_object<H: Handle>(
        &self,
        device: &ash::Device,
        handle: H,
        name: &CStr,
    ) -> Result<(), vk::Result> {
        let info = vk::DebugUtilsObjectNameInfoEXT::builder()
            .object_type(H::TYPE)
            .object_handle(handle.as_raw())
            .object_name(name);
        unsafe {
            self.loader
                .set_debug_utils_object_name(device.handle(), &info)
        }
    }
}

impl Drop for Debugger {
    fn drop(&mut self) {
        unsafe {
            self.loader
                .destroy_debug_utils_messenger(self.messenger, None)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn callback_survives_null_data() {
        let res = unsafe {
            vulkan_debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                std::ptr::null(),
                std::ptr::null_mut(),
            )
        };
        assert_eq!(res, vk::FALSE);
    }

    #[test]
    fn callback_never_aborts_the_call() {
        let msg = CString::new("something went wrong").unwrap();
        let data = vk::DebugUtilsMessengerCallbackDataEXT {
            p_message: msg.as_ptr(),
            ..Default::default()
        };
        let res = unsafe {
            vulkan_debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL,
                &data,
                std::ptr::null_mut(),
            )
        };
        assert_eq!(res, vk::FALSE);
    }

    #[test]
    fn create_info_carries_filter_and_callback() {
        let features = ValidationFeatures::errors_and_warnings();
        let info = Debugger::create_info(features);
        assert_eq!(info.message_severity, features.severity);
        assert_eq!(info.message_type, features.message_types);
        assert!(info.pfn_user_callback.is_some());
    }
}
