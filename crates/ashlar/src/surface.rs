use std::sync::Arc;

use ash::extensions::khr;
use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};

use crate::error::{InstanceError, SwapchainError};

///using [ash-window](https://crates.io/crates/ash-window) to safely find a surface for a given window
/// handle. Also keeps the instance alive long enough to destroy the created surface in time.
pub struct Surface {
    ///keeps the surface alive
    pub instance: Arc<crate::context::Instance>,
    pub surface: vk::SurfaceKHR,
    pub surface_loader: khr::Surface,
}

impl Surface {
    pub fn new<T>(
        instance: &Arc<crate::context::Instance>,
        window_handle: &T,
    ) -> Result<Self, InstanceError>
    where
        T: HasRawWindowHandle + HasRawDisplayHandle,
    {
        let surface = unsafe {
            ash_window::create_surface(
                &instance.entry,
                &instance.inner,
                window_handle.raw_display_handle(),
                window_handle.raw_window_handle(),
                None,
            )?
        };
        let surface_loader = khr::Surface::new(&instance.entry, &instance.inner);

        #[cfg(feature = "logging")]
        log::info!("Created window surface");

        Ok(Surface {
            instance: instance.clone(),
            surface,
            surface_loader,
        })
    }

    pub fn get_capabilities(
        &self,
        physical_device: &vk::PhysicalDevice,
    ) -> Result<vk::SurfaceCapabilitiesKHR, vk::Result> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(*physical_device, self.surface)
        }
    }

    pub fn get_formats(
        &self,
        physical_device: &vk::PhysicalDevice,
    ) -> Result<Vec<vk::SurfaceFormatKHR>, vk::Result> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(*physical_device, self.surface)
        }
    }

    pub fn get_present_modes(
        &self,
        physical_device: &vk::PhysicalDevice,
    ) -> Result<Vec<vk::PresentModeKHR>, vk::Result> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(*physical_device, self.surface)
        }
    }

    ///True if queues of `family` on `physical_device` can present to this surface.
    pub fn supports_family(
        &self,
        physical_device: &vk::PhysicalDevice,
        family: u32,
    ) -> Result<bool, vk::Result> {
        unsafe {
            self.surface_loader.get_physical_device_surface_support(
                *physical_device,
                family,
                self.surface,
            )
        }
    }

    ///Tries to read the current surface extent. Returns `None` if the window decides the extent
    /// (reported as `u32::MAX`), or if the surface is currently zero sized.
    pub fn get_current_extent(
        &self,
        physical_device: &vk::PhysicalDevice,
    ) -> Result<Option<vk::Extent2D>, vk::Result> {
        let extent = self.get_capabilities(physical_device)?.current_extent;
        Ok(match extent {
            vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            }
            | vk::Extent2D {
                width: 0,
                height: 0,
            } => None,
            extent => Some(extent),
        })
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        #[cfg(feature = "logging")]
        log::trace!("Destroying surface");
        unsafe { self.surface_loader.destroy_surface(self.surface, None) };
    }
}

///Everything a swapchain needs to know about a surface on one physical device.
#[derive(Clone, Debug)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub fn query(
        surface: &Surface,
        physical_device: &vk::PhysicalDevice,
    ) -> Result<Self, SwapchainError> {
        Ok(SurfaceSupport {
            capabilities: surface.get_capabilities(physical_device)?,
            formats: surface.get_formats(physical_device)?,
            present_modes: surface.get_present_modes(physical_device)?,
        })
    }

    ///A swapchain can only be created if the surface reports at least one format and present mode.
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Surface: Send, Sync);
    }

    #[test]
    fn adequate_needs_format_and_mode() {
        let mut support = SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: Vec::new(),
        };
        assert!(!support.is_adequate());
        support.present_modes.push(vk::PresentModeKHR::FIFO);
        assert!(support.is_adequate());
        support.formats.clear();
        assert!(!support.is_adequate());
    }
}
