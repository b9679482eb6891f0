use crate::error::DeviceError;
use crate::util::fixed_array_to_cstr;

use super::{DeviceBuilder, QueueBuilder};
use std::{cmp::Ordering, ffi::CStr, sync::Arc};

use ash::vk;

///Queue families used for rendering and presenting. Can be the same family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    ///Resolves graphics and present families from the family `properties` of a device. `can_present` is asked
    /// for each family index. A family that can do both is preferred over two distinct families.
    ///
    /// For headless usage pass `|_| true`, which makes the graphics family the present family.
    pub fn find(
        properties: &[(usize, vk::QueueFamilyProperties)],
        mut can_present: impl FnMut(u32) -> bool,
    ) -> Option<Self> {
        let mut graphics = None;
        let mut present = None;

        for (idx, props) in properties.iter() {
            let idx = *idx as u32;
            let is_graphics = props.queue_count > 0
                && props.queue_flags.contains(vk::QueueFlags::GRAPHICS);
            let is_present = props.queue_count > 0 && can_present(idx);

            if is_graphics && is_present {
                return Some(QueueFamilyIndices {
                    graphics: idx,
                    present: idx,
                });
            }

            if is_graphics && graphics.is_none() {
                graphics = Some(idx);
            }
            if is_present && present.is_none() {
                present = Some(idx);
            }
        }

        match (graphics, present) {
            (Some(graphics), Some(present)) => Some(QueueFamilyIndices { graphics, present }),
            _ => None,
        }
    }

    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    ///The distinct family indices, graphics first. A queue has to be created exactly once per entry.
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

///Ranks device types, higher is better.
pub fn device_type_score(ty: vk::PhysicalDeviceType) -> u32 {
    match ty {
        vk::PhysicalDeviceType::DISCRETE_GPU => 4,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 3,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 1,
        _ => 0,
    }
}

///Collection off all properties for this physical device. Can be used to easily create a [DeviceBuilder](DeviceBuilder).
/// Is usually acquired from a [PhysicaldeviceFilter](PhysicalDeviceFilter), or by using `new`.
pub struct PhyDeviceProperties {
    pub phydev: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub queue_properties: Vec<(usize, vk::QueueFamilyProperties)>,
    pub extensions: Vec<vk::ExtensionProperties>,
}

impl PhyDeviceProperties {
    ///Creates Self from just a physical device definition. Fills in `queue_properties` with all available properties.
    pub fn new(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let queues =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        let extensions = match unsafe {
            instance.enumerate_device_extension_properties(physical_device)
        } {
            Ok(ext) => ext,
            Err(_e) => {
                #[cfg(feature = "logging")]
                log::warn!("Failed to enumerate device extensions: {}", _e);
                Vec::new()
            }
        };

        PhyDeviceProperties {
            phydev: physical_device,
            properties,
            queue_properties: queues.into_iter().enumerate().collect(),
            extensions,
        }
    }

    pub fn name(&self) -> String {
        fixed_array_to_cstr(&self.properties.device_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("unknown device"))
    }

    pub fn supports_extension(&self, name: &CStr) -> bool {
        self.extensions
            .iter()
            .any(|ext| fixed_array_to_cstr(&ext.extension_name) == Some(name))
    }

    ///creates a device builder for this physical device that creates one queue for each of the unique `families`.
    pub fn into_device_builder(
        self,
        instance: Arc<crate::context::Instance>,
        families: QueueFamilyIndices,
    ) -> Result<DeviceBuilder, DeviceError> {
        let queues = families
            .unique()
            .into_iter()
            .map(|family| {
                let properties = self
                    .queue_properties
                    .iter()
                    .find(|(idx, _)| *idx as u32 == family)
                    .map(|(_, props)| *props)
                    .ok_or(DeviceError::NoQueueFamily("the requested family index"))?;
                Ok(QueueBuilder {
                    family_index: family,
                    properties,
                    priorities: vec![1.0], //per default create one queue
                })
            })
            .collect::<Result<Vec<_>, DeviceError>>()?;

        Ok(DeviceBuilder {
            instance,
            physical_device: self.phydev,
            supported_extensions: self.extensions,
            queues,
            families,
            device_extensions: Vec::new(),
            features: vk::PhysicalDeviceFeatures::default(),
            p_next: Vec::new(),
        })
    }
}

///Filter that lets you select a sub-set of all physical devices.
/// use [ash::Instance::enumerate_physical_devices](ash::Instance::enumerate_physical_devices) to get a list of all devices
/// and [PhysicalDeviceFilter::new](PhysicalDeviceFilter::new) to create this filter.
pub struct PhysicalDeviceFilter {
    ///All available devices.
    pub pdevices: Vec<PhyDeviceProperties>,
}

impl PhysicalDeviceFilter {
    pub fn new(instance: &ash::Instance, phydevices: Vec<vk::PhysicalDevice>) -> Self {
        PhysicalDeviceFilter {
            pdevices: phydevices
                .into_iter()
                .map(|phy| PhyDeviceProperties::new(instance, phy))
                .collect(),
        }
    }

    ///removes all devices that do not contain the device type bits.
    pub fn filter_type(mut self, dev_type: vk::PhysicalDeviceType) -> Self {
        self.pdevices.retain(|dev| dev.properties.device_type == dev_type);
        self
    }

    ///removes all devices that do not contain a queue with the given flags
    pub fn filter_queue_flags(mut self, flags: vk::QueueFlags) -> Self {
        self.pdevices.retain(|dev| {
            dev.queue_properties
                .iter()
                .any(|(_idx, f)| f.queue_flags.contains(flags))
        });
        self
    }

    ///removes all devices that do not support every extension in `extensions`.
    pub fn filter_extensions(mut self, extensions: &[&CStr]) -> Self {
        self.pdevices.retain(|dev| {
            let all = extensions.iter().all(|ext| dev.supports_extension(ext));
            #[cfg(feature = "logging")]
            if !all {
                log::info!("Device {} misses required extensions", dev.name());
            }
            all
        });
        self
    }

    ///Custom filter on the cached properties
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: FnMut(&PhyDeviceProperties) -> bool,
    {
        self.pdevices = self.pdevices.into_iter().filter(filter).collect();
        self
    }

    ///Removes all devices that have no queue family that can present on the supplied surface
    pub fn filter_presentable(mut self, surface: &crate::surface::Surface) -> Self {
        self.pdevices.retain(|pdev| {
            pdev.queue_properties.iter().any(|(qidx, _queue)| {
                match surface.supports_family(&pdev.phydev, *qidx as u32) {
                    Ok(res) => res,
                    Err(_e) => {
                        #[cfg(feature = "logging")]
                        log::warn!(
                            "Failed to query surface capability on queue family {} of physical device {}: {}",
                            qidx,
                            pdev.name(),
                            _e
                        );
                        false
                    }
                }
            })
        });
        self
    }

    ///Orders the devices so that the most capable device type comes first.
    pub fn sort_by_preference(mut self) -> Self {
        sort_by_preference(&mut self.pdevices, |dev| dev.properties.device_type);
        self
    }

    ///Releases the current filtered physical devices. You can use [into_device_builder](PhyDeviceProperties::into_device_builder) to start and create an abstract device for these.
    pub fn release(self) -> Vec<PhyDeviceProperties> {
        self.pdevices
    }
}

///Stable sort, best device type first.
pub fn sort_by_preference<T>(devices: &mut [T], ty: impl Fn(&T) -> vk::PhysicalDeviceType) {
    devices.sort_by(|a, b| match device_type_score(ty(a)).cmp(&device_type_score(ty(b))) {
        Ordering::Less => Ordering::Greater,
        Ordering::Greater => Ordering::Less,
        Ordering::Equal => Ordering::Equal,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: count,
            ..Default::default()
        }
    }

    #[test]
    fn prefers_family_that_does_both() {
        let props = vec![
            (0, family(vk::QueueFlags::GRAPHICS, 1)),
            (1, family(vk::QueueFlags::TRANSFER, 1)),
            (2, family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 1)),
        ];
        //family 0 can't present, 1 and 2 can
        let found = QueueFamilyIndices::find(&props, |idx| idx != 0).unwrap();
        assert_eq!(
            found,
            QueueFamilyIndices {
                graphics: 2,
                present: 2
            }
        );
        assert!(found.is_shared());
        assert_eq!(found.unique(), vec![2]);
    }

    #[test]
    fn falls_back_to_distinct_families() {
        let props = vec![
            (0, family(vk::QueueFlags::GRAPHICS, 1)),
            (1, family(vk::QueueFlags::TRANSFER, 1)),
        ];
        let found = QueueFamilyIndices::find(&props, |idx| idx == 1).unwrap();
        assert_eq!(
            found,
            QueueFamilyIndices {
                graphics: 0,
                present: 1
            }
        );
        assert_eq!(found.unique(), vec![0, 1]);
    }

    #[test]
    fn ignores_empty_families() {
        let props = vec![(0, family(vk::QueueFlags::GRAPHICS, 0))];
        assert!(QueueFamilyIndices::find(&props, |_| true).is_none());
    }

    #[test]
    fn none_without_presentation() {
        let props = vec![(0, family(vk::QueueFlags::GRAPHICS, 4))];
        assert!(QueueFamilyIndices::find(&props, |_| false).is_none());
    }

    #[test]
    fn discrete_gpus_first() {
        let mut devices = vec![
            vk::PhysicalDeviceType::CPU,
            vk::PhysicalDeviceType::INTEGRATED_GPU,
            vk::PhysicalDeviceType::OTHER,
            vk::PhysicalDeviceType::DISCRETE_GPU,
            vk::PhysicalDeviceType::VIRTUAL_GPU,
        ];
        sort_by_preference(&mut devices, |t| *t);
        assert_eq!(
            devices,
            vec![
                vk::PhysicalDeviceType::DISCRETE_GPU,
                vk::PhysicalDeviceType::INTEGRATED_GPU,
                vk::PhysicalDeviceType::VIRTUAL_GPU,
                vk::PhysicalDeviceType::CPU,
                vk::PhysicalDeviceType::OTHER,
            ]
        );
    }
}
