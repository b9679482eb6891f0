use ash::vk;

///Abstract queue that collects a [vk::Queue](ash::vk::Queue) and its family.
#[derive(Clone, Debug)]
pub struct Queue {
    pub inner: vk::Queue,
    pub family_index: u32,
    pub properties: vk::QueueFamilyProperties,
}

pub struct QueueBuilder {
    ///The family's index.
    pub family_index: u32,
    ///its properties
    pub properties: vk::QueueFamilyProperties,
    ///The length of this vector determines how many instances of this queue are created. The number determines the
    /// priority of each queue on the hardware. See the [documentation](https://www.khronos.org/registry/vulkan/specs/1.3-extensions/man/html/VkDeviceQueueCreateInfo.html) for more information about this topic.
    pub priorities: Vec<f32>,
}

impl QueueBuilder {
    ///Sets the queue amount that is being created (length of the vector) and each queues priority. Have a look at the
    /// `priorities` field documentation.
    ///
    /// Note that only the first `n` priorities are respected if the length of the vector exceeds `n = self.properties.queue_count`.
    pub fn with_queues(&mut self, mut queue_priorities: Vec<f32>) {
        if queue_priorities.len() > self.properties.queue_count as usize {
            queue_priorities.truncate(self.properties.queue_count as usize);
        }

        self.priorities = queue_priorities;
    }

    pub fn as_create_info(&self) -> vk::DeviceQueueCreateInfoBuilder<'_> {
        vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(self.family_index)
            .queue_priorities(&self.priorities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priorities_are_capped_by_family_size() {
        let mut builder = QueueBuilder {
            family_index: 0,
            properties: vk::QueueFamilyProperties {
                queue_count: 2,
                ..Default::default()
            },
            priorities: vec![1.0],
        };
        builder.with_queues(vec![1.0, 0.5, 0.25]);
        assert_eq!(builder.priorities, vec![1.0, 0.5]);

        let info = builder.as_create_info();
        assert_eq!(info.queue_count, 2);
        assert_eq!(info.queue_family_index, 0);
    }
}
