use std::error::Error;
use std::ffi::CString;

use ash::{vk, LoadingError};

use thiserror::Error;

use crate::resources::ShaderKind;

#[derive(Error, Debug)]
pub enum InstanceError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Failed to load Vulkan entry point: {0}")]
    EntryLoading(#[from] LoadingError),
    #[error("Instance layer {0:?} is not available")]
    MissingLayer(CString),
    #[error("Instance extension {0:?} is not available")]
    MissingExtension(CString),
    #[error("Name {0:?} contains an interior nul byte")]
    InvalidName(String),
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Extension {0} is not supported by device")]
    UnsupportedExtension(String),
    #[error("Feature {0} not supported")]
    UnsupportedFeature(String),
    #[error("No physical device found. Is a Vulkan capable GPU and driver installed?")]
    NoPhysicalDevice,
    #[error("No queue family supports {0}")]
    NoQueueFamily(&'static str),
    //FIXME: Not happy about that Box :/
    #[error("GpuAllocator error: {0}")]
    GpuAllocatorError(#[from] Box<dyn Error + Send + Sync + 'static>),
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
}

#[derive(Error, Debug)]
pub enum SwapchainError {
    #[error("Swapchain can't have a extent of 0 on either axis, was: {0:?}")]
    ZeroExtent(vk::Extent2D),
    #[error("Surface reports no formats or no present modes for this device")]
    InadequateSurface,
    #[error("Swapchain is out of date and has to be recreated")]
    OutOfDate,
    #[error("Nothing was created for swapchain image {0}")]
    UnknownImage(u32),
    #[error("Vulkan error: {0}")]
    VkError(vk::Result),
}

impl From<vk::Result> for SwapchainError {
    fn from(r: vk::Result) -> Self {
        match r {
            vk::Result::ERROR_OUT_OF_DATE_KHR => SwapchainError::OutOfDate,
            other => SwapchainError::VkError(other),
        }
    }
}

#[derive(Error, Debug)]
pub enum ShaderError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Filesystem error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Can't derive the shader stage of {0}, expected .vert, .frag or .comp")]
    UnknownStage(String),
    #[error("Entry point {0:?} contains an interior nul byte")]
    InvalidEntryPoint(String),
    //FIXME: The actual error is not sendable atm.
    #[error("Reflection error: {0}")]
    ReflectionError(String),
    #[error("Compilation error: {0}")]
    CompilationError(String),
}

#[derive(Error, Debug)]
pub enum CommandBufferError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Command pool is not resettable")]
    PoolNotResetable,
    #[error("Submitting to queue failed with {0}")]
    SubmitFailed(vk::Result),
    #[error("Failed to allocate command buffer. Requested {count}, got {allocated}")]
    FailedToAllocate { allocated: usize, count: usize },
}

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Failed to allocate Descriptors from pool. Requested {requested} got {count}")]
    Allocation { requested: usize, count: usize },
    #[error("Descriptorset can't be freed")]
    UnFreeable,
    #[error("Descriptor pool needs at least one set layout")]
    NoLayouts,
    #[error("Descriptor count overflows: {count} descriptors times {sets} sets")]
    CountOverflow { count: u32, sets: u32 },
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Failed to allocate pipeline")]
    Allocation,
    #[error("Graphics pipeline needs at least one shader stage")]
    NoStages,
    #[error("Expected a compute shader stage, got {0:?}")]
    WrongStage(ShaderKind),
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Timed out after {0}ns")]
    Timeout(u64),
}

#[derive(Error, Debug)]
pub enum BufferError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Allocation failed: {0}")]
    Allocation(String),
    #[error("Supplied offset bigger then buffer")]
    OffsetTooLarge,
    #[error("Mapped buffer is partially written. {written} / {size}")]
    PartialyWritten { written: usize, size: usize },
    #[error("Buffer can not be mapped")]
    NotMapable,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Serialization error: {0}")]
    Serialize(String),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

#[derive(Error, Debug)]
pub enum AshlarError {
    #[error("Instance error: {0}")]
    InstanceError(#[from] InstanceError),
    #[error("Device error: {0}")]
    DeviceError(#[from] DeviceError),
    #[error("Swapchain error: {0}")]
    SwapchainError(#[from] SwapchainError),
    #[error("Shader/ShaderModule error: {0}")]
    ShaderError(#[from] ShaderError),
    #[error("Desriptor error: {0}")]
    DescriptorError(#[from] DescriptorError),
    #[error("Pipeline error: {0}")]
    PipelineError(#[from] PipelineError),
    #[error("CommandBuffer error: {0}")]
    CommandBufferError(#[from] CommandBufferError),
    #[error("Sync error: {0}")]
    SyncError(#[from] SyncError),
    #[error("Buffer error: {0}")]
    BufferError(#[from] BufferError),
    #[error("Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
}

#[cfg(test)]
mod test {
    use static_assertions::assert_impl_all;

    use super::*;

    #[test]
    fn assure_send_sync() {
        assert_impl_all!(InstanceError: Send, Sync);
        assert_impl_all!(DeviceError: Send, Sync);
        assert_impl_all!(SwapchainError: Send, Sync);
        assert_impl_all!(ShaderError: Send, Sync);
        assert_impl_all!(CommandBufferError: Send, Sync);
        assert_impl_all!(DescriptorError: Send, Sync);
        assert_impl_all!(PipelineError: Send, Sync);
        assert_impl_all!(SyncError: Send, Sync);
        assert_impl_all!(BufferError: Send, Sync);
        assert_impl_all!(ConfigError: Send, Sync);
        assert_impl_all!(AshlarError: Send, Sync);
    }

    #[test]
    fn out_of_date_maps_to_dedicated_variant() {
        assert!(matches!(
            SwapchainError::from(vk::Result::ERROR_OUT_OF_DATE_KHR),
            SwapchainError::OutOfDate
        ));
        assert!(matches!(
            SwapchainError::from(vk::Result::ERROR_SURFACE_LOST_KHR),
            SwapchainError::VkError(vk::Result::ERROR_SURFACE_LOST_KHR)
        ));
    }

    #[test]
    fn umbrella_wraps_nested_errors() {
        let err: AshlarError = PipelineError::NoStages.into();
        assert!(matches!(
            err,
            AshlarError::PipelineError(PipelineError::NoStages)
        ));
        assert!(err.to_string().contains("shader stage"));
    }
}
