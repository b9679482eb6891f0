//! # Ashlar
//!
//! Thin, lifetime-managed wrappers around [ash]. Every wrapper owns exactly one Vulkan handle, creates it when built and
//! destroys it exactly once when dropped. Dependencies are kept alive through [Arc](std::sync::Arc)s, so a handle can never
//! outlive the object it was created from.
//!
//! # Usage
//!
//! Vulkan's setup protocol is a chain, and ashlar follows it:
//!
//! 1. [Ctx](context::Ctx): instance, debug messenger, surface, device and queues, allocator.
//! 2. [FrameLoop](frame::FrameLoop): swapchain, render pass, framebuffers, command pool and buffers, fences and semaphores.
//! 3. Descriptor layouts and sets, [shader modules](resources::ShaderModule), [pipeline layout](resources::PipelineLayout) and
//!    [pipeline](resources::GraphicsPipeline), created by the application against the frame loop's render pass.
//!
//! Drop everything in reverse: pipelines and descriptors, then the frame loop, then the context.
//!
//! Structures that are not sensitive to lifetime requirements (like create info) are not wrapped.

pub use ash;
#[cfg(feature = "default_allocator")]
pub use gpu_allocator;

pub use bytemuck;

///Allocator related details. ashlar allows for custom allocators (usually the `A` parameter on the [Context](context::Ctx)).
pub mod allocator;

///Renderer settings that can be loaded from a TOML file.
pub mod config;

///Structures you need to get started. Basically [Instance](context::Instance) and [Device](context::Device) creation.
/// Also includes the [Ctx](context::Ctx) struct, which bundles both with a memory allocator and the window surface.
pub mod context;

pub mod frame;

///Handle wrappers for everything created from a device.
pub mod resources;

///Window surface related structures. Includes a self managed [Surface](surface::Surface) type.
pub mod surface;

/// [Swapchain](swapchain::Swapchain) type that can be created from a [Surface](surface::Surface). Includes the policies
/// used to pick format, present mode, extent and image count.
pub mod swapchain;

///Vulkan synchronisation primitives
pub mod sync;

mod error;
pub use error::{
    AshlarError, BufferError, CommandBufferError, ConfigError, DescriptorError, DeviceError,
    InstanceError, PipelineError, ShaderError, SwapchainError, SyncError,
};

pub mod util;
