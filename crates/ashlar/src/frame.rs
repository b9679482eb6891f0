//! # Frame loop
//!
//! The last link of the setup chain. [FrameLoop] owns everything that depends on the swapchain and drives the usual
//! frames-in-flight protocol:
//!
//! 1. wait for the frame's fence,
//! 2. acquire a swapchain image (signals the frame's image-available semaphore),
//! 3. reset the fence, then re-record the frame's command buffer,
//! 4. submit, waiting on image-available and signaling the image's render-finished semaphore and the fence,
//! 5. present, waiting on render-finished.
//!
//! An out-of-date or suboptimal swapchain, or a resize reported through [FrameLoop::notify_resized], recreates the swapchain
//! and everything derived from it.

use std::sync::Arc;

use ash::vk;

use crate::{
    config::RendererConfig,
    context::Device,
    error::{AshlarError, SwapchainError},
    resources::{
        CommandBuffer, CommandBufferAllocator, CommandPool, Framebuffer, RenderPass,
    },
    surface::Surface,
    swapchain::{PresentStatus, Swapchain},
    sync::{FrameSync, Semaphore},
    util::{extent_is_zero, full_scissor, full_viewport},
};

///Cycles through the frames in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameCounter {
    current: usize,
    count: usize,
}

impl FrameCounter {
    ///Counter over `count` frames. At least one frame is always in flight.
    pub fn new(count: usize) -> Self {
        FrameCounter {
            current: 0,
            count: count.max(1),
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn count(&self) -> usize {
        self.count
    }

    ///Moves to the next frame and returns its index.
    pub fn advance(&mut self) -> usize {
        self.current = (self.current + 1) % self.count;
        self.current
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    ///Commands were submitted and the image was queued for presentation.
    Rendered,
    ///Nothing was submitted, either because the surface has no area, or because the swapchain had to be recreated first.
    Skipped,
}

///Tracks the window's size against the swapchain and decides when the swapchain has to be rebuilt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResizeState {
    ///Last size reported by the window.
    window_extent: Option<vk::Extent2D>,
    needs_recreate: bool,
    ///A recreation started but did not finish, nothing derived from the swapchain can be used.
    incomplete: bool,
}

impl ResizeState {
    pub fn new(window_extent: vk::Extent2D) -> Self {
        ResizeState {
            window_extent: Some(window_extent),
            needs_recreate: false,
            incomplete: false,
        }
    }

    pub fn notify_resized(&mut self, extent: vk::Extent2D) {
        self.window_extent = Some(extent);
        self.needs_recreate = true;
    }

    ///A zero sized window pauses rendering until a non-zero size is reported.
    pub fn is_paused(&self) -> bool {
        self.window_extent.map(extent_is_zero).unwrap_or(false)
    }

    pub fn needs_recreate(&self) -> bool {
        self.needs_recreate || self.incomplete
    }

    ///True if the swapchain has to be rebuilt before the next image is acquired. That is the case after a failed
    /// recreation, or if a pending resize (for instance after a pause) changed the size.
    pub fn recreate_before_acquire(&self, swapchain_extent: vk::Extent2D) -> bool {
        if self.incomplete {
            return true;
        }
        match self.window_extent {
            Some(extent) => self.needs_recreate && extent != swapchain_extent,
            None => false,
        }
    }

    ///Decides from the outcome of a present whether the swapchain has to be recreated. Errors other than
    /// [SwapchainError::OutOfDate] are handed back.
    pub fn recreate_after_present(
        &self,
        present: Result<PresentStatus, SwapchainError>,
        acquired_suboptimal: bool,
    ) -> Result<bool, SwapchainError> {
        match present {
            Ok(PresentStatus::Optimal) => Ok(acquired_suboptimal || self.needs_recreate()),
            Ok(PresentStatus::Suboptimal) | Err(SwapchainError::OutOfDate) => Ok(true),
            Err(e) => Err(e),
        }
    }

    ///Extent the swapchain should be recreated with. The surface's extent wins, then the window's, then the current one.
    /// `None` if that extent has no area, in which case recreation has to be postponed.
    pub fn target_extent(
        &self,
        surface_extent: Option<vk::Extent2D>,
        current: vk::Extent2D,
    ) -> Option<vk::Extent2D> {
        let extent = surface_extent.or(self.window_extent).unwrap_or(current);
        if extent_is_zero(extent) {
            None
        } else {
            Some(extent)
        }
    }

    pub fn postpone(&mut self) {
        self.needs_recreate = true;
    }

    pub fn begin_recreate(&mut self) {
        self.needs_recreate = true;
        self.incomplete = true;
    }

    pub fn finish_recreate(&mut self, extent: vk::Extent2D) {
        self.window_extent = Some(extent);
        self.needs_recreate = false;
        self.incomplete = false;
    }
}

///How far a frame got before it failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FrameStage {
    Waiting,
    ///An image was acquired (the image-available semaphore has a pending signal), nothing is submitted yet.
    Acquired,
    Submitted,
}

impl FrameStage {
    ///After a failure in this stage the frame's fence may stay unsignaled forever, or its image-available semaphore keeps a
    /// signal nobody waits for. Both have to be replaced before the frame slot is used again.
    fn leaves_sync_unusable(self) -> bool {
        matches!(self, FrameStage::Acquired)
    }
}

///Handed to the record closure of [FrameLoop::draw_frame]. The render pass is already begun, viewport and scissor are set
/// to the full image.
pub struct FrameInfo<'a> {
    pub device: &'a Arc<Device>,
    pub command_buffer: vk::CommandBuffer,
    ///Index of the frame in flight.
    pub frame_index: usize,
    ///Index of the swapchain image that is rendered to.
    pub image_index: u32,
    pub extent: vk::Extent2D,
}

struct InFlight {
    command_buffer: CommandBuffer<Arc<CommandPool>>,
    sync: FrameSync,
}

///Owns the swapchain and everything that has to be rebuilt with it.
///
/// Fields are declared in the order they have to be destroyed.
pub struct FrameLoop {
    frames: Vec<InFlight>,
    ///One per swapchain image, since presentation of an image might still wait on it while the next frame is recorded.
    render_finished: Vec<Semaphore>,
    framebuffers: Vec<Framebuffer>,
    pub render_pass: Arc<RenderPass>,
    pub swapchain: Swapchain,
    pub command_pool: Arc<CommandPool>,
    counter: FrameCounter,
    clear_value: vk::ClearValue,
    resize: ResizeState,
    device: Arc<Device>,
}

impl FrameLoop {
    ///Creates the swapchain for `surface` and everything needed to render into it. `window_extent` is the window's
    /// framebuffer size in pixels, it is used whenever the surface lets the window decide the swapchain's size. `config`
    /// decides the number of frames in flight, format and present mode preferences and the clear colour.
    pub fn new(
        device: &Arc<Device>,
        surface: &Arc<Surface>,
        window_extent: vk::Extent2D,
        config: &RendererConfig,
    ) -> Result<Self, AshlarError> {
        let swapchain = Swapchain::builder(device, surface)?
            .with_config(config)
            .with_extent(window_extent)
            .build()?;

        let render_pass = Arc::new(RenderPass::for_swapchain(device, swapchain.format(), None)?);
        let framebuffers = Framebuffer::for_swapchain(device, &render_pass, &swapchain, None)?;

        let command_pool = Arc::new(CommandPool::new_resettable(device)?);
        let counter = FrameCounter::new(config.frames_in_flight());
        let command_buffers =
            command_pool.allocate_buffers(vk::CommandBufferLevel::PRIMARY, counter.count() as u32)?;
        let frames = command_buffers
            .into_iter()
            .map(|command_buffer| {
                Ok(InFlight {
                    command_buffer,
                    sync: FrameSync::new(device)?,
                })
            })
            .collect::<Result<Vec<_>, AshlarError>>()?;

        let render_finished = create_semaphores(device, swapchain.image_count())?;

        #[cfg(feature = "logging")]
        log::info!(
            "Frame loop: {} frames in flight, {} swapchain images of {:?}",
            counter.count(),
            swapchain.image_count(),
            swapchain.extent()
        );

        Ok(FrameLoop {
            frames,
            render_finished,
            framebuffers,
            render_pass,
            swapchain,
            command_pool,
            counter,
            clear_value: config.clear_value(),
            resize: ResizeState::new(window_extent),
            device: device.clone(),
        })
    }

    pub fn frames_in_flight(&self) -> usize {
        self.counter.count()
    }

    pub fn current_frame(&self) -> usize {
        self.counter.current()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_value = vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        };
    }

    ///Reports a new window size. The swapchain is recreated on the next frame. A zero sized window pauses rendering until
    /// a non-zero size is reported.
    pub fn notify_resized(&mut self, extent: vk::Extent2D) {
        self.resize.notify_resized(extent);
    }

    ///Renders one frame. `record` is called with the frame's command buffer while the render pass is active.
    pub fn draw_frame<F>(&mut self, record: F) -> Result<FrameStatus, AshlarError>
    where
        F: FnOnce(&FrameInfo<'_>),
    {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        if self.resize.is_paused() {
            return Ok(FrameStatus::Skipped);
        }

        let frame_index = self.counter.current();
        let mut stage = FrameStage::Waiting;
        let result = self.run_frame(frame_index, &mut stage, record);
        if result.is_err() && stage.leaves_sync_unusable() {
            self.renew_frame_sync(frame_index);
        }
        result
    }

    fn run_frame<F>(
        &mut self,
        frame_index: usize,
        stage: &mut FrameStage,
        record: F,
    ) -> Result<FrameStatus, AshlarError>
    where
        F: FnOnce(&FrameInfo<'_>),
    {
        self.frames[frame_index].sync.in_flight.wait(u64::MAX)?;

        if self.resize.recreate_before_acquire(self.swapchain.extent()) {
            return self.recreate().map(|_| FrameStatus::Skipped);
        }

        let acquired = match self
            .swapchain
            .acquire_next_image(&self.frames[frame_index].sync.image_available)
        {
            Ok(acquired) => acquired,
            Err(SwapchainError::OutOfDate) => {
                self.recreate()?;
                return Ok(FrameStatus::Skipped);
            }
            Err(e) => return Err(e.into()),
        };
        *stage = FrameStage::Acquired;

        let image = acquired.index as usize;
        let framebuffer = self
            .framebuffers
            .get(image)
            .ok_or(SwapchainError::UnknownImage(acquired.index))?
            .inner;
        let render_finished = self
            .render_finished
            .get(image)
            .ok_or(SwapchainError::UnknownImage(acquired.index))?
            .inner;

        let extent = self.swapchain.extent();
        {
            #[cfg(feature = "profiling")]
            puffin::profile_scope!("record");

            let frame = &mut self.frames[frame_index];
            frame.command_buffer.reset(false)?;
            frame
                .command_buffer
                .begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;

            let cb = frame.command_buffer.inner;
            let begin_info = vk::RenderPassBeginInfo::builder()
                .render_pass(self.render_pass.inner)
                .framebuffer(framebuffer)
                .render_area(full_scissor(extent))
                .clear_values(core::slice::from_ref(&self.clear_value));

            unsafe {
                self.device
                    .inner
                    .cmd_begin_render_pass(cb, &begin_info, vk::SubpassContents::INLINE);
                self.device
                    .inner
                    .cmd_set_viewport(cb, 0, &[full_viewport(extent)]);
                self.device
                    .inner
                    .cmd_set_scissor(cb, 0, &[full_scissor(extent)]);
            }

            record(&FrameInfo {
                device: &self.device,
                command_buffer: cb,
                frame_index,
                image_index: acquired.index,
                extent,
            });

            unsafe { self.device.inner.cmd_end_render_pass(cb) };
            frame.command_buffer.end()?;
        }

        let frame = &self.frames[frame_index];
        let queue = self.device.graphics_queue()?;
        //reset as late as possible, an unsignaled fence without a submit would block the next wait forever
        frame.sync.in_flight.reset()?;
        frame.command_buffer.submit(
            queue,
            &[frame.sync.image_available.inner],
            &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
            &[render_finished],
            frame.sync.in_flight.inner,
        )?;
        *stage = FrameStage::Submitted;

        let present = self.swapchain.present(
            self.device.present_queue()?,
            acquired.index,
            &[render_finished],
        );

        self.counter.advance();

        if self
            .resize
            .recreate_after_present(present, acquired.suboptimal)?
        {
            self.recreate()?;
        }

        Ok(FrameStatus::Rendered)
    }

    ///Replaces the fence and image-available semaphore of `frame_index` with fresh ones. The fence is created signaled, so
    /// the next frame on this slot doesn't wait for work that was never submitted.
    fn renew_frame_sync(&mut self, frame_index: usize) {
        //the old semaphore may only be destroyed once its pending signal happened
        if let Err(_e) = self.device.wait_idle() {
            #[cfg(feature = "logging")]
            log::error!("Failed to wait for device idle after failed frame: {}", _e);
        }

        match FrameSync::new(&self.device) {
            Ok(sync) => self.frames[frame_index].sync = sync,
            Err(_e) => {
                #[cfg(feature = "logging")]
                log::error!("Failed to renew sync objects of frame {}: {}", frame_index, _e);
            }
        }
    }

    ///Waits for the device, then rebuilds the swapchain and everything derived from it. If the surface has no area the
    /// recreation is postponed. If recreation fails, it is retried before the next image is acquired.
    fn recreate(&mut self) -> Result<(), AshlarError> {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        self.device.wait_idle()?;

        let surface_extent = self
            .swapchain
            .surface
            .get_current_extent(&self.device.physical_device)?;
        let extent = match self
            .resize
            .target_extent(surface_extent, self.swapchain.extent())
        {
            Some(extent) => extent,
            None => {
                self.resize.postpone();
                return Ok(());
            }
        };

        self.resize.begin_recreate();
        self.framebuffers.clear();
        self.swapchain.recreate(extent)?;

        if self.swapchain.format() != self.render_pass.color_format {
            #[cfg(feature = "logging")]
            log::warn!("Swapchain format changed, recreating render pass");
            self.render_pass = Arc::new(RenderPass::for_swapchain(
                &self.device,
                self.swapchain.format(),
                None,
            )?);
        }

        self.framebuffers =
            Framebuffer::for_swapchain(&self.device, &self.render_pass, &self.swapchain, None)?;

        if self.render_finished.len() != self.swapchain.image_count() {
            self.render_finished = create_semaphores(&self.device, self.swapchain.image_count())?;
        }

        self.resize.finish_recreate(self.swapchain.extent());
        Ok(())
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        //nothing may be destroyed while the GPU still uses it
        if let Err(_e) = self.device.wait_idle() {
            #[cfg(feature = "logging")]
            log::error!("Failed to wait for device idle before destroying frame loop: {}", _e);
        }
    }
}

fn create_semaphores(device: &Arc<Device>, count: usize) -> Result<Vec<Semaphore>, AshlarError> {
    (0..count)
        .map(|_| Semaphore::new(device).map_err(AshlarError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(FrameLoop: Send, Sync);
        assert_impl_all!(FrameCounter: Send, Sync);
    }

    #[test]
    fn counter_cycles() {
        let mut counter = FrameCounter::new(2);
        assert_eq!(counter.current(), 0);
        assert_eq!(counter.advance(), 1);
        assert_eq!(counter.advance(), 0);
        assert_eq!(counter.advance(), 1);
        assert_eq!(counter.current(), 1);
    }

    #[test]
    fn counter_has_at_least_one_frame() {
        let mut counter = FrameCounter::new(0);
        assert_eq!(counter.count(), 1);
        assert_eq!(counter.advance(), 0);
        assert_eq!(counter.advance(), 0);
    }

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn zero_extent_pauses_until_resized() {
        let mut state = ResizeState::new(extent(800, 600));
        assert!(!state.is_paused());

        state.notify_resized(extent(0, 0));
        assert!(state.is_paused());
        state.notify_resized(extent(1024, 0));
        assert!(state.is_paused());

        state.notify_resized(extent(1024, 768));
        assert!(!state.is_paused());
        //the swapchain still has the size from before the pause
        assert!(state.recreate_before_acquire(extent(800, 600)));
        state.finish_recreate(extent(1024, 768));
        assert!(!state.recreate_before_acquire(extent(1024, 768)));
        assert!(!state.needs_recreate());
    }

    #[test]
    fn same_size_resize_waits_for_present() {
        let mut state = ResizeState::new(extent(800, 600));
        assert!(!state.recreate_before_acquire(extent(800, 600)));

        state.notify_resized(extent(800, 600));
        assert!(!state.recreate_before_acquire(extent(800, 600)));
        assert!(state
            .recreate_after_present(Ok(PresentStatus::Optimal), false)
            .unwrap());
    }

    #[test]
    fn present_outcome_decides_recreation() {
        let state = ResizeState::new(extent(800, 600));
        assert!(!state
            .recreate_after_present(Ok(PresentStatus::Optimal), false)
            .unwrap());
        assert!(state
            .recreate_after_present(Ok(PresentStatus::Optimal), true)
            .unwrap());
        assert!(state
            .recreate_after_present(Ok(PresentStatus::Suboptimal), false)
            .unwrap());
        assert!(state
            .recreate_after_present(Err(SwapchainError::OutOfDate), false)
            .unwrap());
        assert!(matches!(
            state.recreate_after_present(
                Err(SwapchainError::VkError(vk::Result::ERROR_SURFACE_LOST_KHR)),
                false
            ),
            Err(SwapchainError::VkError(vk::Result::ERROR_SURFACE_LOST_KHR))
        ));
    }

    #[test]
    fn target_extent_prefers_surface_then_window() {
        let mut state = ResizeState::new(extent(800, 600));
        let current = extent(640, 480);
        assert_eq!(
            state.target_extent(Some(extent(1920, 1080)), current),
            Some(extent(1920, 1080))
        );
        assert_eq!(state.target_extent(None, current), Some(extent(800, 600)));

        //minimized
        assert_eq!(state.target_extent(Some(extent(0, 0)), current), None);
        state.notify_resized(extent(0, 0));
        assert_eq!(state.target_extent(None, current), None);

        state.postpone();
        assert!(state.needs_recreate());
    }

    #[test]
    fn failed_recreate_is_retried_before_acquire() {
        let mut state = ResizeState::new(extent(800, 600));
        state.begin_recreate();
        //same size, but framebuffers and semaphores may be gone
        assert!(state.recreate_before_acquire(extent(800, 600)));
        assert!(state
            .recreate_after_present(Ok(PresentStatus::Optimal), false)
            .unwrap());

        state.finish_recreate(extent(800, 600));
        assert!(!state.recreate_before_acquire(extent(800, 600)));
    }

    #[test]
    fn only_acquired_frames_need_new_sync_objects() {
        //the fence was waited on but not reset yet
        assert!(!FrameStage::Waiting.leaves_sync_unusable());
        //acquire signals the semaphore, a failure before submit leaves it and possibly the fence stuck
        assert!(FrameStage::Acquired.leaves_sync_unusable());
        //the submit signals the fence
        assert!(!FrameStage::Submitted.leaves_sync_unusable());
    }

    #[test]
    fn counter_visits_every_frame_once_per_cycle() {
        let mut counter = FrameCounter::new(3);
        let visited = (0..3)
            .map(|_| {
                let c = counter.current();
                counter.advance();
                c
            })
            .collect::<Vec<_>>();
        assert_eq!(visited, vec![0, 1, 2]);
        assert_eq!(counter.current(), 0);
    }
}
