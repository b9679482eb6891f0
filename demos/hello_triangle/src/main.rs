//! Runs the whole setup chain against a window and draws a spinning triangle.
//!
//! Context (instance, debug messenger, surface, device, allocator) → frame loop (swapchain, render pass, framebuffers,
//! command buffers, fences and semaphores) → descriptors and pipeline. The vertex shader reads its rotation from a uniform
//! buffer, the fragment shader is tinted through a push constant.
//!
//! Settings are read from `config.toml` next to the working directory if present.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use ashlar::{
    ash::vk,
    config::RendererConfig,
    context::Ctx,
    frame::{FrameLoop, FrameStatus},
    gpu_allocator::vulkan::Allocator,
    resources::{
        Buffer, DescriptorAllocator, DescriptorBinding, DescriptorPool, DescriptorSet,
        DescriptorSetLayout, FixedFunctionState, GraphicsPipeline, PipelineLayout, PushConstant,
        ShaderKind, ShaderModule, ShaderStage,
    },
};
use winit::{
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    window::{Window, WindowBuilder},
};

const VERTEX_SHADER: &str = r#"
#version 450
layout(location = 0) in vec2 in_pos;
layout(location = 1) in vec3 in_color;

layout(set = 0, binding = 0) uniform Globals {
    float time;
    float scale;
} globals;

layout(location = 0) out vec3 frag_color;

void main() {
    float c = cos(globals.time);
    float s = sin(globals.time);
    vec2 p = mat2(c, s, -s, c) * in_pos * globals.scale;
    gl_Position = vec4(p, 0.0, 1.0);
    frag_color = in_color;
}
"#;

const FRAGMENT_SHADER: &str = r#"
#version 450
layout(location = 0) in vec3 frag_color;

layout(push_constant) uniform Tint {
    vec4 tint;
} pc;

layout(location = 0) out vec4 out_color;

void main() {
    out_color = vec4(frag_color, 1.0) * pc.tint;
}
"#;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    pos: [f32; 2],
    color: [f32; 3],
}

const VERTICES: [Vertex; 3] = [
    Vertex {
        pos: [0.0, -0.5],
        color: [1.0, 0.0, 0.0],
    },
    Vertex {
        pos: [0.5, 0.5],
        color: [0.0, 1.0, 0.0],
    },
    Vertex {
        pos: [-0.5, 0.5],
        color: [0.0, 0.0, 1.0],
    },
];

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Globals {
    time: f32,
    scale: f32,
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Tint {
    tint: [f32; 4],
}

///Everything the triangle needs. Fields are dropped top to bottom, which is the reverse of the order they were created in.
struct App {
    pipeline: GraphicsPipeline,
    push_constant: PushConstant<Tint>,
    ///One set and one uniform buffer per frame in flight, so the CPU never writes to a buffer the GPU still reads.
    descriptor_sets: Vec<DescriptorSet<Arc<DescriptorPool>>>,
    uniform_buffers: Vec<Buffer>,
    vertex_buffer: Buffer,
    _set_layout: DescriptorSetLayout,
    frame_loop: FrameLoop,
    ctx: Ctx<Allocator>,

    start: Instant,
}

impl App {
    fn new(window: &Window, config: &RendererConfig) -> Result<Self> {
        let ctx = Ctx::new_for_window(window, config)?;
        let size = window.inner_size();
        let frame_loop = FrameLoop::new(
            &ctx.device,
            ctx.surface()?,
            vk::Extent2D {
                width: size.width,
                height: size.height,
            },
            config,
        )?;

        let set_layout = DescriptorSetLayout::new(
            &ctx.device,
            &[DescriptorBinding::uniform_buffer(
                0,
                vk::ShaderStageFlags::VERTEX,
            )],
        )?;

        let frames = frame_loop.frames_in_flight();
        let pool = Arc::new(DescriptorPool::new_for_layouts(
            &ctx.device,
            vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET,
            &[&set_layout],
            frames as u32,
        )?);

        let uniform_buffers = (0..frames)
            .map(|i| {
                Buffer::new_uniform::<_, Globals>(
                    &ctx.device,
                    &ctx.allocator,
                    Some(&format!("globals_{}", i)),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let layouts = vec![set_layout.inner; frames];
        let mut descriptor_sets = pool.allocate(&layouts)?;
        for (set, buffer) in descriptor_sets.iter_mut().zip(uniform_buffers.iter()) {
            set.write_uniform_buffer(0, buffer, buffer.size());
        }

        let vertex_buffer = Buffer::new_with_data(
            &ctx.device,
            &ctx.allocator,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            Some("triangle"),
            &VERTICES,
        )?;

        let push_constant = PushConstant::new(
            Tint {
                tint: [1.0, 1.0, 1.0, 1.0],
            },
            vk::ShaderStageFlags::FRAGMENT,
        );

        let pipeline = {
            let vertex = Arc::new(ShaderModule::from_glsl(
                &ctx.device,
                VERTEX_SHADER,
                ShaderKind::Vertex,
                "triangle.vert",
            )?);
            let fragment = Arc::new(ShaderModule::from_glsl(
                &ctx.device,
                FRAGMENT_SHADER,
                ShaderKind::Fragment,
                "triangle.frag",
            )?);

            let layout = Arc::new(PipelineLayout::new(
                &ctx.device,
                &[set_layout.inner],
                &[*push_constant.range()],
            )?);

            let state = FixedFunctionState::default().with_vertex_input(
                vec![vk::VertexInputBindingDescription {
                    binding: 0,
                    stride: core::mem::size_of::<Vertex>() as u32,
                    input_rate: vk::VertexInputRate::VERTEX,
                }],
                vec![
                    vk::VertexInputAttributeDescription {
                        location: 0,
                        binding: 0,
                        format: vk::Format::R32G32_SFLOAT,
                        offset: 0,
                    },
                    vk::VertexInputAttributeDescription {
                        location: 1,
                        binding: 0,
                        format: vk::Format::R32G32B32_SFLOAT,
                        offset: 8,
                    },
                ],
            );

            //the modules are only needed until the pipeline exists
            GraphicsPipeline::new(
                &ctx.device,
                &[
                    ShaderStage::new(&vertex, ShaderKind::Vertex),
                    ShaderStage::new(&fragment, ShaderKind::Fragment),
                ],
                &state,
                &layout,
                &frame_loop.render_pass,
                0,
            )?
        };

        Ok(App {
            pipeline,
            push_constant,
            descriptor_sets,
            uniform_buffers,
            vertex_buffer,
            _set_layout: set_layout,
            frame_loop,
            ctx,
            start: Instant::now(),
        })
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.frame_loop
            .notify_resized(vk::Extent2D { width, height });
    }

    fn draw(&mut self) -> Result<()> {
        let time = self.start.elapsed().as_secs_f32();
        let pulse = 0.75 + 0.25 * (time * 2.0).sin();
        self.push_constant.get_content_mut().tint = [pulse, pulse, pulse, 1.0];

        let App {
            pipeline,
            push_constant,
            descriptor_sets,
            uniform_buffers,
            vertex_buffer,
            frame_loop,
            ..
        } = self;

        let mut write_result = Ok(());
        let status = frame_loop.draw_frame(|frame| {
            //the frame's fence was waited on, nothing reads this buffer right now
            write_result = uniform_buffers[frame.frame_index].write_pod(
                0,
                &Globals {
                    time,
                    scale: 1.0,
                },
            );

            let device = &frame.device.inner;
            let cb = frame.command_buffer;
            unsafe {
                device.cmd_bind_pipeline(cb, vk::PipelineBindPoint::GRAPHICS, pipeline.pipeline);
                device.cmd_bind_descriptor_sets(
                    cb,
                    vk::PipelineBindPoint::GRAPHICS,
                    pipeline.layout.layout,
                    0,
                    &[descriptor_sets[frame.frame_index].inner],
                    &[],
                );
                device.cmd_bind_vertex_buffers(cb, 0, &[vertex_buffer.inner], &[0]);
            }
            push_constant.push(device, cb, pipeline.layout.layout);
            unsafe { device.cmd_draw(cb, VERTICES.len() as u32, 1, 0, 0) };
        })?;
        write_result?;

        if status == FrameStatus::Skipped {
            log::trace!("Skipped frame");
        }
        Ok(())
    }
}

impl Drop for App {
    fn drop(&mut self) {
        //the pipeline and buffers are destroyed before the frame loop, which would be the first to wait
        if let Err(e) = self.ctx.device.wait_idle() {
            log::error!("Failed to wait for device idle: {}", e);
        }
    }
}

fn load_config() -> RendererConfig {
    match RendererConfig::load_from_file("config.toml") {
        Ok(config) => config,
        Err(e) => {
            log::info!("Using default config: {}", e);
            RendererConfig {
                application_name: String::from("hello_triangle"),
                ..Default::default()
            }
        }
    }
}

fn main() -> Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()?;

    let config = load_config();

    let event_loop = EventLoop::new();
    let window = WindowBuilder::new()
        .with_title(config.application_name.clone())
        .build(&event_loop)?;

    let mut app = Some(App::new(&window, &config)?);

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;

        match event {
            Event::MainEventsCleared => window.request_redraw(),
            Event::RedrawRequested(_) => {
                if let Some(a) = app.as_mut() {
                    if let Err(e) = a.draw() {
                        log::error!("Drawing failed: {}", e);
                        app = None;
                        *control_flow = ControlFlow::Exit;
                    }
                }
            }
            Event::WindowEvent {
                event: WindowEvent::Resized(size),
                ..
            } => {
                if let Some(a) = app.as_mut() {
                    a.resize(size.width, size.height);
                }
            }
            Event::WindowEvent {
                event: WindowEvent::CloseRequested,
                ..
            } => {
                //tear down in reverse order while the window still exists
                app = None;
                *control_flow = ControlFlow::Exit;
            }
            Event::LoopDestroyed => {
                app = None;
            }
            _ => {}
        }
    })
}
