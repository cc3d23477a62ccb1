//! Brute-force backend on the GPU (wgpu compute)
//!
//! Two kernels run per step: `forces.wgsl` computes the pairwise acceleration
//! of every body and `integrate.wgsl` applies the semi-implicit Euler step.
//! Bodies are uploaded from the particle buffer at the start of each update
//! and copied back synchronously before `update` returns, so the caller's
//! buffer is always the source of truth.
//!
//! The device works in single precision. It evaluates acceleration rather
//! than force since `G * m1 * m2` overflows `f32` at stellar masses.

use std::sync::mpsc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use bytemuck::{Pod, Zeroable};
use log::{debug, info};
use wgpu::util::DeviceExt;

use crate::simulation::engine::{Simulation, StepStats};
use crate::simulation::params::Parameters;
use crate::simulation::particle::{NVec3, PVec3, Particle};

const WORKGROUP_SIZE: u32 = 256;

/// Body layout shared with both kernels.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct GpuBody {
    position: [f32; 4], // xyz render units, w = mass
    velocity: [f32; 4], // xyz m/s
}

impl From<&Particle> for GpuBody {
    fn from(p: &Particle) -> Self {
        Self {
            position: [p.position.x, p.position.y, p.position.z, p.mass as f32],
            velocity: [p.velocity.x as f32, p.velocity.y as f32, p.velocity.z as f32, 0.0],
        }
    }
}

/// Uniform block (matches `Params` in the shaders).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct GpuParams {
    g: f32,
    softening: f32,
    distance_scale: f32,
    dt: f32,
    count: u32,
    _padding: [u32; 3],
}

/// Buffers sized for one particle count.
struct GpuBuffers {
    count: usize,
    bodies: wgpu::Buffer,
    params: wgpu::Buffer,
    staging: wgpu::Buffer,
    force_bind_group: wgpu::BindGroup,
    integrate_bind_group: wgpu::BindGroup,
}

struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    force_pipeline: wgpu::ComputePipeline,
    integrate_pipeline: wgpu::ComputePipeline,
    force_layout: wgpu::BindGroupLayout,
    integrate_layout: wgpu::BindGroupLayout,
    buffers: Option<GpuBuffers>,
}

#[derive(Default)]
pub struct BruteForceGpu {
    context: Option<GpuContext>,
}

impl BruteForceGpu {
    pub fn new() -> Self {
        Self::default()
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl GpuContext {
    async fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("no compatible GPU adapter")?;

        info!("brute-force-gpu: using {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("bhsolver device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to open GPU device")?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let force_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("forces"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/forces.wgsl").into()),
        });
        let integrate_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("integrate"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/integrate.wgsl").into()),
        });

        let force_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("forces layout"),
            entries: &[storage_entry(0, true), storage_entry(1, false), uniform_entry(2)],
        });
        let integrate_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("integrate layout"),
            entries: &[storage_entry(0, false), storage_entry(1, true), uniform_entry(2)],
        });

        let force_pipeline = create_pipeline(&device, "forces", &force_shader, &force_layout);
        let integrate_pipeline = create_pipeline(&device, "integrate", &integrate_shader, &integrate_layout);

        if let Some(err) = device.pop_error_scope().await {
            bail!("compute kernel setup failed: {err}");
        }

        Ok(Self {
            device,
            queue,
            force_pipeline,
            integrate_pipeline,
            force_layout,
            integrate_layout,
            buffers: None,
        })
    }

    /// Make sure the device buffers fit `count` bodies.
    fn ensure_buffers(&mut self, count: usize) {
        if self.buffers.as_ref().is_some_and(|b| b.count == count) {
            return;
        }

        let body_bytes = (count * std::mem::size_of::<GpuBody>()) as u64;
        let accel_bytes = (count * std::mem::size_of::<[f32; 4]>()) as u64;

        let bodies = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("bodies"),
            size: body_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let accel = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("accelerations"),
            size: accel_bytes,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });
        let params = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("params"),
            contents: bytemuck::bytes_of(&GpuParams::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("bodies readback"),
            size: body_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind = |label, layout: &wgpu::BindGroupLayout| {
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: bodies.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 1, resource: accel.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 2, resource: params.as_entire_binding() },
                ],
            })
        };
        let force_bind_group = bind("forces bind group", &self.force_layout);
        let integrate_bind_group = bind("integrate bind group", &self.integrate_layout);

        debug!("brute-force-gpu: allocated buffers for {count} bodies");
        self.buffers = Some(GpuBuffers {
            count,
            bodies,
            params,
            staging,
            force_bind_group,
            integrate_bind_group,
        });
    }

    /// Upload, run both kernels, and read the bodies back.
    fn step(&mut self, particles: &mut [Particle], params: &Parameters, dt: f32) -> Result<()> {
        self.ensure_buffers(particles.len());
        let buffers = self.buffers.as_ref().ok_or_else(|| anyhow!("gpu buffers missing"))?;

        let upload: Vec<GpuBody> = particles.iter().map(GpuBody::from).collect();
        let uniforms = GpuParams {
            g: params.G as f32,
            softening: params.softening as f32,
            distance_scale: params.distance_scale as f32,
            dt,
            count: particles.len() as u32,
            _padding: [0; 3],
        };
        self.queue.write_buffer(&buffers.bodies, 0, bytemuck::cast_slice(&upload));
        self.queue.write_buffer(&buffers.params, 0, bytemuck::bytes_of(&uniforms));

        let workgroups = (particles.len() as u32).div_ceil(WORKGROUP_SIZE);
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("brute-force step"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("forces"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.force_pipeline);
            pass.set_bind_group(0, &buffers.force_bind_group, &[]);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("integrate"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.integrate_pipeline);
            pass.set_bind_group(0, &buffers.integrate_bind_group, &[]);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }
        let bytes = buffers.bodies.size();
        encoder.copy_buffer_to_buffer(&buffers.bodies, 0, &buffers.staging, 0, bytes);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffers.staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .context("waiting for the GPU step")?;
        rx.recv()
            .context("readback callback dropped")?
            .context("failed to map readback buffer")?;

        let result: Vec<GpuBody> = {
            let data = slice.get_mapped_range();
            bytemuck::pod_collect_to_vec::<u8, GpuBody>(&data[..])
        };
        buffers.staging.unmap();

        for (p, b) in particles.iter_mut().zip(&result) {
            p.position = PVec3::new(b.position[0], b.position[1], b.position[2]);
            p.velocity = NVec3::new(b.velocity[0].into(), b.velocity[1].into(), b.velocity[2].into());
            p.force = NVec3::zeros();
        }
        Ok(())
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    label: &str,
    module: &wgpu::ShaderModule,
    layout: &wgpu::BindGroupLayout,
) -> wgpu::ComputePipeline {
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module,
        entry_point: Some("main"),
        compilation_options: Default::default(),
        cache: None,
    })
}

impl Simulation for BruteForceGpu {
    fn name(&self) -> &'static str {
        "brute-force-gpu"
    }

    fn init(&mut self, particles: &mut [Particle]) -> Result<()> {
        let mut context = pollster::block_on(GpuContext::new())?;
        if !particles.is_empty() {
            context.ensure_buffers(particles.len());
        }
        self.context = Some(context);
        Ok(())
    }

    fn update(&mut self, particles: &mut [Particle], params: &Parameters, dt: f32) -> Result<StepStats> {
        let start = Instant::now();
        let context = self
            .context
            .as_mut()
            .ok_or_else(|| anyhow!("brute-force-gpu used before init"))?;

        if !particles.is_empty() {
            context.step(particles, params, dt)?;
        }

        let elapsed = start.elapsed();
        debug!("brute-force-gpu step: n = {}, {:?}", particles.len(), elapsed);
        Ok(StepStats { dropped: 0, elapsed })
    }
}
