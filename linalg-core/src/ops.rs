// Compiled device program and kernel encoding for the WGPU backend.
// Pipelines are built once per context and reused for every launch.

use crate::backend::{Kernel, LaunchDims};
use crate::context::GpuContext;
use crate::error::BackendError;
use bytemuck::{Pod, Zeroable};
use std::collections::HashMap;
use std::mem;

const LINEAR_WORKGROUP: u32 = 64;
const GRID_WORKGROUP: u32 = 8;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct KernelParams {
    m: u32,
    n: u32,
    k: u32,
    len: u32,
}

/// Pipelines for every entry point of the program, sharing one bind layout.
#[derive(Debug)]
pub struct CompiledProgram {
    layout: wgpu::BindGroupLayout,
    pipelines: HashMap<Kernel, wgpu::ComputePipeline>,
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

/// Compiles `source` and builds a pipeline per [`Kernel`].
pub(crate) fn compile_program(
    context: &GpuContext,
    source: &str,
) -> Result<CompiledProgram, BackendError> {
    let device = &context.device;
    context.scoped(
        || {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Linalg Program"),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });

            let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Linalg Bind Group Layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        // params
                        binding: 0,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: wgpu::BufferSize::new(
                                mem::size_of::<KernelParams>() as u64,
                            ),
                        },
                        count: None,
                    },
                    storage_entry(1, true),
                    storage_entry(2, true),
                    storage_entry(3, false),
                ],
            });

            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Linalg Pipeline Layout"),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });

            let pipelines = Kernel::ALL
                .iter()
                .map(|&kernel| {
                    let pipeline =
                        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                            label: Some(kernel.entry_point()),
                            layout: Some(&pipeline_layout),
                            module: &module,
                            entry_point: Some(kernel.entry_point()),
                            cache: None,
                            compilation_options: Default::default(),
                        });
                    (kernel, pipeline)
                })
                .collect();

            CompiledProgram { layout, pipelines }
        },
        BackendError::ShaderError,
    )
}

fn to_u32(value: usize, what: &str) -> Result<u32, BackendError> {
    u32::try_from(value)
        .map_err(|_| BackendError::DeviceError(format!("{} ({}) exceeds u32 range", what, value)))
}

fn workgroups(extent: u32, size: u32) -> u32 {
    extent.div_ceil(size).max(1)
}

/// Encodes and submits one launch of `kernel`. Does not wait for completion.
pub(crate) fn encode_launch(
    context: &GpuContext,
    program: &CompiledProgram,
    kernel: Kernel,
    a: &wgpu::Buffer,
    b: &wgpu::Buffer,
    out: &wgpu::Buffer,
    dims: LaunchDims,
) -> Result<(), BackendError> {
    let pipeline = program.pipelines.get(&kernel).ok_or_else(|| {
        BackendError::ShaderError(format!("Kernel '{}' not compiled", kernel.entry_point()))
    })?;

    let (params, groups) = match dims {
        LaunchDims::Linear { len } => {
            let len = to_u32(len, "vector length")?;
            (
                KernelParams {
                    m: 0,
                    n: 0,
                    k: 0,
                    len,
                },
                (workgroups(len, LINEAR_WORKGROUP), 1),
            )
        }
        LaunchDims::Grid { m, n, k } => {
            let (m, n, k) = (
                to_u32(m, "rows")?,
                to_u32(n, "cols")?,
                to_u32(k, "inner dim")?,
            );
            (
                KernelParams { m, n, k, len: 0 },
                (workgroups(n, GRID_WORKGROUP), workgroups(m, GRID_WORKGROUP)),
            )
        }
    };

    let max_groups = context.device.limits().max_compute_workgroups_per_dimension;
    if groups.0 > max_groups || groups.1 > max_groups {
        return Err(BackendError::DeviceError(format!(
            "Dispatch {:?} exceeds {} workgroups per dimension",
            groups, max_groups
        )));
    }

    let params_buffer = context.create_gpu_buffer_with_data(
        "Linalg Params Buffer",
        bytemuck::bytes_of(&params),
        wgpu::BufferUsages::UNIFORM,
    );

    context.scoped(
        || {
            let bind_group = context
                .device
                .create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Linalg Bind Group"),
                    layout: &program.layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: params_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: a.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: b.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: out.as_entire_binding(),
                        },
                    ],
                });

            let mut encoder =
                context
                    .device
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                        label: Some(kernel.entry_point()),
                    });
            {
                let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(kernel.entry_point()),
                    timestamp_writes: None,
                });
                compute_pass.set_pipeline(pipeline);
                compute_pass.set_bind_group(0, &bind_group, &[]);
                compute_pass.dispatch_workgroups(groups.0, groups.1, 1);
            }
            context.queue.submit(std::iter::once(encoder.finish()));
        },
        BackendError::DeviceError,
    )
}
