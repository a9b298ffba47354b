use crate::backend::{DeviceBackend, Kernel, KernelArgs};
use crate::context::GpuContext;
use crate::error::BackendError;
use crate::ops::{self, CompiledProgram};
use std::mem;

const EMPTY_PAD: [u8; 8] = [0; 8];

/// A device buffer of `f64` elements.
#[derive(Debug)]
pub struct GpuBuffer {
    buffer: wgpu::Buffer,
    len: usize,
}

impl GpuBuffer {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// [`DeviceBackend`] over WGPU compute pipelines.
///
/// Needs an adapter granting `SHADER_F64`; anything else is reported as
/// unavailable or as an init error.
#[derive(Debug, Clone)]
pub struct WgpuBackend {
    backends: wgpu::Backends,
}

impl Default for WgpuBackend {
    fn default() -> Self {
        Self::new(wgpu::Backends::PRIMARY)
    }
}

impl WgpuBackend {
    pub fn new(backends: wgpu::Backends) -> Self {
        Self { backends }
    }

    fn storage_usage() -> wgpu::BufferUsages {
        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST
    }

    // Zero-sized storage bindings are invalid, so every buffer holds at least one element.
    fn byte_size(ctx: &GpuContext, len: usize) -> Result<u64, BackendError> {
        let bytes = (len.max(1) * mem::size_of::<f64>()) as u64;
        if bytes > ctx.max_binding_bytes() {
            return Err(BackendError::AllocationFailed(format!(
                "{} bytes exceeds the device binding limit of {} bytes",
                bytes,
                ctx.max_binding_bytes()
            )));
        }
        Ok(bytes)
    }
}

impl DeviceBackend for WgpuBackend {
    type Context = GpuContext;
    type Program = CompiledProgram;
    type Buffer = GpuBuffer;

    fn name(&self) -> String {
        format!("wgpu ({:?})", self.backends)
    }

    fn is_runtime_available(&self) -> bool {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: self.backends,
            ..Default::default()
        });
        let available = instance
            .enumerate_adapters(self.backends)
            .iter()
            .any(|adapter| adapter.features().contains(wgpu::Features::SHADER_F64));
        log::debug!("WGPU runtime with SHADER_F64 present: {}", available);
        available
    }

    fn create_context(&self) -> Result<GpuContext, BackendError> {
        pollster::block_on(GpuContext::new(self.backends))
    }

    fn compile_program(
        &self,
        ctx: &GpuContext,
        source: &str,
    ) -> Result<CompiledProgram, BackendError> {
        log::info!("Compiling device program on '{}'", ctx.adapter_name());
        ops::compile_program(ctx, source)
    }

    fn upload(
        &self,
        ctx: &GpuContext,
        label: &str,
        data: &[f64],
    ) -> Result<GpuBuffer, BackendError> {
        Self::byte_size(ctx, data.len())?;
        let contents: &[u8] = if data.is_empty() {
            &EMPTY_PAD
        } else {
            bytemuck::cast_slice(data)
        };
        let buffer = ctx.scoped(
            || ctx.create_gpu_buffer_with_data(label, contents, Self::storage_usage()),
            BackendError::AllocationFailed,
        )?;
        Ok(GpuBuffer {
            buffer,
            len: data.len(),
        })
    }

    fn allocate(
        &self,
        ctx: &GpuContext,
        label: &str,
        len: usize,
    ) -> Result<GpuBuffer, BackendError> {
        let size = Self::byte_size(ctx, len)?;
        let buffer = ctx.scoped(
            || ctx.create_empty_buffer(label, size, Self::storage_usage()),
            BackendError::AllocationFailed,
        )?;
        Ok(GpuBuffer { buffer, len })
    }

    fn launch(
        &self,
        ctx: &GpuContext,
        program: &CompiledProgram,
        kernel: Kernel,
        args: &KernelArgs<'_, GpuBuffer>,
    ) -> Result<(), BackendError> {
        if args.out.len < args.dims.output_len() {
            return Err(BackendError::DeviceError(format!(
                "Output buffer holds {} elements, launch writes {}",
                args.out.len,
                args.dims.output_len()
            )));
        }
        ops::encode_launch(
            ctx,
            program,
            kernel,
            &args.a.buffer,
            &args.b.buffer,
            &args.out.buffer,
            args.dims,
        )
    }

    fn synchronize(&self, ctx: &GpuContext) -> Result<(), BackendError> {
        ctx.wait_idle()
    }

    fn read(
        &self,
        ctx: &GpuContext,
        buffer: &GpuBuffer,
        len: usize,
    ) -> Result<Vec<f64>, BackendError> {
        if len > buffer.len {
            return Err(BackendError::DeviceError(format!(
                "Read of {} elements from a buffer of {}",
                len, buffer.len
            )));
        }
        pollster::block_on(ctx.read_buffer_to_cpu::<f64>(&buffer.buffer, len))
    }

    fn release(&self, _ctx: &GpuContext, buffer: GpuBuffer) {
        buffer.buffer.destroy();
    }
}
