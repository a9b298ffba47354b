use crate::error::BackendError;
use bytemuck::{Pod, Zeroable};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use wgpu::{util::DeviceExt, PollType};

/// Wrapper for the WGPU device and queue, including transfer counters.
#[derive(Debug, Clone)]
pub struct GpuContext {
    pub(crate) device: Arc<wgpu::Device>,
    pub(crate) queue: Arc<wgpu::Queue>,
    pub(crate) adapter_info: wgpu::AdapterInfo,
    /// Tracks bytes transferred from CPU to GPU via instrumented methods.
    pub(crate) bytes_to_gpu: Arc<AtomicU64>,
    /// Tracks bytes transferred from GPU to CPU via instrumented methods.
    pub(crate) bytes_from_gpu: Arc<AtomicU64>,
}

impl GpuContext {
    /// Initializes the WGPU context. Fails unless the adapter grants `SHADER_F64`.
    pub(crate) async fn new(backends: wgpu::Backends) -> Result<Self, BackendError> {
        log::info!("Initializing native WGPU context");

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        log::debug!("Requesting native adapter");
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| BackendError::InitError(format!("No suitable adapter found: {}", e)))?;

        let adapter_info = adapter.get_info();
        log::info!("Selected Adapter: {:?}", adapter_info);

        if !adapter.features().contains(wgpu::Features::SHADER_F64) {
            return Err(BackendError::InitError(format!(
                "Adapter '{}' does not support SHADER_F64",
                adapter_info.name
            )));
        }

        let mut limits = wgpu::Limits::default().using_resolution(adapter.limits());
        limits.max_storage_buffers_per_shader_stage =
            limits.max_storage_buffers_per_shader_stage.max(3);
        log::debug!("Adjusted limits: {:?}", limits);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("linalg device"),
                trace: wgpu::Trace::Off,
                memory_hints: wgpu::MemoryHints::Performance,
                required_features: wgpu::Features::SHADER_F64,
                required_limits: limits,
            })
            .await
            .map_err(|e| BackendError::InitError(format!("Failed to request device: {}", e)))?;

        // Errors that escape an error scope would otherwise panic.
        device.on_uncaptured_error(Box::new(|e: wgpu::Error| {
            log::error!("Uncaptured WGPU error: {}", e);
        }));

        log::info!("Device and queue obtained successfully");

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_info,
            bytes_to_gpu: Arc::new(AtomicU64::new(0)),
            bytes_from_gpu: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_info.name
    }

    /// Largest buffer a single storage binding may cover.
    pub(crate) fn max_binding_bytes(&self) -> u64 {
        let limits = self.device.limits();
        u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size)
    }

    /// Runs `f` inside a validation + out-of-memory error scope.
    pub(crate) fn scoped<T>(
        &self,
        f: impl FnOnce() -> T,
        on_error: impl FnOnce(String) -> BackendError,
    ) -> Result<T, BackendError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        match validation.or(oom) {
            Some(err) => Err(on_error(err.to_string())),
            None => Ok(value),
        }
    }

    /// Helper to create a GPU buffer with initial data and track the transfer size.
    pub(crate) fn create_gpu_buffer_with_data(
        &self,
        label: &str,
        contents: &[u8],
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        let byte_len = contents.len() as u64;
        log::debug!("Creating GPU buffer '{}' with {} bytes", label, byte_len);
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage,
            });
        self.bytes_to_gpu.fetch_add(byte_len, Ordering::Relaxed);
        buffer
    }

    /// Helper to create an empty GPU buffer for kernel outputs.
    /// Does not count towards `bytes_to_gpu`.
    pub(crate) fn create_empty_buffer(
        &self,
        label: &str,
        size: u64,
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        log::debug!("Creating empty GPU buffer '{}' of size {}", label, size);
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        })
    }

    /// Blocks until the queue is idle.
    pub(crate) fn wait_idle(&self) -> Result<(), BackendError> {
        self.device
            .poll(PollType::Wait)
            .map(|_| ())
            .map_err(|e| BackendError::DeviceError(format!("Device poll failed: {}", e)))
    }

    /// Reads the contents of a GPU buffer back to the CPU through a staging buffer.
    ///
    /// # Errors
    /// Returns `BackendError::DeviceError` if mapping fails or the mapped size is off.
    pub(crate) async fn read_buffer_to_cpu<T: Pod + Zeroable>(
        &self,
        buffer: &wgpu::Buffer,
        element_count: usize,
    ) -> Result<Vec<T>, BackendError> {
        let element_size = std::mem::size_of::<T>();
        let size_bytes = (element_count * element_size) as u64;

        if size_bytes == 0 {
            return Ok(Vec::new());
        }
        if buffer.size() < size_bytes {
            return Err(BackendError::DeviceError(format!(
                "GPU buffer size ({}) is smaller than requested read ({})",
                buffer.size(),
                size_bytes
            )));
        }

        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging_buffer_for_readback"),
            size: size_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("read_buffer_encoder"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging_buffer, 0, size_bytes);
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            if let Err(e) = sender.send(result) {
                log::error!("Failed to send map result back: {:?}", e);
            }
        });

        self.wait_idle()?;

        match receiver.await {
            Ok(Ok(())) => {
                let result = {
                    let data = buffer_slice.get_mapped_range();
                    if data.len() != size_bytes as usize {
                        let mapped_len = data.len();
                        drop(data);
                        staging_buffer.unmap();
                        return Err(BackendError::DeviceError(format!(
                            "Mapped data size ({}) does not match expected byte size ({})",
                            mapped_len, size_bytes
                        )));
                    }
                    bytemuck::cast_slice::<u8, T>(&data).to_vec()
                };
                staging_buffer.unmap();
                self.bytes_from_gpu.fetch_add(size_bytes, Ordering::Relaxed);
                log::debug!("Buffer readback complete ({} bytes)", size_bytes);
                Ok(result)
            }
            Ok(Err(e)) => Err(BackendError::DeviceError(format!(
                "Buffer mapping failed: {}",
                e
            ))),
            Err(_) => Err(BackendError::DeviceError(
                "Channel receive error during buffer mapping".to_string(),
            )),
        }
    }

    /// Returns `(bytes_to_gpu, bytes_from_gpu)`.
    pub fn transfer_stats(&self) -> (u64, u64) {
        (
            self.bytes_to_gpu.load(Ordering::Relaxed),
            self.bytes_from_gpu.load(Ordering::Relaxed),
        )
    }

    pub fn reset_transfer_stats(&self) {
        self.bytes_to_gpu.store(0, Ordering::Relaxed);
        self.bytes_from_gpu.store(0, Ordering::Relaxed);
        log::info!("GPU transfer counters reset.");
    }
}
