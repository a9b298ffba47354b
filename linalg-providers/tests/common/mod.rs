#![allow(dead_code)]

use linalg_providers::{BackendError, DeviceBackend, Kernel, KernelArgs, LaunchDims};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_module("wgpu", log::LevelFilter::Off)
        .filter_module("naga", log::LevelFilter::Off)
        .try_init();
}

#[derive(Debug, Default)]
struct Faults {
    unavailable: AtomicBool,
    fail_context: AtomicBool,
    fail_compile: AtomicBool,
    corrupt_results: AtomicBool,
    fail_allocation: AtomicBool,
    fail_launch: AtomicBool,
}

#[derive(Debug, Default)]
struct Counters {
    contexts: AtomicUsize,
    compilations: AtomicUsize,
    launches: AtomicUsize,
    uploads: AtomicUsize,
    allocations: AtomicUsize,
    releases: AtomicUsize,
    live_buffers: AtomicUsize,
}

#[derive(Debug, Default)]
struct Shared {
    faults: Faults,
    counters: Counters,
    compile_delay_ms: AtomicUsize,
}

/// In-process device backend that computes kernels on the host and can be
/// told to fail at any stage. Clones share state, so a test keeps one handle
/// while the provider owns another.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBackend {
    shared: Arc<Shared>,
}

#[derive(Debug)]
pub struct SimContext;

#[derive(Debug)]
pub struct SimProgram {
    kernels: Vec<Kernel>,
}

#[derive(Debug)]
pub struct SimBuffer {
    data: Mutex<Vec<f64>>,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        let backend = Self::default();
        backend.shared.faults.unavailable.store(true, Ordering::SeqCst);
        backend
    }

    pub fn set_fail_context(&self, on: bool) {
        self.shared.faults.fail_context.store(on, Ordering::SeqCst);
    }

    pub fn set_fail_compile(&self, on: bool) {
        self.shared.faults.fail_compile.store(on, Ordering::SeqCst);
    }

    /// Every kernel result is off by one.
    pub fn set_corrupt_results(&self, on: bool) {
        self.shared.faults.corrupt_results.store(on, Ordering::SeqCst);
    }

    pub fn set_fail_allocation(&self, on: bool) {
        self.shared.faults.fail_allocation.store(on, Ordering::SeqCst);
    }

    pub fn set_fail_launch(&self, on: bool) {
        self.shared.faults.fail_launch.store(on, Ordering::SeqCst);
    }

    pub fn set_compile_delay(&self, delay: Duration) {
        self.shared
            .compile_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    pub fn contexts(&self) -> usize {
        self.shared.counters.contexts.load(Ordering::SeqCst)
    }

    pub fn compilations(&self) -> usize {
        self.shared.counters.compilations.load(Ordering::SeqCst)
    }

    pub fn launches(&self) -> usize {
        self.shared.counters.launches.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> usize {
        self.shared.counters.uploads.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.shared.counters.releases.load(Ordering::SeqCst)
    }

    pub fn live_buffers(&self) -> usize {
        self.shared.counters.live_buffers.load(Ordering::SeqCst)
    }

    fn fault(&self, flag: &AtomicBool) -> bool {
        flag.load(Ordering::SeqCst)
    }

    fn new_buffer(&self, data: Vec<f64>) -> SimBuffer {
        self.shared.counters.live_buffers.fetch_add(1, Ordering::SeqCst);
        SimBuffer {
            data: Mutex::new(data),
        }
    }
}

impl DeviceBackend for SimulatedBackend {
    type Context = SimContext;
    type Program = SimProgram;
    type Buffer = SimBuffer;

    fn name(&self) -> String {
        "simulated".to_string()
    }

    fn is_runtime_available(&self) -> bool {
        !self.fault(&self.shared.faults.unavailable)
    }

    fn create_context(&self) -> Result<SimContext, BackendError> {
        self.shared.counters.contexts.fetch_add(1, Ordering::SeqCst);
        if self.fault(&self.shared.faults.fail_context) {
            return Err(BackendError::InitError("simulated context failure".to_string()));
        }
        Ok(SimContext)
    }

    fn compile_program(&self, _ctx: &SimContext, source: &str) -> Result<SimProgram, BackendError> {
        self.shared.counters.compilations.fetch_add(1, Ordering::SeqCst);
        let delay = self.shared.compile_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay as u64));
        }
        if self.fault(&self.shared.faults.fail_compile) {
            return Err(BackendError::ShaderError("simulated compile error".to_string()));
        }
        let kernels = Kernel::ALL
            .iter()
            .copied()
            .filter(|k| source.contains(k.entry_point()))
            .collect();
        Ok(SimProgram { kernels })
    }

    fn upload(
        &self,
        _ctx: &SimContext,
        _label: &str,
        data: &[f64],
    ) -> Result<SimBuffer, BackendError> {
        if self.fault(&self.shared.faults.fail_allocation) {
            return Err(BackendError::AllocationFailed("simulated out of memory".to_string()));
        }
        self.shared.counters.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(self.new_buffer(data.to_vec()))
    }

    fn allocate(
        &self,
        _ctx: &SimContext,
        _label: &str,
        len: usize,
    ) -> Result<SimBuffer, BackendError> {
        if self.fault(&self.shared.faults.fail_allocation) {
            return Err(BackendError::AllocationFailed("simulated out of memory".to_string()));
        }
        self.shared.counters.allocations.fetch_add(1, Ordering::SeqCst);
        Ok(self.new_buffer(vec![0.0; len]))
    }

    fn launch(
        &self,
        _ctx: &SimContext,
        program: &SimProgram,
        kernel: Kernel,
        args: &KernelArgs<'_, SimBuffer>,
    ) -> Result<(), BackendError> {
        self.shared.counters.launches.fetch_add(1, Ordering::SeqCst);
        if self.fault(&self.shared.faults.fail_launch) {
            return Err(BackendError::DeviceError("simulated driver fault".to_string()));
        }
        if !program.kernels.contains(&kernel) {
            return Err(BackendError::ShaderError(format!(
                "kernel {} not compiled",
                kernel.entry_point()
            )));
        }
        let a = args.a.data.lock().unwrap();
        let b = args.b.data.lock().unwrap();
        let mut out = args.out.data.lock().unwrap();
        match (kernel, args.dims) {
            (Kernel::VectorAdd, LaunchDims::Linear { len }) => {
                for i in 0..len {
                    out[i] = a[i] + b[i];
                }
            }
            (Kernel::MatrixMultiply, LaunchDims::Grid { m, n, k }) => {
                for i in 0..m {
                    for j in 0..n {
                        out[i * n + j] = (0..k).map(|p| a[i * k + p] * b[p * n + j]).sum();
                    }
                }
            }
            (kernel, dims) => {
                return Err(BackendError::DeviceError(format!(
                    "{} cannot run over {:?}",
                    kernel.entry_point(),
                    dims
                )))
            }
        }
        if self.fault(&self.shared.faults.corrupt_results) {
            out.iter_mut().for_each(|v| *v += 1.0);
        }
        Ok(())
    }

    fn synchronize(&self, _ctx: &SimContext) -> Result<(), BackendError> {
        Ok(())
    }

    fn read(
        &self,
        _ctx: &SimContext,
        buffer: &SimBuffer,
        len: usize,
    ) -> Result<Vec<f64>, BackendError> {
        let data = buffer.data.lock().unwrap();
        Ok(data[..len].to_vec())
    }

    fn release(&self, _ctx: &SimContext, _buffer: SimBuffer) {
        self.shared.counters.releases.fetch_add(1, Ordering::SeqCst);
        self.shared.counters.live_buffers.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Seeded random sparse matrix with small integer entries, so sums and
/// products stay exact in `f64`.
pub fn random_sparse_rows(
    rng: &mut fastrand::Rng,
    rows: usize,
    cols: usize,
    density: f64,
) -> Vec<Vec<f64>> {
    (0..rows)
        .map(|_| {
            (0..cols)
                .map(|_| {
                    if rng.f64() < density {
                        rng.i32(-4..=4) as f64
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect()
}
