use super::stats::GpuStats;
use linalg_core::{BackendError, DeviceBackend, Kernel, KernelArgs, LaunchDims, PROGRAM_SOURCE};

/// Expected value of the `1 + 2` self-test.
const SELF_TEST_EXPECTED: f64 = 3.0;

/// Outcome of the one-time device initialization.
pub(crate) enum DeviceState<B: DeviceBackend> {
    Usable {
        context: B::Context,
        program: B::Program,
    },
    /// Terminal: the device path is never tried again by this provider.
    Unusable(BackendError),
}

impl<B: DeviceBackend> DeviceState<B> {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            DeviceState::Usable { .. } => "usable",
            DeviceState::Unusable(_) => "unusable",
        }
    }
}

/// Releases every tracked device buffer when dropped.
pub(crate) struct BufferGuard<'a, B: DeviceBackend> {
    backend: &'a B,
    context: &'a B::Context,
    buffers: Vec<B::Buffer>,
}

impl<'a, B: DeviceBackend> BufferGuard<'a, B> {
    pub(crate) fn new(backend: &'a B, context: &'a B::Context) -> Self {
        Self {
            backend,
            context,
            buffers: Vec::with_capacity(3),
        }
    }

    pub(crate) fn track(&mut self, buffer: B::Buffer) -> usize {
        self.buffers.push(buffer);
        self.buffers.len() - 1
    }

    pub(crate) fn get(&self, handle: usize) -> &B::Buffer {
        &self.buffers[handle]
    }
}

impl<B: DeviceBackend> Drop for BufferGuard<'_, B> {
    fn drop(&mut self) {
        log::trace!("Releasing {} device buffers", self.buffers.len());
        for buffer in self.buffers.drain(..) {
            self.backend.release(self.context, buffer);
        }
    }
}

/// Uploads both operands, launches `kernel`, waits for it and reads the result.
pub(crate) fn run_kernel<B: DeviceBackend>(
    backend: &B,
    context: &B::Context,
    program: &B::Program,
    kernel: Kernel,
    a: &[f64],
    b: &[f64],
    dims: LaunchDims,
) -> Result<Vec<f64>, BackendError> {
    let out_len = dims.output_len();
    let mut guard = BufferGuard::new(backend, context);
    let a_buf = guard.track(backend.upload(context, "lhs", a)?);
    let b_buf = guard.track(backend.upload(context, "rhs", b)?);
    let out_buf = guard.track(backend.allocate(context, "result", out_len)?);

    backend.launch(
        context,
        program,
        kernel,
        &KernelArgs {
            a: guard.get(a_buf),
            b: guard.get(b_buf),
            out: guard.get(out_buf),
            dims,
        },
    )?;
    backend.synchronize(context)?;
    let result = backend.read(context, guard.get(out_buf), out_len)?;
    if result.len() != out_len {
        return Err(BackendError::DeviceError(format!(
            "{} returned {} elements, expected {}",
            kernel.entry_point(),
            result.len(),
            out_len
        )));
    }
    Ok(result)
}

fn bring_up<B: DeviceBackend>(
    backend: &B,
    stats: &GpuStats,
    tolerance: f64,
) -> Result<(B::Context, B::Program), BackendError> {
    let context = backend.create_context()?;
    stats.record_compilation();
    let program = backend.compile_program(&context, PROGRAM_SOURCE)?;

    stats.record_self_test();
    let result = run_kernel(
        backend,
        &context,
        &program,
        Kernel::VectorAdd,
        &[1.0],
        &[2.0],
        LaunchDims::Linear { len: 1 },
    )?;
    let actual = result[0];
    // Written so that NaN fails.
    if !((actual - SELF_TEST_EXPECTED).abs() <= tolerance) {
        return Err(BackendError::SelfTestFailed {
            expected: SELF_TEST_EXPECTED,
            actual,
        });
    }
    Ok((context, program))
}

/// Creates the context, compiles the program and runs the self-test.
pub(crate) fn initialize<B: DeviceBackend>(
    backend: &B,
    stats: &GpuStats,
    tolerance: f64,
) -> DeviceState<B> {
    log::info!("Initializing GPU device path on {}", backend.name());
    match bring_up(backend, stats, tolerance) {
        Ok((context, program)) => {
            log::info!("GPU self-test passed; device path enabled");
            DeviceState::Usable { context, program }
        }
        Err(e) => {
            log::warn!("GPU device path disabled: {}", e);
            DeviceState::Unusable(e)
        }
    }
}
