//! GPU provider.
//!
//! Offloads `vector_add` and large dense `matrix_multiply` to a
//! [`DeviceBackend`]; every other operation, every non-real scalar type and
//! every device failure is served by [`CpuDenseProvider`].
//!
//! The device is brought up lazily on the first eligible call: context,
//! program compilation and a `1 + 2` self-test run exactly once per provider,
//! even under concurrent first use. A failed bring-up is final.

mod state;
mod stats;

pub use stats::{GpuStats, GpuStatsSnapshot};

use crate::config::{EngineConfig, GpuConfig};
use crate::cpu_dense::CpuDenseProvider;
use crate::provider::{ComputeProvider, PRIORITY_GPU, PRIORITY_UNAVAILABLE};
use cfg_if::cfg_if;
use linalg_core::{
    BackendError, DenseMatrix, DeviceBackend, Field, Kernel, LaunchDims, LinalgError, Matrix,
    MatrixLike, Result, Vector,
};
use state::DeviceState;
use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::sync::OnceLock;

pub const GPU_ID: &str = "gpu-dense";

pub struct GpuProvider<E: Field, B: DeviceBackend> {
    backend: B,
    config: GpuConfig,
    cpu: CpuDenseProvider,
    runtime_present: bool,
    state: OnceLock<DeviceState<B>>,
    stats: GpuStats,
    _field: PhantomData<fn() -> E>,
}

impl<E: Field, B: DeviceBackend> fmt::Debug for GpuProvider<E, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuProvider")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .field("runtime_present", &self.runtime_present)
            .field(
                "state",
                &self.state.get().map_or("uninitialized", DeviceState::label),
            )
            .finish()
    }
}

impl<E: Field, B: DeviceBackend> GpuProvider<E, B> {
    /// Probes the runtime once; the device itself is not touched until first use.
    pub fn new(backend: B, config: &EngineConfig) -> Self {
        let runtime_present = config.gpu.enabled && backend.is_runtime_available();
        log::info!(
            "GPU provider on {}: runtime present = {}",
            backend.name(),
            runtime_present
        );
        Self {
            backend,
            config: config.gpu.clone(),
            cpu: CpuDenseProvider::new(config.dense.clone()),
            runtime_present,
            state: OnceLock::new(),
            stats: GpuStats::default(),
            _field: PhantomData,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn stats(&self) -> GpuStatsSnapshot {
        self.stats.snapshot()
    }

    /// Device context, once bring-up has succeeded.
    pub fn device_context(&self) -> Option<&B::Context> {
        match self.state.get() {
            Some(DeviceState::Usable { context, .. }) => Some(context),
            _ => None,
        }
    }

    /// Error that disabled the device path, if bring-up failed.
    pub fn failure(&self) -> Option<&BackendError> {
        match self.state.get() {
            Some(DeviceState::Unusable(e)) => Some(e),
            _ => None,
        }
    }

    /// Runs bring-up now instead of on first use. Returns whether the device path is usable.
    pub fn warm_up(&self) -> bool {
        self.device().is_some()
    }

    fn device(&self) -> Option<(&B::Context, &B::Program)> {
        if !self.runtime_present || !E::is_real() {
            return None;
        }
        let state = self.state.get_or_init(|| {
            state::initialize(&self.backend, &self.stats, self.config.self_test_tolerance)
        });
        match state {
            DeviceState::Usable { context, program } => Some((context, program)),
            DeviceState::Unusable(_) => None,
        }
    }

    /// Device-format view of `data`: borrowed when the layout already
    /// matches, otherwise converted element by element.
    fn stage<'a>(&self, data: &'a [E]) -> std::result::Result<Cow<'a, [f64]>, BackendError> {
        if let Some(view) = E::as_real_slice(data) {
            self.stats.record_upload(true);
            return Ok(Cow::Borrowed(view));
        }
        let linear = data
            .iter()
            .map(Field::to_real)
            .collect::<Option<Vec<f64>>>()
            .ok_or(BackendError::UnsupportedScalar)?;
        self.stats.record_upload(false);
        Ok(Cow::Owned(linear))
    }

    /// Runs `kernel` on the device. `None` means the caller must compute on the CPU.
    fn offload(&self, kernel: Kernel, a: &[E], b: &[E], dims: LaunchDims) -> Option<Vec<E>> {
        let (context, program) = self.device()?;
        self.stats.record_attempt();
        log::debug!("Dispatching {} to the device ({:?})", kernel.entry_point(), dims);

        let result = self
            .stage(a)
            .and_then(|a| Ok((a, self.stage(b)?)))
            .and_then(|(a, b)| {
                state::run_kernel(&self.backend, context, program, kernel, &a, &b, dims)
            })
            .and_then(|out| E::from_real_vec(out).ok_or(BackendError::UnsupportedScalar));

        match result {
            Ok(values) => {
                self.stats.record_success();
                Some(values)
            }
            Err(e) => {
                log::warn!(
                    "{} failed on the device, falling back to CPU: {}",
                    kernel.entry_point(),
                    e
                );
                self.stats.record_fallback();
                None
            }
        }
    }
}

impl<E: Field, B: DeviceBackend> ComputeProvider<E> for GpuProvider<E, B> {
    fn id(&self) -> &'static str {
        GPU_ID
    }

    fn name(&self) -> String {
        format!("GPU ({})", self.backend.name())
    }

    /// False once bring-up has failed, without a runtime, or for non-real scalars.
    fn is_available(&self) -> bool {
        self.runtime_present
            && E::is_real()
            && !matches!(self.state.get(), Some(DeviceState::Unusable(_)))
    }

    fn priority(&self) -> i32 {
        if ComputeProvider::<E>::is_available(self) {
            PRIORITY_GPU
        } else {
            PRIORITY_UNAVAILABLE
        }
    }

    fn vector_add(&self, a: &Vector<E>, b: &Vector<E>) -> Result<Vector<E>> {
        if a.dimension() != b.dimension() {
            return Err(LinalgError::DimensionMismatch(format!(
                "vector_add: vector lengths {} and {} differ",
                a.dimension(),
                b.dimension()
            )));
        }
        if a.dimension() > 0 {
            let dims = LaunchDims::Linear { len: a.dimension() };
            if let Some(data) = self.offload(Kernel::VectorAdd, a.as_slice(), b.as_slice(), dims) {
                return Ok(Vector::from_vec(data));
            }
        }
        self.cpu.vector_add(a, b)
    }

    fn vector_subtract(&self, a: &Vector<E>, b: &Vector<E>) -> Result<Vector<E>> {
        self.cpu.vector_subtract(a, b)
    }

    fn vector_scale(&self, v: &Vector<E>, scalar: &E) -> Result<Vector<E>> {
        self.cpu.vector_scale(v, scalar)
    }

    fn dot(&self, a: &Vector<E>, b: &Vector<E>) -> Result<E> {
        self.cpu.dot(a, b)
    }

    fn norm(&self, v: &Vector<E>) -> Result<E> {
        self.cpu.norm(v)
    }

    fn matrix_add(&self, a: &Matrix<E>, b: &Matrix<E>) -> Result<Matrix<E>> {
        self.cpu.matrix_add(a, b)
    }

    fn matrix_subtract(&self, a: &Matrix<E>, b: &Matrix<E>) -> Result<Matrix<E>> {
        self.cpu.matrix_subtract(a, b)
    }

    fn matrix_scale(&self, a: &Matrix<E>, scalar: &E) -> Result<Matrix<E>> {
        self.cpu.matrix_scale(a, scalar)
    }

    fn matrix_multiply(&self, a: &Matrix<E>, b: &Matrix<E>) -> Result<Matrix<E>> {
        let ((m, k), (k_b, n)) = (a.dims(), b.dims());
        if k != k_b {
            return Err(LinalgError::DimensionMismatch(format!(
                "matrix_multiply: {}x{} times {}x{}",
                m, k, k_b, n
            )));
        }
        let work = m.saturating_mul(n).saturating_mul(k);
        let (a, b) = (a.to_dense(), b.to_dense());
        if work >= self.config.work_size_threshold {
            let dims = LaunchDims::Grid { m, n, k };
            if let Some(data) = self.offload(Kernel::MatrixMultiply, a.data(), b.data(), dims) {
                return Ok(DenseMatrix::new(m, n, data)?.into());
            }
        } else {
            log::debug!(
                "matrix_multiply work {} below device threshold {}, using CPU",
                work,
                self.config.work_size_threshold
            );
        }
        Ok(self.cpu.multiply_dense(&a, &b)?.into())
    }

    fn matrix_vector_multiply(&self, a: &Matrix<E>, v: &Vector<E>) -> Result<Vector<E>> {
        self.cpu.matrix_vector_multiply(a, v)
    }

    fn transpose(&self, a: &Matrix<E>) -> Result<Matrix<E>> {
        self.cpu.transpose(a)
    }

    fn inverse(&self, a: &Matrix<E>) -> Result<Matrix<E>> {
        self.cpu.inverse(a)
    }

    fn determinant(&self, a: &Matrix<E>) -> Result<E> {
        self.cpu.determinant(a)
    }

    fn solve(&self, a: &Matrix<E>, b: &Vector<E>) -> Result<Vector<E>> {
        self.cpu.solve(a, b)
    }
}

cfg_if! {
    if #[cfg(feature = "gpu")] {
        use linalg_core::WgpuBackend;

        /// GPU provider over the default WGPU backends.
        pub fn gpu_provider<E: Field>(
            config: &EngineConfig,
        ) -> Option<Box<dyn ComputeProvider<E>>> {
            let provider: GpuProvider<E, WgpuBackend> =
                GpuProvider::new(WgpuBackend::default(), config);
            Some(Box::new(provider))
        }
    } else {
        /// Always `None`: built without the `gpu` feature.
        pub fn gpu_provider<E: Field>(
            _config: &EngineConfig,
        ) -> Option<Box<dyn ComputeProvider<E>>> {
            log::debug!("GPU support not compiled in");
            None
        }
    }
}
