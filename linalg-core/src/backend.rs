//! Device backend boundary.
//!
//! This is the whole capability surface the compute engine needs from a
//! device runtime: probe, create a context, compile program text into
//! kernels, move buffers in and out, launch over an index space and block
//! until the queue drains. Driver installation, multi-adapter selection and
//! vendor SDK details stay below this line.

use crate::error::BackendError;

/// Program text shared by every backend that compiles WGSL.
pub const PROGRAM_SOURCE: &str = include_str!("shaders/linalg.wgsl");

/// Entry points of the compiled device program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    /// `c[i] = a[i] + b[i]` over `len` elements.
    VectorAdd,
    /// Row-major `c (m x n) = a (m x k) * b (k x n)`.
    MatrixMultiply,
}

impl Kernel {
    pub const ALL: [Kernel; 2] = [Kernel::VectorAdd, Kernel::MatrixMultiply];

    pub fn entry_point(&self) -> &'static str {
        match self {
            Kernel::VectorAdd => "vector_add",
            Kernel::MatrixMultiply => "matrix_multiply",
        }
    }
}

/// Index space of a kernel launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchDims {
    Linear { len: usize },
    Grid { m: usize, n: usize, k: usize },
}

impl LaunchDims {
    /// Number of output elements the launch writes.
    pub fn output_len(&self) -> usize {
        match *self {
            LaunchDims::Linear { len } => len,
            LaunchDims::Grid { m, n, .. } => m * n,
        }
    }
}

/// Buffers bound to a launch: two inputs and one output.
#[derive(Debug)]
pub struct KernelArgs<'a, B> {
    pub a: &'a B,
    pub b: &'a B,
    pub out: &'a B,
    pub dims: LaunchDims,
}

/// A device runtime able to run the engine's kernels.
///
/// Every fallible method reports a [`BackendError`]; callers treat any of them
/// as "device path unusable for this call".
pub trait DeviceBackend: Send + Sync + 'static {
    /// Execution context (device + queue) created once per provider.
    type Context: Send + Sync;
    /// Compiled kernel handles. Immutable once built.
    type Program: Send + Sync;
    /// Device-side buffer of `f64` elements.
    type Buffer;

    fn name(&self) -> String;

    /// Whether a compatible runtime can be loaded at all.
    fn is_runtime_available(&self) -> bool;

    fn create_context(&self) -> Result<Self::Context, BackendError>;

    fn compile_program(
        &self,
        ctx: &Self::Context,
        source: &str,
    ) -> Result<Self::Program, BackendError>;

    /// Allocates a buffer and transfers `data` into it.
    fn upload(
        &self,
        ctx: &Self::Context,
        label: &str,
        data: &[f64],
    ) -> Result<Self::Buffer, BackendError>;

    /// Allocates an output buffer of `len` elements.
    fn allocate(
        &self,
        ctx: &Self::Context,
        label: &str,
        len: usize,
    ) -> Result<Self::Buffer, BackendError>;

    /// Enqueues `kernel`. Completion is only guaranteed after [`synchronize`](Self::synchronize).
    fn launch(
        &self,
        ctx: &Self::Context,
        program: &Self::Program,
        kernel: Kernel,
        args: &KernelArgs<'_, Self::Buffer>,
    ) -> Result<(), BackendError>;

    /// Blocks until all enqueued work has finished.
    fn synchronize(&self, ctx: &Self::Context) -> Result<(), BackendError>;

    /// Copies `len` elements of `buffer` back to the host.
    fn read(
        &self,
        ctx: &Self::Context,
        buffer: &Self::Buffer,
        len: usize,
    ) -> Result<Vec<f64>, BackendError>;

    /// Frees a buffer. Must not fail.
    fn release(&self, ctx: &Self::Context, buffer: Self::Buffer);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_declares_every_entry_point() {
        for kernel in Kernel::ALL {
            assert!(
                PROGRAM_SOURCE.contains(&format!("fn {}", kernel.entry_point())),
                "missing entry point {}",
                kernel.entry_point()
            );
        }
    }

    #[test]
    fn test_launch_output_len() {
        assert_eq!(LaunchDims::Linear { len: 7 }.output_len(), 7);
        assert_eq!(LaunchDims::Grid { m: 2, n: 3, k: 9 }.output_len(), 6);
    }
}
