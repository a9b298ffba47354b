//! `linalg-providers`: pluggable compute providers for vector and matrix
//! operations.
//!
//! Three providers ship with the crate:
//!
//! - [`CpuDenseProvider`], the reference implementation of every operation
//!   and the fallback of all others;
//! - [`CpuSparseProvider`], CSR kernels for sparse operands;
//! - [`GpuProvider`], device kernels for vector add and large dense
//!   products, self-tested before first use.
//!
//! [`rank`] and [`dispatch`] implement the priority protocol a registry uses
//! to pick among them.

pub mod config;
pub mod cpu_dense;
pub mod cpu_sparse;
pub mod gpu;
pub mod provider;
pub mod selection;

pub use config::{ConfigError, DenseConfig, EngineConfig, GpuConfig, SparseConfig};
pub use cpu_dense::CpuDenseProvider;
pub use cpu_sparse::CpuSparseProvider;
pub use gpu::{gpu_provider, GpuProvider, GpuStats, GpuStatsSnapshot};
pub use provider::{
    ComputeProvider, PRIORITY_CPU_DENSE, PRIORITY_CPU_SPARSE, PRIORITY_GPU, PRIORITY_UNAVAILABLE,
};
pub use selection::{default_providers, dispatch, rank};

pub use linalg_core::{
    BackendError, DenseMatrix, DeviceBackend, Field, Kernel, KernelArgs, LaunchDims, LinalgError,
    Matrix, MatrixLike, ModP, SparseMatrix, StorageKind, Triplet, Vector, VectorLike,
};
