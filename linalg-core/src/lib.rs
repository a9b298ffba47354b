//! # Linalg Core
//!
//! Scalar fields, dense and CSR storage, and the device backend boundary used
//! by the compute providers. The `gpu` feature adds the WGPU implementation
//! of [`DeviceBackend`].

pub mod backend;
pub mod dense_matrix;
pub mod error;
pub mod field;
pub mod matrix;
pub mod sparse_matrix;
pub mod traits;
pub mod vector;

#[cfg(feature = "gpu")]
pub mod context;
#[cfg(feature = "gpu")]
pub mod device;
#[cfg(feature = "gpu")]
mod ops;

pub use backend::{DeviceBackend, Kernel, KernelArgs, LaunchDims, PROGRAM_SOURCE};
pub use dense_matrix::DenseMatrix;
pub use error::{BackendError, LinalgError, Result};
pub use field::{Field, ModP};
pub use matrix::{Matrix, StorageKind, AUTO_SPARSE_DENSITY};
pub use sparse_matrix::{SparseMatrix, Triplet};
pub use traits::{MatrixLike, VectorLike};
pub use vector::Vector;

#[cfg(feature = "gpu")]
pub use context::GpuContext;
#[cfg(feature = "gpu")]
pub use device::{GpuBuffer, WgpuBackend};
#[cfg(feature = "gpu")]
pub use ops::CompiledProgram;
