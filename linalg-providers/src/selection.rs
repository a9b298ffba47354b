//! Availability and priority ranking over a set of providers.

use crate::config::EngineConfig;
use crate::cpu_dense::CpuDenseProvider;
use crate::cpu_sparse::CpuSparseProvider;
use crate::gpu::gpu_provider;
use crate::provider::ComputeProvider;
use linalg_core::{Field, LinalgError, Result};

/// The built-in providers for `config`: CPU Dense, CPU Sparse and, when
/// compiled in, the GPU provider.
pub fn default_providers<E: Field>(config: &EngineConfig) -> Vec<Box<dyn ComputeProvider<E>>> {
    let mut providers: Vec<Box<dyn ComputeProvider<E>>> = vec![
        Box::new(CpuDenseProvider::new(config.dense.clone())),
        Box::new(CpuSparseProvider::new(
            config.sparse.clone(),
            config.dense.clone(),
        )),
    ];
    if let Some(gpu) = gpu_provider::<E>(config) {
        providers.push(gpu);
    }
    providers
}

/// Available providers, highest priority first. Ties keep their input order.
pub fn rank<E: Field>(providers: &[Box<dyn ComputeProvider<E>>]) -> Vec<&dyn ComputeProvider<E>> {
    let mut ranked: Vec<&dyn ComputeProvider<E>> = providers
        .iter()
        .map(|p| p.as_ref())
        .filter(|p| p.is_available())
        .collect();
    ranked.sort_by_key(|p| std::cmp::Reverse(p.priority()));
    ranked
}

/// Runs `op` on each ranked provider until one does not answer
/// [`LinalgError::UnsupportedOperation`]. Any other error is returned as is.
pub fn dispatch<E: Field, T>(
    providers: &[Box<dyn ComputeProvider<E>>],
    mut op: impl FnMut(&dyn ComputeProvider<E>) -> Result<T>,
) -> Result<T> {
    let mut last_unsupported = None;
    for provider in rank(providers) {
        match op(provider) {
            Err(e) if e.is_unsupported() => {
                log::debug!("{} declined: {}", provider.id(), e);
                last_unsupported = Some(e);
            }
            other => return other,
        }
    }
    Err(last_unsupported.unwrap_or_else(|| {
        LinalgError::UnsupportedOperation("no available provider".to_string())
    }))
}
