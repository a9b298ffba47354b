mod common;

use approx::assert_relative_eq;
use common::{init_logging, SimulatedBackend};
use linalg_providers::{
    ComputeProvider, CpuDenseProvider, DenseMatrix, EngineConfig, GpuConfig, GpuProvider,
    LinalgError, Matrix, ModP, Vector, PRIORITY_GPU, PRIORITY_UNAVAILABLE,
};
use std::sync::Arc;
use std::time::Duration;

fn config_with_threshold(work_size_threshold: usize) -> EngineConfig {
    EngineConfig::default().with_gpu(GpuConfig::with_params(true, work_size_threshold, 1e-4))
}

fn provider(backend: &SimulatedBackend, threshold: usize) -> GpuProvider<f64, SimulatedBackend> {
    GpuProvider::new(backend.clone(), &config_with_threshold(threshold))
}

fn square(n: usize, seed: usize) -> Matrix<f64> {
    DenseMatrix::from_fn(n, n, |i, j| ((i * 31 + j * 17 + seed) % 23) as f64 - 11.0).into()
}

fn vectors() -> (Vector<f64>, Vector<f64>) {
    (
        Vector::from_vec(vec![1.0, 2.0, 3.0, 4.0]),
        Vector::from_vec(vec![0.5, -2.0, 10.0, 0.25]),
    )
}

#[test]
fn test_vector_add_runs_on_device_after_self_test() {
    init_logging();
    let backend = SimulatedBackend::new();
    let gpu = provider(&backend, 1_000_000);
    assert!(gpu.is_available());
    assert_eq!(gpu.priority(), PRIORITY_GPU);
    // Nothing is touched before the first operation.
    assert_eq!(backend.contexts(), 0);

    let (a, b) = vectors();
    let sum = gpu.vector_add(&a, &b).unwrap();
    assert_eq!(sum, CpuDenseProvider::default().vector_add(&a, &b).unwrap());

    let stats = gpu.stats();
    assert_eq!(stats.self_test_runs, 1);
    assert_eq!(stats.compilations, 1);
    assert_eq!(stats.device_attempts, 1);
    assert_eq!(stats.device_successes, 1);
    assert_eq!(stats.fallbacks, 0);
    // Self-test launch plus the operation itself.
    assert_eq!(backend.launches(), 2);
    assert!(gpu.device_context().is_some());
}

#[test]
fn test_failed_self_test_disables_device_for_good() {
    init_logging();
    let backend = SimulatedBackend::new();
    backend.set_corrupt_results(true);
    let gpu = provider(&backend, 0);

    let (a, b) = vectors();
    let expected = CpuDenseProvider::default().vector_add(&a, &b).unwrap();
    assert_eq!(gpu.vector_add(&a, &b).unwrap(), expected);
    assert!(!gpu.is_available());
    assert_eq!(gpu.priority(), PRIORITY_UNAVAILABLE);
    assert!(matches!(
        gpu.failure(),
        Some(linalg_providers::BackendError::SelfTestFailed { .. })
    ));

    // A healthy device later on does not bring the path back.
    backend.set_corrupt_results(false);
    let launches_after_self_test = backend.launches();
    for _ in 0..5 {
        assert_eq!(gpu.vector_add(&a, &b).unwrap(), expected);
        gpu.matrix_multiply(&square(4, 1), &square(4, 2)).unwrap();
    }
    assert_eq!(backend.launches(), launches_after_self_test);
    assert_eq!(backend.contexts(), 1);
    let stats = gpu.stats();
    assert_eq!(stats.self_test_runs, 1);
    assert_eq!(stats.device_attempts, 0);
}

#[test]
fn test_compile_failure_falls_back() {
    init_logging();
    let backend = SimulatedBackend::new();
    backend.set_fail_compile(true);
    let gpu = provider(&backend, 0);
    let (a, b) = vectors();
    assert!(gpu.vector_add(&a, &b).is_ok());
    assert!(!gpu.warm_up());
    assert_eq!(gpu.stats().self_test_runs, 0);
    assert!(!gpu.is_available());
}

#[test]
fn test_context_failure_falls_back() {
    let backend = SimulatedBackend::new();
    backend.set_fail_context(true);
    let gpu = provider(&backend, 0);
    let product = gpu.matrix_multiply(&square(3, 0), &square(3, 5)).unwrap();
    let expected = CpuDenseProvider::default()
        .matrix_multiply(&square(3, 0), &square(3, 5))
        .unwrap();
    assert_eq!(product, expected);
    assert_eq!(backend.compilations(), 0);
    assert!(!gpu.is_available());
}

#[test]
fn test_allocation_failure_yields_cpu_result() {
    init_logging();
    let backend = SimulatedBackend::new();
    let gpu = provider(&backend, 0);
    assert!(gpu.warm_up());

    backend.set_fail_allocation(true);
    let (a, b) = (square(8, 3), square(8, 4));
    let product = gpu.matrix_multiply(&a, &b).unwrap();
    let expected = CpuDenseProvider::default().matrix_multiply(&a, &b).unwrap();
    assert_eq!(product, expected);

    let stats = gpu.stats();
    assert_eq!(stats.device_attempts, 1);
    assert_eq!(stats.fallbacks, 1);
    // A per-call failure does not disable the device path.
    assert!(gpu.is_available());
    assert_eq!(backend.live_buffers(), 0);

    backend.set_fail_allocation(false);
    assert_eq!(gpu.matrix_multiply(&a, &b).unwrap(), expected);
    assert_eq!(gpu.stats().device_successes, 1);
}

#[test]
fn test_launch_failure_releases_buffers() {
    let backend = SimulatedBackend::new();
    let gpu = provider(&backend, 0);
    assert!(gpu.warm_up());
    let releases_before = backend.releases();

    backend.set_fail_launch(true);
    let (a, b) = vectors();
    assert_eq!(
        gpu.vector_add(&a, &b).unwrap().as_slice(),
        &[1.5, 0.0, 13.0, 4.25]
    );
    // lhs, rhs and result buffers were all freed.
    assert_eq!(backend.releases() - releases_before, 3);
    assert_eq!(backend.live_buffers(), 0);
    assert_eq!(gpu.stats().fallbacks, 1);
}

#[test]
fn test_device_results_match_cpu() {
    let backend = SimulatedBackend::new();
    let gpu = provider(&backend, 0);
    let cpu = CpuDenseProvider::default();
    let a: Matrix<f64> =
        DenseMatrix::from_fn(7, 5, |i, j| (i as f64 + 1.0) / (j as f64 + 2.0)).into();
    let b: Matrix<f64> = DenseMatrix::from_fn(5, 3, |i, j| (i * j) as f64 * 0.1 - 0.7).into();

    let device = gpu.matrix_multiply(&a, &b).unwrap();
    let host = cpu.matrix_multiply(&a, &b).unwrap();
    assert_eq!(gpu.stats().device_successes, 1);
    for (x, y) in device.to_dense().data().iter().zip(host.to_dense().data()) {
        assert_relative_eq!(*x, *y, epsilon = 1e-12);
    }
}

#[test]
fn test_size_gate_keeps_small_products_on_cpu() {
    let backend = SimulatedBackend::new();
    let gpu = provider(&backend, 1_000_000);

    // 99 * 100 * 101 < 1_000_000
    let a: Matrix<f64> = DenseMatrix::from_fn(99, 100, |i, j| ((i + j) % 3) as f64).into();
    let b: Matrix<f64> = DenseMatrix::from_fn(100, 101, |i, j| ((i * j) % 5) as f64).into();
    gpu.matrix_multiply(&a, &b).unwrap();
    assert_eq!(backend.contexts(), 0);
    assert_eq!(gpu.stats().device_attempts, 0);

    // 100 * 100 * 100 reaches the threshold.
    let a = square(100, 0);
    let b = square(100, 1);
    let product = gpu.matrix_multiply(&a, &b).unwrap();
    assert_eq!(gpu.stats().device_successes, 1);
    assert_eq!(
        product,
        CpuDenseProvider::default().matrix_multiply(&a, &b).unwrap()
    );
}

#[test]
fn test_vector_add_has_no_size_gate() {
    let backend = SimulatedBackend::new();
    let gpu = provider(&backend, usize::MAX);
    let a = Vector::from_vec(vec![1.0]);
    let b = Vector::from_vec(vec![2.0]);
    assert_eq!(gpu.vector_add(&a, &b).unwrap().as_slice(), &[3.0]);
    assert_eq!(gpu.stats().device_successes, 1);
}

#[test]
fn test_dimension_errors_are_not_absorbed() {
    let backend = SimulatedBackend::new();
    let gpu = provider(&backend, 0);
    let err = gpu
        .vector_add(&Vector::from_vec(vec![1.0]), &Vector::from_vec(vec![1.0, 2.0]))
        .unwrap_err();
    assert!(matches!(err, LinalgError::DimensionMismatch(_)));
    let err = gpu
        .matrix_multiply(&square(2, 0), &square(3, 0))
        .unwrap_err();
    assert!(matches!(err, LinalgError::DimensionMismatch(_)));
    assert_eq!(backend.contexts(), 0);
}

#[test]
fn test_non_real_field_never_reaches_device() {
    type F7 = ModP<7>;
    let backend = SimulatedBackend::new();
    let gpu: GpuProvider<F7, SimulatedBackend> =
        GpuProvider::new(backend.clone(), &config_with_threshold(0));
    assert!(!gpu.is_available());

    let a = Vector::from_vec(vec![F7::new(3), F7::new(6)]);
    let b = Vector::from_vec(vec![F7::new(5), F7::new(1)]);
    assert_eq!(
        gpu.vector_add(&a, &b).unwrap().as_slice(),
        &[F7::new(1), F7::new(0)]
    );
    let m = Matrix::dense(&[vec![F7::new(2), F7::new(0)], vec![F7::new(1), F7::new(4)]]).unwrap();
    gpu.matrix_multiply(&m, &m).unwrap();
    assert_eq!(backend.contexts(), 0);
    assert_eq!(gpu.stats().device_attempts, 0);
}

#[test]
fn test_missing_runtime_is_unselectable() {
    let backend = SimulatedBackend::unavailable();
    let gpu = provider(&backend, 0);
    assert!(!gpu.is_available());
    assert_eq!(gpu.priority(), PRIORITY_UNAVAILABLE);
    let (a, b) = vectors();
    assert!(gpu.vector_add(&a, &b).is_ok());
    assert_eq!(backend.contexts(), 0);
}

#[test]
fn test_disabled_in_config_skips_probe() {
    let backend = SimulatedBackend::new();
    let config = EngineConfig::default().with_gpu(GpuConfig::with_params(false, 0, 1e-4));
    let gpu: GpuProvider<f64, SimulatedBackend> = GpuProvider::new(backend.clone(), &config);
    assert!(!gpu.is_available());
    assert!(!gpu.warm_up());
    assert_eq!(backend.contexts(), 0);
}

#[test]
fn test_zero_copy_and_linearized_uploads() {
    let backend = SimulatedBackend::new();
    let gpu = provider(&backend, 0);
    let (a, b) = vectors();
    gpu.vector_add(&a, &b).unwrap();
    let stats = gpu.stats();
    assert_eq!(stats.zero_copy_uploads, 2);
    assert_eq!(stats.linearized_uploads, 0);

    let gpu32: GpuProvider<f32, SimulatedBackend> =
        GpuProvider::new(backend.clone(), &config_with_threshold(0));
    let a = Vector::from_vec(vec![0.25f32, 1.5]);
    let b = Vector::from_vec(vec![0.5f32, -1.0]);
    let sum = gpu32.vector_add(&a, &b).unwrap();
    assert_relative_eq!(sum.as_slice()[0], 0.75f32);
    assert_relative_eq!(sum.as_slice()[1], 0.5f32);
    let stats = gpu32.stats();
    assert_eq!(stats.linearized_uploads, 2);
    assert_eq!(stats.zero_copy_uploads, 0);
}

#[test]
fn test_concurrent_first_use_compiles_once() {
    init_logging();
    let backend = SimulatedBackend::new();
    backend.set_compile_delay(Duration::from_millis(50));
    let gpu = Arc::new(provider(&backend, 0));
    let (a, b) = vectors();
    let expected = CpuDenseProvider::default().vector_add(&a, &b).unwrap();

    std::thread::scope(|scope| {
        for _ in 0..8 {
            let gpu = Arc::clone(&gpu);
            let (a, b, expected) = (&a, &b, &expected);
            scope.spawn(move || {
                assert_eq!(&gpu.vector_add(a, b).unwrap(), expected);
            });
        }
    });

    assert_eq!(backend.contexts(), 1);
    assert_eq!(backend.compilations(), 1);
    let stats = gpu.stats();
    assert_eq!(stats.compilations, 1);
    assert_eq!(stats.self_test_runs, 1);
    assert_eq!(stats.device_successes, 8);
    assert_eq!(backend.live_buffers(), 0);
}

#[test]
fn test_other_operations_delegate_to_cpu() {
    let backend = SimulatedBackend::new();
    let gpu = provider(&backend, 0);
    let a = Matrix::dense(&[vec![1.0, 2.0], vec![2.0, 4.0]]).unwrap();
    assert_eq!(gpu.determinant(&a).unwrap(), 0.0);
    assert_eq!(gpu.inverse(&a), Err(LinalgError::SingularMatrix));
    let (x, y) = vectors();
    assert_eq!(gpu.dot(&x, &y).unwrap(), 0.5 - 4.0 + 30.0 + 1.0);
    assert_eq!(backend.contexts(), 0);
}
