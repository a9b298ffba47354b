use linalg_providers::{
    default_providers, dispatch, rank, EngineConfig, Matrix, MatrixLike, SparseMatrix, Triplet,
    Vector,
};
use std::time::Instant;

/// Creates a pentadiagonal sparse matrix A of size n x n.
/// Diagonals:
/// - Main: 4.0
/// - Adjacent (+1, -1): -1.0
/// - Outer (+2, -2): -0.5
fn create_pentadiagonal_matrix(n: usize) -> SparseMatrix<f64> {
    let mut triplets = Vec::new();
    for i in 0..n {
        if i >= 2 {
            triplets.push(Triplet::new(i, i - 2, -0.5));
        }
        if i >= 1 {
            triplets.push(Triplet::new(i, i - 1, -1.0));
        }
        triplets.push(Triplet::new(i, i, 4.0));
        if i + 1 < n {
            triplets.push(Triplet::new(i, i + 1, -1.0));
        }
        if i + 2 < n {
            triplets.push(Triplet::new(i, i + 2, -0.5));
        }
    }
    SparseMatrix::from_triplets(n, n, triplets).expect("Failed to create sparse matrix from COO")
}

/// Creates a vector b of size n with b[i] = sin(i / n).
fn create_sin_vector(n: usize) -> Vector<f64> {
    (0..n).map(|i| (i as f64 / n as f64).sin()).collect()
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .filter_module("wgpu", log::LevelFilter::Off)
        .filter_module("naga", log::LevelFilter::Off)
        .init();

    let config = match std::env::var("LINALG_CONFIG") {
        Ok(json) => EngineConfig::from_json(&json).expect("Invalid LINALG_CONFIG"),
        Err(_) => EngineConfig::default(),
    };

    let n = 500;
    log::info!("Setting up {}x{} pentadiagonal matrix A and sin vector b...", n, n);
    let a: Matrix<f64> = create_pentadiagonal_matrix(n).into();
    let b = create_sin_vector(n);

    let providers = default_providers::<f64>(&config);
    for provider in rank(&providers) {
        log::info!("  {} (priority {})", provider.name(), provider.priority());
    }

    let start_time = Instant::now();
    let x = dispatch(&providers, |p| p.solve(&a, &b)).expect("Solve failed");
    log::info!("Solved in {:?}", start_time.elapsed());

    let ax = dispatch(&providers, |p| p.matrix_vector_multiply(&a, &x)).expect("Matvec failed");
    let residual = dispatch(&providers, |p| p.vector_subtract(&ax, &b)).expect("Subtract failed");
    let residual_norm = dispatch(&providers, |p| p.norm(&residual)).expect("Norm failed");
    log::info!("  Residual norm |Ax - b|: {:.6e}", residual_norm);

    let start_time = Instant::now();
    let a_squared = dispatch(&providers, |p| p.matrix_multiply(&a, &a)).expect("Multiply failed");
    log::info!(
        "A^2 is {:?}, {} stored entries, sparse = {}, in {:?}",
        a_squared.dims(),
        a_squared.stored_entries(),
        a_squared.is_sparse(),
        start_time.elapsed()
    );

    #[cfg(feature = "gpu")]
    device_multiply(&config, &a);
}

/// Large enough dense product to clear the device work threshold.
#[cfg(feature = "gpu")]
fn device_multiply(config: &EngineConfig, a: &Matrix<f64>) {
    use linalg_core::WgpuBackend;
    use linalg_providers::{ComputeProvider, GpuProvider};

    let gpu: GpuProvider<f64, WgpuBackend> = GpuProvider::new(WgpuBackend::default(), config);
    if !gpu.warm_up() {
        log::warn!("GPU unavailable: {:?}", gpu.failure());
        return;
    }
    let dense: Matrix<f64> = a.to_dense().into_owned().into();

    let start_time = Instant::now();
    match gpu.matrix_multiply(&dense, &dense) {
        Ok(product) => log::info!("GPU product {:?} in {:?}", product.dims(), start_time.elapsed()),
        Err(e) => log::error!("GPU product failed: {}", e),
    }

    let stats = gpu.stats();
    log::info!("GPU Stats:");
    log::info!("  Device attempts: {}", stats.device_attempts);
    log::info!("  Device successes: {}", stats.device_successes);
    log::info!("  Fallbacks: {}", stats.fallbacks);
    log::info!("  Zero-copy uploads: {}", stats.zero_copy_uploads);
    if let Some(context) = gpu.device_context() {
        let (bytes_to_gpu, bytes_from_gpu) = context.transfer_stats();
        log::info!("  Bytes CPU -> GPU: {}", bytes_to_gpu);
        log::info!("  Bytes GPU -> CPU: {}", bytes_from_gpu);
    }
}
