use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing what the GPU provider actually did.
#[derive(Debug, Default)]
pub struct GpuStats {
    device_attempts: AtomicU64,
    device_successes: AtomicU64,
    fallbacks: AtomicU64,
    self_test_runs: AtomicU64,
    compilations: AtomicU64,
    zero_copy_uploads: AtomicU64,
    linearized_uploads: AtomicU64,
}

/// Point-in-time copy of [`GpuStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GpuStatsSnapshot {
    /// Operations that entered the device path.
    pub device_attempts: u64,
    pub device_successes: u64,
    /// Device attempts that failed and were re-run on the CPU.
    pub fallbacks: u64,
    pub self_test_runs: u64,
    pub compilations: u64,
    pub zero_copy_uploads: u64,
    pub linearized_uploads: u64,
}

impl GpuStats {
    pub(crate) fn record_attempt(&self) {
        self.device_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self) {
        self.device_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_self_test(&self) {
        self.self_test_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_compilation(&self) {
        self.compilations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_upload(&self, zero_copy: bool) {
        let counter = if zero_copy {
            &self.zero_copy_uploads
        } else {
            &self.linearized_uploads
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> GpuStatsSnapshot {
        GpuStatsSnapshot {
            device_attempts: self.device_attempts.load(Ordering::Relaxed),
            device_successes: self.device_successes.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            self_test_runs: self.self_test_runs.load(Ordering::Relaxed),
            compilations: self.compilations.load(Ordering::Relaxed),
            zero_copy_uploads: self.zero_copy_uploads.load(Ordering::Relaxed),
            linearized_uploads: self.linearized_uploads.load(Ordering::Relaxed),
        }
    }
}
