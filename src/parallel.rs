//! Parallel processing configuration
//!
//! Filegroups share no mutable state, a [`crate::session::Session`] scans
//! them on a Rayon thread pool configured here.

use crate::errors::{FilecubeError, Result};
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Configuration for parallel processing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParallelConfig {
    pub num_threads: Option<usize>,
}

impl ParallelConfig {
    /// Create a new parallel configuration
    pub fn new(num_threads: Option<usize>) -> Self {
        Self { num_threads }
    }

    /// Create a configuration that uses all available CPU cores
    pub fn all_cores() -> Self {
        Self {
            num_threads: Some(num_cpus::get()),
        }
    }

    /// Create a configuration that uses a specific number of threads
    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads: Some(num_threads),
        }
    }

    /// Run sequentially
    pub fn sequential() -> Self {
        Self::with_threads(1)
    }

    /// Whether work should be spread over several threads
    pub fn is_parallel(&self) -> bool {
        self.num_threads != Some(1)
    }

    /// Build a thread pool local to this configuration
    pub fn build_pool(&self) -> Result<ThreadPool> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("filecube-scan-{i}"));
        if let Some(num_threads) = self.num_threads {
            if num_threads == 0 {
                return Err(FilecubeError::ThreadPoolError(
                    "number of threads must be at least 1".to_string(),
                ));
            }
            builder = builder.num_threads(num_threads);
        }
        let pool = builder.build().map_err(|e| {
            FilecubeError::ThreadPoolError(format!(
                "Failed to initialize thread pool with {:?} threads: {}",
                self.num_threads, e
            ))
        })?;
        tracing::debug!(threads = pool.current_num_threads(), "Thread pool ready");
        Ok(pool)
    }

    /// Get the number of threads the pool would use
    pub fn current_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(rayon::current_num_threads)
    }
}

/// Information about the parallel processing environment
#[derive(Debug, Clone)]
pub struct ParallelInfo {
    pub current_threads: usize,
    pub available_cores: usize,
    pub available_parallelism: usize,
}

/// Get information about the current parallel configuration
pub fn get_parallel_info() -> ParallelInfo {
    ParallelInfo {
        current_threads: rayon::current_num_threads(),
        available_cores: num_cpus::get(),
        available_parallelism: std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(1),
    }
}

impl ParallelInfo {
    /// Log parallel processing information
    pub fn log(&self) {
        tracing::info!(
            current_threads = self.current_threads,
            available_cores = self.available_cores,
            available_parallelism = self.available_parallelism,
            "Parallel processing information"
        );
    }
}
