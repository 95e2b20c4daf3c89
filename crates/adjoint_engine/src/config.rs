//! Run configuration.

use std::path::{Path, PathBuf};

use adjoint_core::RunPlan;
use adjoint_store::StoreKind;
use thiserror::Error;

/// Configuration failure, raised before any reversal work starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required parameter was not set.
    #[error("{name} must be specified")]
    Missing {
        /// Parameter name.
        name: &'static str,
    },
    /// The step count is zero.
    #[error("step count must be positive")]
    ZeroSteps,
    /// No workers were requested.
    #[error("at least one worker is required")]
    ZeroWorkers,
    /// The window does not fit inside the run.
    #[error("window of {window} must be smaller than the {steps} total steps")]
    WindowTooLarge {
        /// Requested in-memory window.
        window: u64,
        /// Total step count.
        steps: u64,
    },
    /// The window cannot be split across the workers.
    #[error("window of {window} cannot be split across {workers} workers")]
    WindowTooSmall {
        /// Requested in-memory window.
        window: u64,
        /// Requested worker count.
        workers: usize,
    },
}

/// Immutable reversal configuration.
///
/// `window` bounds the iterations held in memory at once across the whole
/// worker pool; each worker replays `window / workers` iterations per
/// chunk. Built through [`ReversalConfigBuilder`], which validates at
/// build time.
///
/// # Examples
///
/// ```rust
/// use adjoint_engine::ReversalConfig;
/// use adjoint_store::StoreKind;
///
/// let config = ReversalConfig::builder()
///     .steps(10_000)
///     .window(1_000)
///     .workers(4)
///     .store(StoreKind::Disk)
///     .build()
///     .expect("valid configuration");
///
/// assert_eq!(config.worker_window(), 250);
/// assert_eq!(config.chunks(), 40);
/// ```
#[derive(Clone, Debug)]
pub struct ReversalConfig {
    steps: u64,
    window: u64,
    workers: usize,
    store: StoreKind,
    data_dir: PathBuf,
}

impl ReversalConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ReversalConfigBuilder {
        ReversalConfigBuilder::default()
    }

    /// Total iteration count of the primal.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// In-memory iteration window across the whole pool.
    pub fn window(&self) -> u64 {
        self.window
    }

    /// Worker count of the reversal pool.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Selected checkpoint storage strategy.
    pub fn store(&self) -> StoreKind {
        self.store
    }

    /// Directory the file-backed stores write their bands under.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Iterations each worker replays per chunk.
    pub fn worker_window(&self) -> u64 {
        self.window / self.workers as u64
    }

    /// Iteration layout derived from this configuration.
    pub fn plan(&self) -> RunPlan {
        RunPlan::new(self.steps, self.worker_window())
    }

    /// Number of chunks tiling the run.
    pub fn chunks(&self) -> u64 {
        self.plan().chunks()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.steps == 0 {
            return Err(ConfigError::ZeroSteps);
        }
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.window >= self.steps {
            return Err(ConfigError::WindowTooLarge {
                window: self.window,
                steps: self.steps,
            });
        }
        if self.worker_window() == 0 {
            return Err(ConfigError::WindowTooSmall {
                window: self.window,
                workers: self.workers,
            });
        }
        Ok(())
    }
}

/// Builder for [`ReversalConfig`].
#[derive(Clone, Debug, Default)]
pub struct ReversalConfigBuilder {
    steps: Option<u64>,
    window: Option<u64>,
    workers: Option<usize>,
    store: StoreKind,
    data_dir: Option<PathBuf>,
}

impl ReversalConfigBuilder {
    /// Sets the total iteration count.
    pub fn steps(mut self, steps: u64) -> Self {
        self.steps = Some(steps);
        self
    }

    /// Sets the in-memory iteration window.
    pub fn window(mut self, window: u64) -> Self {
        self.window = Some(window);
        self
    }

    /// Sets the worker count. Defaults to the number of logical CPUs.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Sets the checkpoint storage strategy. Defaults to the in-memory
    /// store.
    pub fn store(mut self, store: StoreKind) -> Self {
        self.store = store;
        self
    }

    /// Sets the band-file directory. Defaults to `data`.
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `steps` or `window` is unset, either
    /// is zero, the window does not fit inside the run, or the window
    /// cannot be split across the workers.
    pub fn build(self) -> Result<ReversalConfig, ConfigError> {
        let steps = self.steps.ok_or(ConfigError::Missing { name: "steps" })?;
        let window = self.window.ok_or(ConfigError::Missing { name: "window" })?;
        let config = ReversalConfig {
            steps,
            window,
            workers: self.workers.unwrap_or_else(num_cpus::get),
            store: self.store,
            data_dir: self.data_dir.unwrap_or_else(|| PathBuf::from("data")),
        };
        config.validate()?;
        Ok(config)
    }
}
