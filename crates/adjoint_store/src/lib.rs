//! # Adjoint Store
//!
//! Checkpoint storage strategies for the checkpointed reversal engine.
//! A store is filled once per run by [`CheckpointStore::record_loader`]
//! and then drained by descending chunk number through
//! [`CheckpointStore::get_checkpoint`]; all four strategies serve the same
//! window tiling and differ only in where recomputation work and bytes
//! live:
//!
//! - [`NaiveStore`]: nothing but the input; every retrieval replays from
//!   iteration 0.
//! - [`MemoryStore`]: a bounded set of in-memory anchors placed by greedy
//!   bisection during each recompute.
//! - [`DiskStore`]: every window boundary written to per-band files during
//!   recording, read backwards at retrieval.
//! - [`HybridStore`]: a small bisection anchor set, flushed band-by-band
//!   to files while recording; the top chunk is served from memory.
//!
//! Stateful stores order concurrent retrievals internally with a
//! [`Turnstile`], so workers may request their chunks as soon as they
//! claim them.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use adjoint_core::{Checkpoint, ParseCheckpointError, Primal, RunPlan};
use thiserror::Error;

pub mod disk;
pub mod hybrid;
pub mod memory;
pub mod naive;
mod scan;
pub mod turn;

pub use disk::DiskStore;
pub use hybrid::HybridStore;
pub use memory::MemoryStore;
pub use naive::NaiveStore;
pub use turn::{Poisoned, TurnError, Turnstile};

/// Default anchor budget of the in-memory store.
pub const DEFAULT_MEMORY_BUDGET: usize = 999;

/// Default anchor budget of the hybrid store.
pub const DEFAULT_HYBRID_BUDGET: usize = 9;

/// Checkpoint storage failure. Fatal for the requesting retrieval; a
/// failed turn poisons the store's ordered stage.
#[derive(Debug, Error)]
pub enum StoreError {
    /// More chunks were requested than the store recorded.
    #[error("no checkpoint recorded for chunk {chunk}")]
    Exhausted {
        /// The chunk that could not be served.
        chunk: u64,
    },
    /// A stored record failed to decode.
    #[error("corrupt checkpoint record: {0}")]
    Parse(#[from] ParseCheckpointError),
    /// Reading or writing a band file failed.
    #[error("checkpoint storage i/o failed: {0}")]
    Io(#[from] std::io::Error),
    /// An earlier retrieval failed and poisoned the store.
    #[error("checkpoint retrieval aborted by an earlier failure")]
    Aborted,
}

/// Storage strategy selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKind {
    /// Recompute every chunk from iteration 0.
    Naive,
    /// In-memory bisection anchors with the given slot budget.
    Memory {
        /// Maximum number of anchors held at once.
        budget: usize,
    },
    /// Per-band files holding every window boundary.
    Disk,
    /// Bisection anchors plus per-band files, with the given anchor
    /// budget.
    Hybrid {
        /// Maximum number of anchors held at once.
        budget: usize,
    },
}

impl StoreKind {
    /// In-memory store with the default anchor budget.
    pub fn memory() -> Self {
        Self::Memory {
            budget: DEFAULT_MEMORY_BUDGET,
        }
    }

    /// Hybrid store with the default anchor budget.
    pub fn hybrid() -> Self {
        Self::Hybrid {
            budget: DEFAULT_HYBRID_BUDGET,
        }
    }
}

impl Default for StoreKind {
    fn default() -> Self {
        Self::memory()
    }
}

/// The two-phase contract every storage strategy implements.
pub trait CheckpointStore {
    /// Records the run's checkpoints from the initial state. Sequential;
    /// runs before any retrieval.
    fn record_loader(&mut self, input: &[f64]) -> Result<(), StoreError>;

    /// Serves the checkpoint covering chunk `chunk` (1-based). Retrievals
    /// must arrive in descending chunk order across all callers; each
    /// checkpoint is served exactly once.
    fn get_checkpoint(&self, chunk: u64) -> Result<Checkpoint, StoreError>;
}

/// A storage strategy chosen at configuration time.
pub enum Store<'p, P: Primal> {
    /// See [`NaiveStore`].
    Naive(NaiveStore<'p, P>),
    /// See [`MemoryStore`].
    Memory(MemoryStore<'p, P>),
    /// See [`DiskStore`].
    Disk(DiskStore<'p, P>),
    /// See [`HybridStore`].
    Hybrid(HybridStore<'p, P>),
}

impl<'p, P: Primal> Store<'p, P> {
    /// Builds the selected store, sized to `workers` where the strategy
    /// partitions work into bands. `data_dir` is only touched by the
    /// file-backed strategies.
    pub fn build(
        kind: StoreKind,
        primal: &'p P,
        plan: RunPlan,
        workers: usize,
        data_dir: &Path,
    ) -> Self {
        match kind {
            StoreKind::Naive => Self::Naive(NaiveStore::new(primal, plan)),
            StoreKind::Memory { budget } => Self::Memory(MemoryStore::new(primal, plan, budget)),
            StoreKind::Disk => Self::Disk(DiskStore::new(primal, plan, workers, data_dir)),
            StoreKind::Hybrid { budget } => {
                Self::Hybrid(HybridStore::new(primal, plan, budget, data_dir))
            }
        }
    }
}

impl<P: Primal> CheckpointStore for Store<'_, P> {
    fn record_loader(&mut self, input: &[f64]) -> Result<(), StoreError> {
        match self {
            Self::Naive(s) => s.record_loader(input),
            Self::Memory(s) => s.record_loader(input),
            Self::Disk(s) => s.record_loader(input),
            Self::Hybrid(s) => s.record_loader(input),
        }
    }

    fn get_checkpoint(&self, chunk: u64) -> Result<Checkpoint, StoreError> {
        match self {
            Self::Naive(s) => s.get_checkpoint(chunk),
            Self::Memory(s) => s.get_checkpoint(chunk),
            Self::Disk(s) => s.get_checkpoint(chunk),
            Self::Hybrid(s) => s.get_checkpoint(chunk),
        }
    }
}

/// Unique-enough file prefix for one store instance, so concurrent runs
/// sharing a data directory do not clobber each other's bands.
pub(crate) fn next_run_id() -> String {
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{millis}-{seq}")
}
