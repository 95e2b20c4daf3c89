//! Recompute-from-scratch storage.

use adjoint_core::{Checkpoint, Primal, RunPlan};

use crate::{CheckpointStore, StoreError};

/// Stores nothing but the initial state; every retrieval replays the
/// primal from iteration 0 up to the requested window.
///
/// Retrievals share no mutable state, so this store needs no internal
/// ordering; concurrent requests simply burn quadratic recompute time.
pub struct NaiveStore<'p, P> {
    primal: &'p P,
    plan: RunPlan,
    input: Vec<f64>,
}

impl<'p, P: Primal> NaiveStore<'p, P> {
    /// Creates an empty store over the primal's iteration layout.
    pub fn new(primal: &'p P, plan: RunPlan) -> Self {
        Self {
            primal,
            plan,
            input: Vec::new(),
        }
    }
}

impl<P: Primal> CheckpointStore for NaiveStore<'_, P> {
    fn record_loader(&mut self, input: &[f64]) -> Result<(), StoreError> {
        self.input = input.to_vec();
        Ok(())
    }

    fn get_checkpoint(&self, chunk: u64) -> Result<Checkpoint, StoreError> {
        let to = self.plan.window_end(chunk);
        let start = Checkpoint::with_range(self.input.clone(), 0, to);
        let mut seen = 0u64;
        let mut found = None;
        self.primal.sweep(&start, &mut |c| {
            seen += 1;
            if seen == chunk {
                found = Some(c);
            }
        });
        found.ok_or(StoreError::Exhausted { chunk })
    }
}
