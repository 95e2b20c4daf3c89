//! In-memory bisection-anchor storage.

use adjoint_core::{Checkpoint, Primal, RunPlan};
use tracing::debug;

use crate::{CheckpointStore, StoreError, Turnstile};

/// Holds a bounded set of checkpoint anchors in memory.
///
/// Each retrieval restarts from the nearest stored anchor (or the initial
/// state), replays forward to the requested window and greedily stores new
/// anchors at the midpoint of the remaining interval while doing so, up to
/// the slot budget. An anchor that exactly covers the requested window is
/// popped and served directly; anchors are single use.
///
/// Retrievals are ordered by an internal [`Turnstile`], so the descending
/// chunk pass recomputes each segment exactly once.
pub struct MemoryStore<'p, P> {
    primal: &'p P,
    plan: RunPlan,
    budget: usize,
    input: Vec<f64>,
    anchors: Turnstile<Vec<Checkpoint>>,
}

impl<'p, P: Primal> MemoryStore<'p, P> {
    /// Creates an empty store with room for `budget` anchors.
    pub fn new(primal: &'p P, plan: RunPlan, budget: usize) -> Self {
        Self {
            primal,
            plan,
            budget,
            input: Vec::new(),
            anchors: Turnstile::new(0, Vec::new()),
        }
    }

    fn recompute(&self, anchors: &mut Vec<Checkpoint>, to: u64) -> Checkpoint {
        match anchors.pop() {
            Some(anchor) if anchor.to() >= to => return anchor,
            Some(anchor) => anchors.push(anchor),
            None => {}
        }

        let mut start = anchors
            .last()
            .cloned()
            .unwrap_or_else(|| Checkpoint::new(self.input.clone(), 0));
        start.set_to(to);

        let mut half = (start.from() + to) / 2;
        let mut served = None;
        let budget = self.budget;
        self.primal.sweep(&start, &mut |c| {
            if c.to() >= to {
                served = Some(c);
            } else if c.from() >= half && anchors.len() < budget {
                half = (c.from() + to) / 2;
                anchors.push(c);
            }
        });
        debug!(to, anchors = anchors.len(), "window recomputed");
        served.unwrap_or(start)
    }
}

impl<P: Primal> CheckpointStore for MemoryStore<'_, P> {
    fn record_loader(&mut self, input: &[f64]) -> Result<(), StoreError> {
        self.input = input.to_vec();
        self.anchors.get_mut().clear();
        self.anchors.set_turn(self.plan.chunks());
        Ok(())
    }

    fn get_checkpoint(&self, chunk: u64) -> Result<Checkpoint, StoreError> {
        let to = self.plan.window_end(chunk);
        self.anchors
            .enter(chunk, |anchors| self.recompute(anchors, to))
            .map_err(|_| StoreError::Aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adjoint_primals::SineRecurrence;

    fn drain(budget: usize) -> Vec<(u64, u64)> {
        let plan = RunPlan::new(22, 4);
        let primal = SineRecurrence::new(plan);
        let mut store = MemoryStore::new(&primal, plan, budget);
        store.record_loader(&[1.0, 0.0]).unwrap();
        (1..=plan.chunks())
            .rev()
            .map(|i| {
                let c = store.get_checkpoint(i).unwrap();
                (c.from(), c.to())
            })
            .collect()
    }

    #[test]
    fn test_descending_pass_tiles_the_run() {
        let windows = drain(crate::DEFAULT_MEMORY_BUDGET);
        assert_eq!(
            windows,
            vec![(20, 22), (16, 20), (12, 16), (8, 12), (4, 8), (0, 4)]
        );
    }

    #[test]
    fn test_tiny_budget_still_serves_every_window() {
        assert_eq!(drain(1), drain(crate::DEFAULT_MEMORY_BUDGET));
        assert_eq!(drain(0), drain(crate::DEFAULT_MEMORY_BUDGET));
    }

    #[test]
    fn test_anchor_is_popped_when_it_covers_the_window() {
        let plan = RunPlan::new(24, 4);
        let primal = SineRecurrence::new(plan);
        let mut store = MemoryStore::new(&primal, plan, 8);
        store.record_loader(&[1.0, 0.0]).unwrap();

        // The first retrieval plants an anchor at the midpoint; by the
        // time the pass reaches it, the anchor is served without replay.
        for i in (1..=plan.chunks()).rev() {
            let c = store.get_checkpoint(i).unwrap();
            assert_eq!(c.from(), (i - 1) * 4);
        }
    }

    #[test]
    fn test_record_loader_resets_previous_state() {
        let plan = RunPlan::new(8, 4);
        let primal = SineRecurrence::new(plan);
        let mut store = MemoryStore::new(&primal, plan, 4);
        store.record_loader(&[1.0, 0.0]).unwrap();
        let first: Vec<_> = (1..=2).rev().map(|i| store.get_checkpoint(i)).collect();
        assert!(first.iter().all(Result::is_ok));

        store.record_loader(&[0.5, 0.0]).unwrap();
        let again = store.get_checkpoint(2).unwrap();
        assert_eq!(again.state()[0], 0.5);
    }
}
