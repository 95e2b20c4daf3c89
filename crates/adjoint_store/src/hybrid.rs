//! Bisection anchors flushed to per-anchor band files.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use adjoint_core::{Checkpoint, Primal, RunPlan};
use rayon::prelude::*;
use tracing::debug;

use crate::scan::{self, ReverseScanner};
use crate::{CheckpointStore, StoreError, TurnError, Turnstile};

struct HybridState {
    /// The final window's checkpoint, served to the top chunk directly.
    top: Option<Checkpoint>,
    /// Band file start iterations still unread, ascending.
    pending: Vec<u64>,
    scanner: Option<ReverseScanner>,
}

/// Combines a small in-memory anchor set with per-band files.
///
/// `record_loader` makes one bisection pass over the whole run, placing up
/// to `budget` anchors at interval midpoints, then flushes one file per
/// band: the initial state's band runs to the first anchor, each anchor's
/// band to the next anchor, and the last anchor's band to the final
/// window. The final window itself stays in memory and is served to the
/// top chunk without touching a file; every other retrieval reads band
/// files backwards, highest band first.
pub struct HybridStore<'p, P> {
    primal: &'p P,
    plan: RunPlan,
    budget: usize,
    dir: PathBuf,
    prefix: String,
    state: Turnstile<HybridState>,
}

impl<'p, P: Primal> HybridStore<'p, P> {
    /// Creates a store with room for `budget` anchors under `data_dir`.
    pub fn new(primal: &'p P, plan: RunPlan, budget: usize, data_dir: &Path) -> Self {
        Self {
            primal,
            plan,
            budget,
            dir: data_dir.to_path_buf(),
            prefix: crate::next_run_id(),
            state: Turnstile::new(
                0,
                HybridState {
                    top: None,
                    pending: Vec::new(),
                    scanner: None,
                },
            ),
        }
    }

    fn band_path(&self, from: u64) -> PathBuf {
        self.dir.join(format!("run{}-band{}.ck", self.prefix, from))
    }

    /// Writes every window emitted by replaying `seed` into its band file.
    fn flush_band(&self, seed: &Checkpoint) -> Result<(), StoreError> {
        let mut writer = BufWriter::new(File::create(self.band_path(seed.from()))?);
        let mut failed = None;
        self.primal.sweep(seed, &mut |c| {
            if let Err(e) = write!(writer, "{c}") {
                failed.get_or_insert(e);
            }
        });
        if let Some(e) = failed {
            return Err(e.into());
        }
        writer.flush()?;
        Ok(())
    }
}

impl<P: Primal> CheckpointStore for HybridStore<'_, P> {
    fn record_loader(&mut self, input: &[f64]) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let steps = self.plan.steps();

        // Bisection pass over the whole run.
        let start = Checkpoint::with_range(input.to_vec(), 0, steps);
        let mut anchors: Vec<Checkpoint> = Vec::new();
        let mut half = steps / 2;
        let mut top = None;
        let budget = self.budget;
        self.primal.sweep(&start, &mut |c| {
            if c.to() >= steps {
                top = Some(c);
            } else if c.from() >= half && anchors.len() < budget {
                half = (c.to() + steps) / 2;
                anchors.push(c);
            }
        });
        let top = top.ok_or(StoreError::Exhausted {
            chunk: self.plan.chunks(),
        })?;

        // Each band replays up to the next band's start; the last stops at
        // the final window, which is served from memory.
        let mut seeds = Vec::with_capacity(anchors.len() + 1);
        seeds.push(Checkpoint::new(input.to_vec(), 0));
        seeds.extend(anchors);
        for g in 0..seeds.len() {
            let bound = if g + 1 < seeds.len() {
                seeds[g + 1].from()
            } else {
                top.from()
            };
            seeds[g].set_to(bound);
        }
        seeds.retain(|seed| seed.to() > seed.from());

        seeds
            .par_iter()
            .map(|seed| self.flush_band(seed))
            .collect::<Result<Vec<()>, StoreError>>()?;
        debug!(bands = seeds.len(), "anchor bands flushed");

        let st = self.state.get_mut();
        st.top = Some(top);
        st.pending = seeds.iter().map(|seed| seed.from()).collect();
        st.scanner = None;
        self.state.set_turn(self.plan.chunks());
        Ok(())
    }

    fn get_checkpoint(&self, chunk: u64) -> Result<Checkpoint, StoreError> {
        let chunks = self.plan.chunks();
        let served = self.state.try_enter(chunk, |st| {
            if chunk == chunks {
                return st.top.take().ok_or(StoreError::Exhausted { chunk });
            }
            scan::read_descending(
                &mut st.pending,
                &mut st.scanner,
                |from| self.band_path(from),
                chunk,
            )
        });
        match served {
            Ok(c) => Ok(c),
            Err(TurnError::Poisoned) => Err(StoreError::Aborted),
            Err(TurnError::Failed(e)) => Err(e),
        }
    }
}
