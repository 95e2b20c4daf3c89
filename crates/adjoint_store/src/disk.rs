//! File-backed storage with one band per worker.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use adjoint_core::{Checkpoint, Primal, RunPlan};
use rayon::prelude::*;
use tracing::debug;

use crate::scan::{self, ReverseScanner};
use crate::{CheckpointStore, StoreError, TurnError, Turnstile};

struct DiskState {
    /// Band start iterations whose files are still unread, ascending.
    pending: Vec<u64>,
    scanner: Option<ReverseScanner>,
}

/// Writes every window boundary to disk during recording.
///
/// `record_loader` partitions the run into one contiguous band per worker
/// and records the bands in parallel, each into its own file; a band whose
/// start is not iteration 0 first fast-forwards to the preceding window
/// boundary, so its file also carries the window that straddles the band
/// edge. Retrieval walks the files from the highest band downwards,
/// scanning each backwards from EOF, and deletes nothing; the descending
/// pass consumes every record exactly once.
pub struct DiskStore<'p, P> {
    primal: &'p P,
    plan: RunPlan,
    bands: usize,
    dir: PathBuf,
    prefix: String,
    state: Turnstile<DiskState>,
}

impl<'p, P: Primal> DiskStore<'p, P> {
    /// Creates a store that will record `workers` bands under `data_dir`.
    pub fn new(primal: &'p P, plan: RunPlan, workers: usize, data_dir: &Path) -> Self {
        Self {
            primal,
            plan,
            bands: workers.max(1),
            dir: data_dir.to_path_buf(),
            prefix: crate::next_run_id(),
            state: Turnstile::new(
                0,
                DiskState {
                    pending: Vec::new(),
                    scanner: None,
                },
            ),
        }
    }

    fn band_path(&self, from: u64) -> PathBuf {
        self.dir.join(format!("run{}-band{}.ck", self.prefix, from))
    }

    /// Records the windows of `[band_from, bound]` into the band's file,
    /// returning the record count.
    fn record_band(&self, input: &[f64], band_from: u64, bound: u64) -> Result<u64, StoreError> {
        let mut pre = Checkpoint::new(input.to_vec(), 0);
        if band_from != 0 {
            pre.set_to(band_from);
            let mut last = None;
            self.primal.sweep(&pre, &mut |c| last = Some(c));
            if let Some(c) = last {
                pre = c;
            }
        }
        pre.set_to(bound);

        let mut writer = BufWriter::new(File::create(self.band_path(band_from))?);
        let mut count = 0u64;
        let mut failed = None;
        self.primal.sweep(&pre, &mut |c| {
            if c.to() <= bound {
                if let Err(e) = write!(writer, "{c}") {
                    failed.get_or_insert(e);
                }
                count += 1;
            }
        });
        if let Some(e) = failed {
            return Err(e.into());
        }
        writer.flush()?;
        debug!(band = band_from, records = count, "band recorded");
        Ok(count)
    }
}

impl<P: Primal> CheckpointStore for DiskStore<'_, P> {
    fn record_loader(&mut self, input: &[f64]) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let set = (self.plan.steps() / self.bands as u64).max(1);
        let last = self.bands - 1;
        let counts = (0..self.bands)
            .into_par_iter()
            .map(|band| {
                let from = band as u64 * set;
                let bound = if band == last {
                    self.plan.steps()
                } else {
                    (band as u64 + 1) * set - 1
                };
                self.record_band(input, from, bound)
            })
            .collect::<Result<Vec<u64>, StoreError>>()?;

        let total: u64 = counts.iter().sum();
        debug_assert_eq!(total, self.plan.chunks());
        let st = self.state.get_mut();
        st.pending = (0..self.bands as u64).map(|band| band * set).collect();
        st.scanner = None;
        self.state.set_turn(total);
        Ok(())
    }

    fn get_checkpoint(&self, chunk: u64) -> Result<Checkpoint, StoreError> {
        let served = self.state.try_enter(chunk, |st| {
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
