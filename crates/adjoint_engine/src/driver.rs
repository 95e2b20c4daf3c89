//! Concurrent checkpointed reversal sweep.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use adjoint_core::{Primal, Tape};
use adjoint_store::{CheckpointStore, Store, StoreError, Turnstile};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ReversalConfig;

/// Reversal failure. The run aborts with no partial result.
#[derive(Debug, Error)]
pub enum ReversalError {
    /// Checkpoint storage failed while recording or serving.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The worker pool could not be built.
    #[error("failed to build the reversal worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Result of a completed reversal.
#[derive(Clone, Debug)]
pub struct ReversalOutcome {
    /// Input adjoints, trimmed to the seed length.
    pub adjoints: Vec<f64>,
    /// Wall-clock time of the whole run, recording included.
    pub elapsed: Duration,
}

/// Result of a completed multi-seed reversal.
#[derive(Clone, Debug)]
pub struct MultiReversalOutcome {
    /// One adjoint vector per seed, each trimmed to its seed's length.
    pub adjoints: Vec<Vec<f64>>,
    /// Wall-clock time of the whole run, recording included.
    pub elapsed: Duration,
}

/// Reverses `primal` over the configured run, propagating `seed` back to
/// the inputs.
///
/// Phase 1 records the run's checkpoints into the configured store. Phase 2
/// sweeps the chunks in descending order with a fixed worker pool: each
/// worker claims a chunk, fetches its checkpoint (ordered), re-records the
/// chunk on a fresh tape (overlapping freely with other workers), then
/// interprets the tape into the shared accumulator (ordered again). The
/// accumulator starts as `seed` and is widened to the tape's slot
/// requirement at the top chunk; on return it is trimmed back to the seed
/// length, so `adjoints[i]` is the adjoint of input slot `i`.
///
/// # Errors
///
/// Any storage failure poisons both ordered stages, unblocks every worker
/// and aborts the run with the first non-secondary error.
pub fn reverse<P: Primal>(
    primal: &P,
    config: &ReversalConfig,
    input: &[f64],
    seed: &[f64],
) -> Result<ReversalOutcome, ReversalError> {
    let started = Instant::now();
    let store = record(primal, config, input)?;

    let accumulator = Turnstile::new(config.chunks(), seed.to_vec());
    let mut adjoints = sweep(primal, config, &store, accumulator, |tape, adjoints| {
        if adjoints.len() < tape.ram() {
            adjoints.resize(tape.ram(), 0.0);
        }
        tape.interpret(adjoints);
    })?;
    adjoints.truncate(seed.len());

    let elapsed = started.elapsed();
    info!(?elapsed, "reversal finished");
    Ok(ReversalOutcome { adjoints, elapsed })
}

/// Like [`reverse`], but propagates every seed vector through the run in
/// one sweep.
///
/// Each chunk is recorded once and interpreted into all accumulators in
/// parallel, so the per-chunk recording cost is shared across the seeds.
///
/// # Errors
///
/// See [`reverse`].
pub fn reverse_multi<P: Primal>(
    primal: &P,
    config: &ReversalConfig,
    input: &[f64],
    seeds: &[Vec<f64>],
) -> Result<MultiReversalOutcome, ReversalError> {
    let started = Instant::now();
    let store = record(primal, config, input)?;

    let accumulator = Turnstile::new(config.chunks(), seeds.to_vec());
    let mut adjoints = sweep(primal, config, &store, accumulator, |tape, accs| {
        for adjoints in accs.iter_mut() {
            if adjoints.len() < tape.ram() {
                adjoints.resize(tape.ram(), 0.0);
            }
        }
        tape.interpret_multi(accs);
    })?;
    for (adjoints, seed) in adjoints.iter_mut().zip(seeds) {
        adjoints.truncate(seed.len());
    }

    let elapsed = started.elapsed();
    info!(?elapsed, seeds = seeds.len(), "multi-seed reversal finished");
    Ok(MultiReversalOutcome { adjoints, elapsed })
}

/// Phase 1: builds the configured store and records the run into it.
fn record<'p, P: Primal>(
    primal: &'p P,
    config: &ReversalConfig,
    input: &[f64],
) -> Result<Store<'p, P>, ReversalError> {
    let recording = Instant::now();
    let mut store = Store::build(
        config.store(),
        primal,
        config.plan(),
        config.workers(),
        config.data_dir(),
    );
    store.record_loader(input)?;
    info!(
        chunks = config.chunks(),
        workers = config.workers(),
        elapsed = ?recording.elapsed(),
        "checkpoints recorded"
    );
    Ok(store)
}

/// Phase 2: drains the store chunk by chunk, applying each recorded tape
/// to the shared accumulator in descending chunk order.
fn sweep<P, A, F>(
    primal: &P,
    config: &ReversalConfig,
    store: &Store<'_, P>,
    accumulator: Turnstile<A>,
    apply: F,
) -> Result<A, ReversalError>
where
    P: Primal,
    A: Send,
    F: Fn(&Tape, &mut A) + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers())
        .build()?;
    let next = AtomicI64::new(config.chunks() as i64);
    let failure: Mutex<Option<ReversalError>> = Mutex::new(None);

    pool.scope(|scope| {
        for _ in 0..config.workers() {
            scope.spawn(|_| loop {
                let claimed = next.fetch_sub(1, Ordering::SeqCst);
                if claimed <= 0 {
                    break;
                }
                let chunk = claimed as u64;
                let checkpoint = match store.get_checkpoint(chunk) {
                    Ok(c) => c,
                    Err(e) => {
                        report(&failure, e.into());
                        accumulator.poison();
                        next.store(0, Ordering::SeqCst);
                        break;
                    }
                };
                let tape = Tape::new();
                primal.record(&checkpoint, &tape);
                debug!(chunk, bytes = tape.memory_bytes(), "chunk recorded");
                if accumulator
                    .enter(chunk, |acc| apply(&tape, acc))
                    .is_err()
                {
                    // Another worker failed and poisoned the stage.
                    break;
                }
            });
        }
    });

    let held = failure.into_inner().unwrap_or_else(PoisonError::into_inner);
    match held {
        Some(e) => Err(e),
        None => Ok(accumulator.into_inner()),
    }
}

/// Records a failure, keeping the first primary error: a secondary
/// `Aborted` never displaces the failure that caused the abort.
fn report(failure: &Mutex<Option<ReversalError>>, e: ReversalError) {
    let mut slot = failure.lock().unwrap_or_else(PoisonError::into_inner);
    let primary_held = matches!(
        slot.as_ref(),
        Some(held) if !matches!(held, ReversalError::Store(StoreError::Aborted))
    );
    if !primary_held {
        *slot = Some(e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adjoint_core::Checkpoint;
    use adjoint_store::StoreKind;

    struct FailingPrimal;

    impl Primal for FailingPrimal {
        fn run(&self, _state: &mut [f64]) {}

        fn record(&self, _checkpoint: &Checkpoint, _tape: &Tape) {}

        fn sweep(&self, _checkpoint: &Checkpoint, _emit: &mut dyn FnMut(Checkpoint)) {
            // Emits nothing, so every store comes up empty.
        }
    }

    #[test]
    fn test_empty_store_aborts_without_partial_result() {
        let config = ReversalConfig::builder()
            .steps(8)
            .window(4)
            .workers(2)
            .store(StoreKind::Naive)
            .build()
            .unwrap();
        let outcome = reverse(&FailingPrimal, &config, &[1.0, 0.0], &[0.0, 1.0]);
        assert!(matches!(
            outcome,
            Err(ReversalError::Store(StoreError::Exhausted { .. }))
        ));
    }

    #[test]
    fn test_report_keeps_the_primary_failure() {
        let failure = Mutex::new(None);
        report(&failure, ReversalError::Store(StoreError::Aborted));
        report(
            &failure,
            ReversalError::Store(StoreError::Exhausted { chunk: 3 }),
        );
        report(&failure, ReversalError::Store(StoreError::Aborted));
        assert!(matches!(
            failure.into_inner().unwrap(),
            Some(ReversalError::Store(StoreError::Exhausted { chunk: 3 }))
        ));
    }
}
