//! Contract between a differentiable simulation and the reversal engine.

use crate::checkpoint::Checkpoint;
use crate::tape::Tape;

/// A simulation the engine can replay, record and checkpoint.
///
/// The three operations replay the same iteration logic over different
/// scalar types; implementations typically write one step function generic
/// over [`AdScalar`](crate::AdScalar) and call it from all three. Control
/// flow must not depend on values that differ between replays of the same
/// window.
pub trait Primal: Sync {
    /// Runs the simulation to completion on plain values, in place.
    fn run(&self, state: &mut [f64]);

    /// Replays the checkpoint's window, recording every operation on
    /// `tape`. The checkpoint's state slots become the tape's persistent
    /// inputs, in slot order.
    fn record(&self, checkpoint: &Checkpoint, tape: &Tape);

    /// Replays from the checkpoint on plain values, emitting a bounded
    /// checkpoint at every window boundary crossed.
    fn sweep(&self, checkpoint: &Checkpoint, emit: &mut dyn FnMut(Checkpoint));
}
