//! Example primals for the checkpointed reversal engine.
//!
//! Each simulation implements [`adjoint_core::Primal`] with a single step
//! function generic over [`adjoint_core::AdScalar`], so the plain run, the
//! recording replay and the checkpoint sweep all share one definition of
//! the iteration logic.

pub mod nested;
pub mod recurrence;

pub use nested::NestedSine;
pub use recurrence::SineRecurrence;
