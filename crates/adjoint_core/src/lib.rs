//! # Adjoint Core
//!
//! Recording primitives for checkpointed reverse-mode differentiation:
//!
//! - [`Tape`]: an append-only computation graph with a wraparound transient
//!   id arena, so the adjoint workspace of a long chunk stays proportional
//!   to the live range of its intermediates rather than to its length.
//! - [`Active`]: a `Copy` recording scalar bound to a tape, overloading the
//!   arithmetic capability set `{+, -, unary -, *, /, sin, cos, powi,
//!   assignment}`.
//! - [`AdScalar`]: the capability trait implemented by both `Active` and
//!   plain `f64`, so a primal step function is written once and replayed
//!   either recording or value-only.
//! - [`Checkpoint`]: a program-state snapshot with an exact-precision text
//!   codec, the unit every storage strategy records and serves.
//! - [`RunPlan`] and [`Primal`]: the window/chunk arithmetic and the
//!   contract a differentiable simulation implements.
//!
//! # Example
//!
//! ```rust
//! use adjoint_core::{Active, AdScalar, Tape};
//!
//! let tape = Tape::new();
//! let x = Active::input(&tape, 0.5);
//! let mut y = Active::input(&tape, 0.0);
//! y.assign(x.sin() * x);
//!
//! let mut adjoints = vec![0.0; tape.ram()];
//! adjoints[1] = 1.0; // seed dy
//! tape.interpret(&mut adjoints);
//!
//! let expected = 0.5f64.cos() * 0.5 + 0.5f64.sin();
//! assert!((adjoints[0] - expected).abs() < 1e-15);
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod active;
pub mod checkpoint;
pub mod plan;
pub mod primal;
pub mod scalar;
pub mod tape;

pub use active::Active;
pub use checkpoint::{Checkpoint, ParseCheckpointError};
pub use plan::RunPlan;
pub use primal::Primal;
pub use scalar::AdScalar;
pub use tape::{NodeId, Tape, TRANSIENT_THRESHOLD};
