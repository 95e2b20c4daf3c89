//! # Adjoint Engine
//!
//! Orchestrates the concurrent checkpointed reversal of a long-running
//! primal: a sequential recording phase fills a checkpoint store, then a
//! fixed worker pool sweeps the run backwards chunk by chunk, re-recording
//! each chunk on its own tape and folding the adjoints into one shared
//! accumulator in strict descending order.
//!
//! # Examples
//!
//! ```rust
//! use adjoint_engine::{reverse, verify, ReversalConfig};
//! use adjoint_primals::SineRecurrence;
//!
//! let config = ReversalConfig::builder()
//!     .steps(16)
//!     .window(8)
//!     .workers(2)
//!     .build()?;
//!
//! let input = [1.0, 0.0];
//! let seed = [0.0, 1.0];
//! let primal = SineRecurrence::new(config.plan());
//! let outcome = reverse(&primal, &config, &input, &seed)?;
//!
//! assert!((outcome.adjoints[0] - 0.391).abs() < 1e-3);
//! assert!(verify::verify_fraction(&primal, &input, &seed, &outcome.adjoints, 100) > 0.9);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod config;
mod driver;
pub mod verify;

pub use config::{ConfigError, ReversalConfig, ReversalConfigBuilder};
pub use driver::{reverse, reverse_multi, MultiReversalOutcome, ReversalError, ReversalOutcome};
