//! Program-state snapshots and their exact-precision text codec.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::active::Active;
use crate::tape::Tape;

/// Snapshot of the primal state at an iteration boundary.
///
/// `from` is the iteration the state was captured at; `to` is the exclusive
/// replay bound, with `0` meaning open ended (replay to completion).
///
/// The [`Display`](fmt::Display)/[`FromStr`] pair is the storage wire
/// format: `{from;to;v0,v1,...,}` with every value in 17-significant-digit
/// scientific notation, so a round trip through text reproduces each `f64`
/// exactly.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Checkpoint {
    state: Vec<f64>,
    from: u64,
    to: u64,
}

impl Checkpoint {
    /// Creates an open-ended checkpoint captured at `from`.
    pub fn new(state: Vec<f64>, from: u64) -> Self {
        Self::with_range(state, from, 0)
    }

    /// Creates a checkpoint with an explicit replay bound.
    pub fn with_range(state: Vec<f64>, from: u64, to: u64) -> Self {
        Self { state, from, to }
    }

    /// Captured state values.
    pub fn state(&self) -> &[f64] {
        &self.state
    }

    /// Iteration the state was captured at.
    pub fn from(&self) -> u64 {
        self.from
    }

    /// Exclusive replay bound, `0` when open ended.
    pub fn to(&self) -> u64 {
        self.to
    }

    /// Bounds the replay range.
    pub fn set_to(&mut self, to: u64) {
        self.to = to;
    }

    /// Starts a plain-value replay: cloned state plus the replay range.
    pub fn start(&self) -> (Vec<f64>, u64, u64) {
        (self.state.clone(), self.from, self.to)
    }

    /// Starts a recording replay: every state slot is registered as a
    /// persistent input on `tape`, in slot order.
    pub fn start_on<'t>(&self, tape: &'t Tape) -> (Vec<Active<'t>>, u64, u64) {
        let state = self
            .state
            .iter()
            .map(|&value| Active::input(tape, value))
            .collect();
        (state, self.from, self.to)
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{};{};", self.from, self.to)?;
        for value in &self.state {
            write!(f, "{value:.16e},")?;
        }
        write!(f, "}}")
    }
}

/// Failure to decode a checkpoint record.
///
/// A malformed record is fatal for the retrieval that hit it; there is no
/// recovery path through a corrupted store.
#[derive(Debug, Error)]
pub enum ParseCheckpointError {
    /// The record is not wrapped in `{` and `}`.
    #[error("checkpoint record must be delimited by '{{' and '}}'")]
    Delimiter,
    /// A `from`/`to`/state section is missing.
    #[error("checkpoint record is truncated")]
    Truncated,
    /// An iteration bound failed to parse.
    #[error("invalid iteration bound: {0}")]
    Bound(#[from] std::num::ParseIntError),
    /// A state value failed to parse.
    #[error("invalid state value: {0}")]
    Value(#[from] std::num::ParseFloatError),
}

impl FromStr for Checkpoint {
    type Err = ParseCheckpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .trim()
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .ok_or(ParseCheckpointError::Delimiter)?;
        let mut sections = body.splitn(3, ';');
        let from = sections
            .next()
            .ok_or(ParseCheckpointError::Truncated)?
            .parse()?;
        let to = sections
            .next()
            .ok_or(ParseCheckpointError::Truncated)?
            .parse()?;
        let values = sections.next().ok_or(ParseCheckpointError::Truncated)?;
        let values = values.strip_suffix(',').unwrap_or(values);
        let state = if values.is_empty() {
            Vec::new()
        } else {
            values
                .split(',')
                .map(str::parse)
                .collect::<Result<Vec<f64>, _>>()?
        };
        Ok(Self { state, from, to })
    }
}
