//! Append-only adjoint tape with a wraparound transient id arena.
//!
//! The tape stores one record per arithmetic operation, flattened as
//! `[argument ids..., argument count, result id]` alongside a parallel
//! sequence of local partial derivatives, one per argument. Records are
//! never revisited during recording; a single reverse scan propagates
//! adjoints from results to arguments.
//!
//! # Node ids
//!
//! Negative ids are *persistent*: one per chunk-boundary state slot, handed
//! out by [`Tape::register_input`] and mapped to the leading accumulator
//! slots. Non-negative ids are *transient*: op results whose adjoint is
//! read exactly once shortly after being written. Transient ids are
//! recycled in blocks once the counter passes
//! [`TRANSIENT_THRESHOLD`]` + bandwidth` at an exact multiple of the
//! bandwidth, so the accumulator only needs `bandwidth` transient slots no
//! matter how long the chunk runs.
//!
//! The *bandwidth* is the largest observed id distance between a transient
//! result and a transient argument. It only grows while recording; once
//! the counter has wrapped, an argument read outside its recycling window
//! is a liveness violation and is rejected by a debug assertion.

use std::cell::RefCell;
use std::fmt;

use rayon::prelude::*;

/// Identifier of a recorded node.
///
/// Negative values denote persistent chunk-boundary slots, non-negative
/// values denote recycled transients.
pub type NodeId = i32;

/// Transient ids are recycled once the counter has passed this threshold.
pub const TRANSIENT_THRESHOLD: NodeId = 10_000;

struct TapeBuf {
    /// Flattened records: `[arg ids..., arg count, result id]`.
    edges: Vec<NodeId>,
    /// One local partial per argument entry, in push order.
    partials: Vec<f64>,
    /// Next transient id.
    counter: NodeId,
    /// Next persistent id (counts down from -1).
    next_persistent: NodeId,
    /// Largest observed transient result/argument id distance.
    bandwidth: NodeId,
    /// Counter value at which the transient arena wrapped, 0 before the
    /// first wrap. Ids live modulo this period afterwards.
    period: NodeId,
}

impl TapeBuf {
    fn new() -> Self {
        Self {
            edges: Vec::new(),
            partials: Vec::new(),
            counter: 0,
            next_persistent: -1,
            bandwidth: 1,
            period: 0,
        }
    }

    fn persistent_count(&self) -> NodeId {
        -self.next_persistent - 1
    }

    fn next_transient(&mut self) -> NodeId {
        if self.counter >= TRANSIENT_THRESHOLD + self.bandwidth
            && self.counter % self.bandwidth == 0
        {
            self.period = self.counter;
            self.counter = 0;
        }
        let id = self.counter;
        self.counter += 1;
        id
    }

    /// Widens the bandwidth to cover the distance between a transient
    /// result and a transient argument. Persistent arguments have stable
    /// slots and never contribute.
    fn widen(&mut self, result: NodeId, arg: NodeId) {
        if arg < 0 {
            return;
        }
        let mut span = result - arg;
        if self.period != 0 {
            if span < 0 {
                span += self.period;
            }
            debug_assert!(
                span <= self.bandwidth,
                "transient id {arg} consumed outside its recycling window"
            );
            return;
        }
        if span > self.bandwidth {
            self.bandwidth = span;
        }
    }
}

/// Append-only computation graph shared by all recording scalars of one
/// chunk.
///
/// Interior mutability lets any number of [`Active`](crate::Active) values
/// borrow the tape immutably while recording; the tape itself is confined
/// to the worker thread that builds it. Interpretation only reads the
/// tape, so one recorded chunk can be interpreted against many
/// accumulators.
pub struct Tape {
    buf: RefCell<TapeBuf>,
}

impl Tape {
    /// Creates an empty tape.
    pub fn new() -> Self {
        Self {
            buf: RefCell::new(TapeBuf::new()),
        }
    }

    /// Allocates a persistent id and records its zero-argument marker.
    ///
    /// Inputs registered first map to the leading accumulator slots, in
    /// registration order.
    pub fn register_input(&self) -> NodeId {
        let mut b = self.buf.borrow_mut();
        let id = b.next_persistent;
        b.next_persistent -= 1;
        b.edges.push(0);
        b.edges.push(id);
        id
    }

    /// Records a one-argument operation and returns the result id.
    pub(crate) fn record_unary(&self, arg: NodeId, partial: f64) -> NodeId {
        let mut b = self.buf.borrow_mut();
        b.partials.push(partial);
        let result = b.next_transient();
        b.widen(result, arg);
        b.edges.push(arg);
        b.edges.push(1);
        b.edges.push(result);
        result
    }

    /// Records a two-argument operation and returns the result id.
    pub(crate) fn record_binary(
        &self,
        lhs: NodeId,
        lhs_partial: f64,
        rhs: NodeId,
        rhs_partial: f64,
    ) -> NodeId {
        let mut b = self.buf.borrow_mut();
        b.partials.push(lhs_partial);
        b.partials.push(rhs_partial);
        let result = b.next_transient();
        b.widen(result, lhs);
        b.widen(result, rhs);
        b.edges.push(lhs);
        b.edges.push(rhs);
        b.edges.push(2);
        b.edges.push(result);
        result
    }

    /// Records an identity edge into an existing destination id.
    ///
    /// Assignments keep the destination's id, so the destination's slot
    /// position is unaffected and the bandwidth does not change.
    pub(crate) fn record_assign(&self, src: NodeId, dst: NodeId) {
        let mut b = self.buf.borrow_mut();
        b.partials.push(1.0);
        b.edges.push(src);
        b.edges.push(1);
        b.edges.push(dst);
    }

    /// Number of registered persistent inputs.
    pub fn num_inputs(&self) -> usize {
        self.buf.borrow().persistent_count() as usize
    }

    /// Current transient bandwidth.
    pub fn bandwidth(&self) -> NodeId {
        self.buf.borrow().bandwidth
    }

    /// Required accumulator length: one slot per persistent input plus
    /// `bandwidth` shared transient slots.
    ///
    /// Bounded by the longest live range of an intermediate, not by the
    /// number of recorded operations.
    pub fn ram(&self) -> usize {
        let b = self.buf.borrow();
        (b.bandwidth + b.persistent_count()) as usize
    }

    /// Approximate heap footprint of the recorded tape in bytes.
    pub fn memory_bytes(&self) -> usize {
        let b = self.buf.borrow();
        b.edges.len() * std::mem::size_of::<NodeId>()
            + b.partials.len() * std::mem::size_of::<f64>()
    }

    /// Propagates adjoints through the tape in reverse record order.
    ///
    /// `adjoints` must hold at least [`ram()`](Self::ram) slots, seeded at
    /// the persistent positions of the outputs of interest. Each record
    /// reads its result slot, zeroes it when the record has arguments and
    /// scatters `result adjoint x partial` into the argument slots, so a
    /// transient slot can be reused as soon as its adjoint has been
    /// propagated.
    pub fn interpret(&self, adjoints: &mut [f64]) {
        let b = self.buf.borrow();
        debug_assert!(adjoints.len() >= (b.bandwidth + b.persistent_count()) as usize);
        run_reverse(
            &b.edges,
            &b.partials,
            b.bandwidth,
            b.persistent_count(),
            adjoints,
        );
    }

    /// Interprets the tape once per accumulator, in parallel.
    ///
    /// Interpretation is read-only on the tape, so independent seed
    /// vectors propagate concurrently through the same recorded chunk.
    pub fn interpret_multi(&self, accumulators: &mut [Vec<f64>]) {
        let b = self.buf.borrow();
        let edges = b.edges.as_slice();
        let partials = b.partials.as_slice();
        let bandwidth = b.bandwidth;
        let persistent = b.persistent_count();
        accumulators
            .par_iter_mut()
            .for_each(|adjoints| run_reverse(edges, partials, bandwidth, persistent, adjoints));
    }

    /// Renders the recorded graph in Graphviz dot syntax.
    pub fn dot(&self) -> String {
        let b = self.buf.borrow();
        let mut out = String::from("digraph tape {\n");
        let mut e = b.edges.len();
        let mut p = b.partials.len();
        while e > 0 {
            e -= 1;
            let result = b.edges[e];
            e -= 1;
            let count = b.edges[e] as usize;
            for _ in 0..count {
                e -= 1;
                p -= 1;
                out.push_str(&format!(
                    "    \"{}\" -> \"{}\" [label=\"{:.3}\"];\n",
                    node_label(b.edges[e]),
                    node_label(result),
                    b.partials[p],
                ));
            }
        }
        out.push_str("}\n");
        out
    }
}

impl Default for Tape {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Tape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.buf.borrow();
        f.debug_struct("Tape")
            .field("records", &b.partials.len())
            .field("inputs", &b.persistent_count())
            .field("bandwidth", &b.bandwidth)
            .finish()
    }
}

fn node_label(id: NodeId) -> String {
    if id < 0 {
        format!("x{}", -id - 1)
    } else {
        format!("t{id}")
    }
}

fn slot(id: NodeId, bandwidth: NodeId, persistent: NodeId) -> usize {
    if id < 0 {
        (-id - 1) as usize
    } else {
        (id % bandwidth + persistent) as usize
    }
}

fn run_reverse(
    edges: &[NodeId],
    partials: &[f64],
    bandwidth: NodeId,
    persistent: NodeId,
    adjoints: &mut [f64],
) {
    let mut e = edges.len();
    let mut p = partials.len();
    while e > 0 {
        e -= 1;
        let result = edges[e];
        e -= 1;
        let count = edges[e] as usize;
        let result_slot = slot(result, bandwidth, persistent);
        let seed = adjoints[result_slot];
        if count > 0 {
            adjoints[result_slot] = 0.0;
        }
        for _ in 0..count {
            e -= 1;
            p -= 1;
            adjoints[slot(edges[e], bandwidth, persistent)] += seed * partials[p];
        }
    }
    debug_assert_eq!(p, 0);
}
