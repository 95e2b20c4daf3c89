//! Tape-bound recording scalar.

use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::scalar::AdScalar;
use crate::tape::{NodeId, Tape};

/// A scalar that records every operation applied to it on its [`Tape`].
///
/// `Active` is `Copy`: binding it to a new variable aliases the same node,
/// which is exactly the adjoint flow of reading the same value twice.
/// Overwriting recorded state must go through [`AdScalar::assign`] instead,
/// which records an identity edge into the destination's existing id.
///
/// Operations between two `Active` values require both to be bound to the
/// same tape.
#[derive(Clone, Copy, Debug)]
pub struct Active<'t> {
    tape: &'t Tape,
    value: f64,
    id: NodeId,
}

impl<'t> Active<'t> {
    /// Registers a persistent chunk-boundary input on `tape`.
    pub fn input(tape: &'t Tape, value: f64) -> Self {
        Self {
            tape,
            value,
            id: tape.register_input(),
        }
    }

    /// Current numeric value.
    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Id of the node this scalar currently refers to. Diagnostic.
    #[inline]
    pub fn node_id(&self) -> NodeId {
        self.id
    }

    fn unary(&self, value: f64, partial: f64) -> Self {
        Self {
            tape: self.tape,
            value,
            id: self.tape.record_unary(self.id, partial),
        }
    }

    fn binary(&self, rhs: &Self, value: f64, lhs_partial: f64, rhs_partial: f64) -> Self {
        debug_assert!(std::ptr::eq(self.tape, rhs.tape));
        Self {
            tape: self.tape,
            value,
            id: self
                .tape
                .record_binary(self.id, lhs_partial, rhs.id, rhs_partial),
        }
    }
}

impl<'t> Add for Active<'t> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.binary(&rhs, self.value + rhs.value, 1.0, 1.0)
    }
}

impl<'t> Sub for Active<'t> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.binary(&rhs, self.value - rhs.value, 1.0, -1.0)
    }
}

impl<'t> Mul for Active<'t> {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        if self.id == rhs.id {
            // x * x: one edge with the combined partial.
            self.unary(self.value * rhs.value, 2.0 * self.value)
        } else {
            self.binary(&rhs, self.value * rhs.value, rhs.value, self.value)
        }
    }
}

impl<'t> Div for Active<'t> {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        self.binary(
            &rhs,
            self.value / rhs.value,
            1.0 / rhs.value,
            -self.value / (rhs.value * rhs.value),
        )
    }
}

impl<'t> Neg for Active<'t> {
    type Output = Self;

    fn neg(self) -> Self {
        self.unary(-self.value, -1.0)
    }
}

impl<'t> Add<f64> for Active<'t> {
    type Output = Self;

    fn add(self, rhs: f64) -> Self {
        self.unary(self.value + rhs, 1.0)
    }
}

impl<'t> Sub<f64> for Active<'t> {
    type Output = Self;

    fn sub(self, rhs: f64) -> Self {
        self.unary(self.value - rhs, 1.0)
    }
}

impl<'t> Mul<f64> for Active<'t> {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        self.unary(self.value * rhs, rhs)
    }
}

impl<'t> Div<f64> for Active<'t> {
    type Output = Self;

    fn div(self, rhs: f64) -> Self {
        self.unary(self.value / rhs, 1.0 / rhs)
    }
}

impl<'t> AdScalar for Active<'t> {
    #[inline]
    fn value(self) -> f64 {
        self.value
    }

    fn sin(self) -> Self {
        self.unary(self.value.sin(), self.value.cos())
    }

    fn cos(self) -> Self {
        self.unary(self.value.cos(), -self.value.sin())
    }

    fn powi(self, n: i32) -> Self {
        self.unary(self.value.powi(n), f64::from(n) * self.value.powi(n - 1))
    }

    fn assign(&mut self, rhs: Self) {
        debug_assert!(std::ptr::eq(self.tape, rhs.tape));
        self.tape.record_assign(rhs.id, self.id);
        self.value = rhs.value;
    }
}
