//! The arithmetic capability set shared by plain and recording scalars.

use std::ops::{Add, Div, Mul, Neg, Sub};

/// Arithmetic surface a primal step function may use.
///
/// Implemented by plain `f64` (value-only replay, finite differences) and
/// by the tape-bound [`Active`](crate::Active) scalar (recording replay).
/// Which one a replay uses is a compile-time choice of scalar type, so the
/// recording path carries no per-operation branching.
pub trait AdScalar:
    Copy
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + Add<f64, Output = Self>
    + Sub<f64, Output = Self>
    + Mul<f64, Output = Self>
    + Div<f64, Output = Self>
{
    /// Current numeric value.
    fn value(self) -> f64;

    /// Sine.
    fn sin(self) -> Self;

    /// Cosine.
    fn cos(self) -> Self;

    /// Integer power.
    fn powi(self, n: i32) -> Self;

    /// In-place assignment.
    ///
    /// For recording scalars this is an observable operation (an identity
    /// edge into the destination's slot), not a plain overwrite, so step
    /// functions must route state updates through it.
    fn assign(&mut self, rhs: Self);
}

impl AdScalar for f64 {
    #[inline]
    fn value(self) -> f64 {
        self
    }

    #[inline]
    fn sin(self) -> f64 {
        f64::sin(self)
    }

    #[inline]
    fn cos(self) -> f64 {
        f64::cos(self)
    }

    #[inline]
    fn powi(self, n: i32) -> f64 {
        f64::powi(self, n)
    }

    #[inline]
    fn assign(&mut self, rhs: f64) {
        *self = rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cubic<S: AdScalar>(x: S) -> S {
        x.powi(3) - x * 2.0 + 1.0
    }

    #[test]
    fn test_f64_implements_the_capability_set() {
        assert_eq!(cubic(2.0), 5.0);
        let mut x = 1.0;
        x.assign(3.0);
        assert_eq!(x, 3.0);
        assert_eq!(AdScalar::sin(0.0), 0.0);
        assert_eq!(AdScalar::cos(0.0), 1.0);
    }
}
