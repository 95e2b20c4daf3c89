//! Finite-difference verification of reversal results.
//!
//! A reversal can be checked without a second differentiation: pick a
//! random tangent direction, bump the input along it by a small step, run
//! the primal on both points and compare the directional derivative seen
//! by the outputs against the one predicted by the adjoints. Agreement in
//! one random direction is weak evidence; [`verify_fraction`] repeats the
//! check over many directions and reports the pass rate.

use adjoint_core::Primal;
use rand::Rng;
use rayon::prelude::*;

/// Absolute agreement tolerance between the two directional derivatives.
const TOLERANCE: f64 = 0.1;

/// Checks the adjoints against one random tangent direction.
///
/// `seed` is the output adjoint the reversal was run with and `adjoints`
/// its result. The bump step is `2^-15` times the sum of the inputs; a
/// zero sum makes the finite difference degenerate and the check passes
/// vacuously.
pub fn verify_direction<P: Primal>(
    primal: &P,
    input: &[f64],
    seed: &[f64],
    adjoints: &[f64],
    rng: &mut impl Rng,
) -> bool {
    let tangent: Vec<f64> = input.iter().map(|_| rng.gen_range(-5.0..5.0)).collect();
    let delta = 2f64.powi(-15) * input.iter().sum::<f64>();
    if delta == 0.0 {
        return true;
    }

    let mut base = input.to_vec();
    primal.run(&mut base);
    let mut bumped: Vec<f64> = input
        .iter()
        .zip(&tangent)
        .map(|(x, t)| x + delta * t)
        .collect();
    primal.run(&mut bumped);

    let forward: f64 = bumped
        .iter()
        .zip(&base)
        .zip(seed)
        .map(|((b, y), s)| s * (b - y) / delta)
        .sum();
    let reverse: f64 = tangent.iter().zip(adjoints).map(|(t, a)| t * a).sum();

    (forward - reverse).abs() < TOLERANCE
}

/// Runs [`verify_direction`] over `trials` random directions in parallel
/// and returns the fraction that agreed.
pub fn verify_fraction<P: Primal>(
    primal: &P,
    input: &[f64],
    seed: &[f64],
    adjoints: &[f64],
    trials: u32,
) -> f64 {
    if trials == 0 {
        return 1.0;
    }
    let passed = (0..trials)
        .into_par_iter()
        .filter(|_| verify_direction(primal, input, seed, adjoints, &mut rand::thread_rng()))
        .count();
    passed as f64 / trials as f64
}
