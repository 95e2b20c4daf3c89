//! Full reversal runs against the sine recurrence, for every storage
//! strategy.

use adjoint_core::RunPlan;
use adjoint_engine::{reverse, reverse_multi, verify, ReversalConfig};
use adjoint_primals::SineRecurrence;
use adjoint_store::StoreKind;
use approx::assert_abs_diff_eq;
use tempfile::TempDir;

const INPUT: [f64; 2] = [1.0, 0.0];
const SEED: [f64; 2] = [0.0, 1.0];

fn every_kind() -> [StoreKind; 4] {
    [
        StoreKind::Naive,
        StoreKind::memory(),
        StoreKind::Disk,
        StoreKind::hybrid(),
    ]
}

fn run(kind: StoreKind, steps: u64, window: u64, workers: usize, dir: &TempDir) -> Vec<f64> {
    let config = ReversalConfig::builder()
        .steps(steps)
        .window(window)
        .workers(workers)
        .store(kind)
        .data_dir(dir.path())
        .build()
        .unwrap();
    let primal = SineRecurrence::new(config.plan());
    reverse(&primal, &config, &INPUT, &SEED).unwrap().adjoints
}

#[test]
fn test_long_run_adjoint() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let dir = tempfile::tempdir().unwrap();
    for kind in every_kind() {
        let adjoints = run(kind, 10_000, 1_000, 4, &dir);
        assert_abs_diff_eq!(adjoints[0], 0.552355, epsilon = 1e-3);
    }
}

#[test]
fn test_short_run_adjoint() {
    let dir = tempfile::tempdir().unwrap();
    for kind in every_kind() {
        let adjoints = run(kind, 16, 8, 2, &dir);
        assert_abs_diff_eq!(adjoints[0], 0.391, epsilon = 1e-3);
    }
}

#[test]
fn test_every_store_produces_identical_adjoints() {
    let dir = tempfile::tempdir().unwrap();
    let reference = run(StoreKind::Naive, 200, 20, 2, &dir);
    for kind in [StoreKind::memory(), StoreKind::Disk, StoreKind::hybrid()] {
        // The same chunks are interpreted in the same order, so the
        // adjoints agree bit for bit.
        assert_eq!(run(kind, 200, 20, 2, &dir), reference);
    }
}

#[test]
fn test_adjoints_are_linear_in_the_seed() {
    let dir = tempfile::tempdir().unwrap();
    let config = ReversalConfig::builder()
        .steps(64)
        .window(8)
        .workers(2)
        .data_dir(dir.path())
        .build()
        .unwrap();
    let primal = SineRecurrence::new(config.plan());

    let unit = reverse(&primal, &config, &INPUT, &[0.0, 1.0]).unwrap();
    let doubled = reverse(&primal, &config, &INPUT, &[0.0, 2.0]).unwrap();

    // Doubling is exact in floating point, so so is the scaled sweep.
    let scaled: Vec<f64> = unit.adjoints.iter().map(|a| 2.0 * a).collect();
    assert_eq!(doubled.adjoints, scaled);
}

#[test]
fn test_multi_seed_matches_independent_runs() {
    let dir = tempfile::tempdir().unwrap();
    let config = ReversalConfig::builder()
        .steps(100)
        .window(10)
        .workers(2)
        .store(StoreKind::Disk)
        .data_dir(dir.path())
        .build()
        .unwrap();
    let primal = SineRecurrence::new(config.plan());

    let seeds = vec![vec![0.0, 1.0], vec![1.0, 0.0]];
    let multi = reverse_multi(&primal, &config, &INPUT, &seeds).unwrap();

    for (seed, adjoints) in seeds.iter().zip(&multi.adjoints) {
        let single = reverse(&primal, &config, &INPUT, seed).unwrap();
        assert_eq!(adjoints, &single.adjoints);
    }
}

#[test]
fn test_finite_differences_confirm_the_adjoints() {
    let dir = tempfile::tempdir().unwrap();
    let adjoints = run(StoreKind::memory(), 16, 8, 2, &dir);
    let primal = SineRecurrence::new(RunPlan::new(16, 4));
    let fraction = verify::verify_fraction(&primal, &INPUT, &SEED, &adjoints, 100);
    assert!(fraction > 0.9, "only {fraction} of trials agreed");
}
