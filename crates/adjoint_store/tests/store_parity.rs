//! Every storage strategy must serve the identical descending tiling.

use std::path::Path;

use adjoint_core::RunPlan;
use adjoint_primals::{NestedSine, SineRecurrence};
use adjoint_store::{CheckpointStore, Store, StoreKind};

type Served = Vec<(u64, u64, Vec<f64>)>;

fn drain(kind: StoreKind, dir: &Path) -> Served {
    let plan = RunPlan::new(22, 4);
    let primal = SineRecurrence::new(plan);
    let mut store = Store::build(kind, &primal, plan, 2, dir);
    store.record_loader(&[1.0, 0.0]).unwrap();
    (1..=plan.chunks())
        .rev()
        .map(|chunk| {
            let c = store.get_checkpoint(chunk).unwrap();
            (c.from(), c.to(), c.state().to_vec())
        })
        .collect()
}

#[test]
fn test_every_strategy_serves_the_same_checkpoints() {
    let dir = tempfile::tempdir().unwrap();
    let kinds = [
        StoreKind::Naive,
        StoreKind::memory(),
        StoreKind::Disk,
        StoreKind::hybrid(),
    ];
    let served: Vec<Served> = kinds.iter().map(|&k| drain(k, dir.path())).collect();
    for other in &served[1..] {
        assert_eq!(&served[0], other);
    }
}

#[test]
fn test_the_tiling_is_exact_and_descending() {
    let dir = tempfile::tempdir().unwrap();
    let served = drain(StoreKind::Disk, dir.path());
    assert_eq!(served.len(), 6);
    assert_eq!(served.first().map(|w| w.1), Some(22));
    assert_eq!(served.last().map(|w| w.0), Some(0));
    for pair in served.windows(2) {
        // Each window ends where the previously served one began.
        assert_eq!(pair[1].1, pair[0].0);
    }
}

#[test]
fn test_parity_holds_for_a_primal_with_a_final_step() {
    let dir = tempfile::tempdir().unwrap();
    let plan = RunPlan::new(18, 3);
    let primal = NestedSine::new(plan);
    let input = [0.4, 1.1, 0.0];

    let mut reference = None;
    for kind in [
        StoreKind::Naive,
        StoreKind::memory(),
        StoreKind::Disk,
        StoreKind::hybrid(),
    ] {
        let mut store = Store::build(kind, &primal, plan, 3, dir.path());
        store.record_loader(&input).unwrap();
        let served: Served = (1..=plan.chunks())
            .rev()
            .map(|chunk| {
                let c = store.get_checkpoint(chunk).unwrap();
                (c.from(), c.to(), c.state().to_vec())
            })
            .collect();
        match &reference {
            None => reference = Some(served),
            Some(expected) => assert_eq!(expected, &served),
        }
    }
}
