#![deny(warnings, rust_2018_idioms)]

use weft::sync::CRef;
use weft::{basic, results_set, run_sct, thread, Bounds, Failure, MemType, Way};

use std::collections::HashSet;

fn two_unsynchronised_increments() -> impl Fn() -> usize + Send + Sync + 'static {
    || {
        let counter = CRef::new(0);

        thread::spawn(move || {
            let seen = counter.read();
            counter.write(seen + 1);
        });
        thread::spawn(move || {
            let seen = counter.read();
            counter.write(seen + 1);
        });

        counter.read()
    }
}

fn ok_results(bounds: Bounds) -> HashSet<usize> {
    results_set(
        Way::systematic(bounds),
        MemType::SequentialConsistency,
        basic(two_unsynchronised_increments()),
    )
    .into_iter()
    .filter_map(|r| r.ok())
    .collect()
}

fn preemptions(n: usize) -> Bounds {
    Bounds {
        preemption: Some(n),
        fair: None,
        length: None,
    }
}

#[test]
fn without_preemptions_main_runs_alone() {
    // Main never blocks or yields, so no other thread ever runs before it
    // returns.
    assert_eq!(ok_results(preemptions(0)), vec![0].into_iter().collect());
}

#[test]
fn raising_a_bound_never_loses_results() {
    let zero = ok_results(preemptions(0));
    let one = ok_results(preemptions(1));
    let two = ok_results(preemptions(2));
    let unbounded = ok_results(Bounds::NONE);

    assert!(zero.is_subset(&one));
    assert!(one.is_subset(&two));
    assert!(two.is_subset(&unbounded));
    assert_eq!(unbounded, vec![0, 1, 2].into_iter().collect());
}

#[test]
fn a_zero_length_bound_reports_nothing() {
    let executions: Vec<_> = run_sct(
        Way::systematic(Bounds {
            preemption: None,
            fair: None,
            length: Some(0),
        }),
        MemType::SequentialConsistency,
        basic(two_unsynchronised_increments()),
    )
    .collect();

    assert!(executions.is_empty());
}

#[test]
fn a_length_bound_cuts_off_runaway_models() {
    // The model can only finish by luck of scheduling; the length bound
    // guarantees the exploration itself finishes.
    let outcomes = results_set(
        Way::systematic(Bounds {
            preemption: None,
            fair: None,
            length: Some(20),
        }),
        MemType::SequentialConsistency,
        basic(|| {
            let flag = CRef::new(false);
            thread::spawn(move || flag.write(true));
            while !flag.read() {
                thread::yield_now();
            }
            true
        }),
    );

    assert!(outcomes.contains(&Ok(true)));
    assert!(outcomes.contains(&Err(Failure::Abort)));
}
