#![deny(warnings, rust_2018_idioms)]

use weft::sync::{CRef, MVar};
use weft::{basic, results_set, thread, Bounds, Failure, MemType, Way};

use std::collections::HashSet;

/// Classic store buffering: each thread writes its own flag, then reads
/// the other's.
fn store_buffering(memtype: MemType) -> HashSet<Result<(i32, i32), Failure>> {
    results_set(
        Way::systematic(Bounds::NONE),
        memtype,
        basic(|| {
            let x = CRef::new(0);
            let y = CRef::new(0);
            let left = MVar::new();
            let right = MVar::new();

            thread::spawn(move || {
                x.write(1);
                left.put(y.read());
            });
            thread::spawn(move || {
                y.write(1);
                right.put(x.read());
            });

            (left.take(), right.take())
        }),
    )
}

#[test]
fn tso_allows_both_reads_to_miss_both_writes() {
    let outcomes = store_buffering(MemType::TotalStoreOrder);
    assert!(
        outcomes.contains(&Ok((0, 0))),
        "missing (0, 0): {:?}",
        outcomes
    );
}

#[test]
fn sequential_consistency_forbids_the_store_buffering_outcome() {
    let outcomes = store_buffering(MemType::SequentialConsistency);
    assert!(!outcomes.contains(&Ok((0, 0))), "got (0, 0): {:?}", outcomes);
    assert!(outcomes.contains(&Ok((1, 1))));
}

/// Message passing: the writer publishes data, then raises a flag.
fn message_passing(memtype: MemType) -> HashSet<Result<Option<i32>, Failure>> {
    results_set(
        Way::systematic(Bounds::NONE),
        memtype,
        basic(|| {
            let data = CRef::new(0);
            let flag = CRef::new(0);

            thread::spawn(move || {
                data.write(42);
                flag.write(1);
            });

            if flag.read() == 1 {
                Some(data.read())
            } else {
                None
            }
        }),
    )
}

#[test]
fn tso_commits_one_buffer_in_order() {
    let outcomes = message_passing(MemType::TotalStoreOrder);
    assert!(outcomes.contains(&Ok(Some(42))));
    assert!(
        !outcomes.contains(&Ok(Some(0))),
        "flag overtook data under TSO: {:?}",
        outcomes
    );
}

#[test]
fn pso_can_commit_the_flag_before_the_data() {
    let outcomes = message_passing(MemType::PartialStoreOrder);
    assert!(
        outcomes.contains(&Ok(Some(0))),
        "missing stale read: {:?}",
        outcomes
    );
    assert!(outcomes.contains(&Ok(Some(42))));
    assert!(outcomes.contains(&Ok(None)));
}
