#![deny(warnings, rust_2018_idioms)]

use weft::sync::MVar;
use weft::{basic, results_set, thread, Bounds, Failure, MemType, Way};

#[test]
fn producer_consumer_always_delivers() {
    let outcomes = results_set(
        Way::systematic(Bounds::NONE),
        MemType::SequentialConsistency,
        basic(|| {
            let chan = MVar::new();
            thread::spawn(move || chan.put(1));
            chan.take()
        }),
    );

    assert_eq!(outcomes, vec![Ok(1)].into_iter().collect());
}

#[test]
fn taking_from_an_empty_mvar_deadlocks() {
    let outcomes = results_set(
        Way::systematic(Bounds::NONE),
        MemType::SequentialConsistency,
        basic(|| {
            let chan: MVar<i32> = MVar::new();
            chan.take()
        }),
    );

    assert_eq!(outcomes, vec![Err(Failure::Deadlock)].into_iter().collect());
}

#[test]
fn double_put_deadlocks() {
    let outcomes = results_set(
        Way::systematic(Bounds::NONE),
        MemType::SequentialConsistency,
        basic(|| {
            let chan = MVar::new();
            chan.put(1);
            chan.put(2);
        }),
    );

    assert_eq!(outcomes, vec![Err(Failure::Deadlock)].into_iter().collect());
}

#[test]
fn competing_consumers_race_for_one_value() {
    let outcomes = results_set(
        Way::systematic(Bounds::NONE),
        MemType::SequentialConsistency,
        basic(|| {
            let chan = MVar::new();
            thread::spawn(move || chan.put(7));
            thread::spawn(move || {
                let _ = chan.take();
            });
            chan.take()
        }),
    );

    // Either main wins the race, or the other consumer does and main
    // blocks forever.
    assert_eq!(
        outcomes,
        vec![Ok(7), Err(Failure::Deadlock)].into_iter().collect()
    );
}

#[test]
fn an_mvar_is_a_rendezvous() {
    let outcomes = results_set(
        Way::systematic(Bounds::NONE),
        MemType::SequentialConsistency,
        basic(|| {
            let request = MVar::new();
            let response = MVar::new();

            thread::spawn(move || {
                let n: i32 = request.take();
                response.put(n * 2);
            });

            request.put(21);
            response.take()
        }),
    );

    assert_eq!(outcomes, vec![Ok(42)].into_iter().collect());
}
