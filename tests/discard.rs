#![deny(warnings, rust_2018_idioms)]

use weft::sync::CRef;
use weft::{basic, run_sct, run_sct_discard, thread, Bounds, Discard, MemType, Way};

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

fn discard_lost_updates(result: &Result<usize, weft::Failure>) -> Option<Discard> {
    match result {
        Ok(0) => Some(Discard::ResultAndTrace),
        Ok(1) => Some(Discard::Trace),
        _ => None,
    }
}

#[test]
fn discarding_is_the_same_as_post_filtering() {
    let discarded: Vec<_> = run_sct_discard(
        discard_lost_updates,
        Way::systematic(Bounds::NONE),
        MemType::SequentialConsistency,
        basic(two_unsynchronised_increments()),
    )
    .collect();

    let filtered: Vec<_> = run_sct(
        Way::systematic(Bounds::NONE),
        MemType::SequentialConsistency,
        basic(two_unsynchronised_increments()),
    )
    .filter_map(|(result, trace)| match discard_lost_updates(&result) {
        Some(Discard::ResultAndTrace) => None,
        Some(Discard::Trace) => Some((result, Vec::new())),
        None => Some((result, trace)),
    })
    .collect();

    assert_eq!(discarded, filtered);
}

#[test]
fn discarding_results_shrinks_a_random_budget() {
    let kept: Vec<_> = run_sct_discard(
        |result| match result {
            Ok(0) => Some(Discard::ResultAndTrace),
            _ => None,
        },
        Way::uniform(7, 30),
        MemType::SequentialConsistency,
        basic(two_unsynchronised_increments()),
    )
    .collect();

    let full: Vec<_> = run_sct(
        Way::uniform(7, 30),
        MemType::SequentialConsistency,
        basic(two_unsynchronised_increments()),
    )
    .collect();

    assert_eq!(full.len(), 30);
    assert_eq!(
        kept.len(),
        full.iter().filter(|(r, _)| *r != Ok(0)).count()
    );
}
