#![deny(warnings, rust_2018_idioms)]

use weft::stm::{self, atomically};
use weft::{basic, results_set, thread, with_setup, Bounds, Failure, MemType, Way};

#[test]
fn transactional_increments_are_never_lost() {
    let outcomes = results_set(
        Way::systematic(Bounds::NONE),
        MemType::SequentialConsistency,
        basic(|| {
            let counter = atomically(|tx| Ok(tx.new_tvar(0)));

            thread::spawn(move || {
                atomically(|tx| {
                    let n = tx.read(&counter);
                    tx.write(&counter, n + 1);
                    Ok(())
                });
            });
            thread::spawn(move || {
                atomically(|tx| {
                    let n = tx.read(&counter);
                    tx.write(&counter, n + 1);
                    Ok(())
                });
            });

            atomically(|tx| Ok(tx.read(&counter)))
        }),
    );

    assert_eq!(outcomes, vec![Ok(0), Ok(1), Ok(2)].into_iter().collect());
}

#[test]
fn retry_blocks_until_the_flag_flips() {
    let outcomes = results_set(
        Way::systematic(Bounds::NONE),
        MemType::SequentialConsistency,
        basic(|| {
            let flag = atomically(|tx| Ok(tx.new_tvar(false)));

            thread::spawn(move || {
                atomically(|tx| {
                    tx.write(&flag, true);
                    Ok(())
                });
            });

            atomically(|tx| {
                if tx.read(&flag) {
                    Ok(true)
                } else {
                    stm::retry()
                }
            })
        }),
    );

    assert_eq!(outcomes, vec![Ok(true)].into_iter().collect());
}

#[test]
fn retrying_with_no_writer_is_a_transactional_deadlock() {
    let outcomes = results_set(
        Way::systematic(Bounds::NONE),
        MemType::SequentialConsistency,
        basic(|| {
            let flag = atomically(|tx| Ok(tx.new_tvar(false)));
            atomically(|tx| {
                if tx.read(&flag) {
                    Ok(())
                } else {
                    stm::retry()
                }
            })
        }),
    );

    assert_eq!(
        outcomes,
        vec![Err(Failure::StmDeadlock)].into_iter().collect()
    );
}

#[test]
fn disjoint_transactions_have_one_outcome() {
    // The two transactions touch different TVars, so their order cannot
    // matter. (They are still explored in both orders: an unexecuted
    // transaction has an unknown footprint.)
    let executions: Vec<_> = weft::run_sct(
        Way::systematic(Bounds::NONE),
        MemType::SequentialConsistency,
        with_setup(
            || atomically(|tx| Ok((tx.new_tvar(0), tx.new_tvar(0)))),
            |&(a, b)| {
                thread::spawn(move || {
                    atomically(|tx| {
                        tx.write(&a, 1);
                        Ok(())
                    });
                });
                atomically(|tx| {
                    tx.write(&b, 2);
                    Ok(tx.read(&b))
                })
            },
        ),
    )
    .collect();

    assert!(!executions.is_empty());
    for (result, _) in executions {
        assert_eq!(result, Ok(2));
    }
}
