#![deny(warnings, rust_2018_idioms)]

use weft::model::{Basic, Model};
use weft::sync::{CRef, MVar};
use weft::trace::{tid_of, Decision, Lookahead, ThreadAction};
use weft::{basic, run_sct, thread, Bounds, MemType, Scheduler, ThreadId, Way};

use std::collections::{BTreeMap, VecDeque};

/// Follows a recorded sequence of decisions, step for step.
struct Replay {
    decisions: VecDeque<Decision>,
    prev: Option<ThreadId>,
}

impl Replay {
    fn new(decisions: impl IntoIterator<Item = Decision>) -> Replay {
        Replay {
            decisions: decisions.into_iter().collect(),
            prev: None,
        }
    }
}

impl Scheduler for Replay {
    fn schedule(
        &mut self,
        _prior: Option<(ThreadId, &ThreadAction)>,
        runnable: &BTreeMap<ThreadId, Lookahead>,
    ) -> Option<ThreadId> {
        let decision = self.decisions.pop_front()?;
        let tid = tid_of(self.prev.unwrap_or(ThreadId::INITIAL), decision);
        self.prev = Some(tid);
        assert!(runnable.contains_key(&tid), "replayed a non-runnable thread");
        Some(tid)
    }
}

fn prog() -> Basic<impl Fn() -> usize + Send + Sync + 'static> {
    basic(|| {
        let counter = CRef::new(0);
        let chan = MVar::new();

        thread::spawn(move || {
            let seen = counter.read();
            counter.write(seen + 1);
            chan.put(seen);
        });
        thread::spawn(move || {
            let seen = counter.read();
            counter.write(seen + 10);
        });

        counter.read() + chan.take()
    })
}

#[test]
fn every_reported_trace_replays_to_the_same_outcome() {
    let executions: Vec<_> = run_sct(
        Way::systematic(Bounds::NONE),
        MemType::SequentialConsistency,
        prog(),
    )
    .collect();

    assert!(!executions.is_empty());

    for (result, trace) in executions {
        let mut replay = Replay::new(trace.iter().map(|step| step.decision));
        let (replayed, retrace) = prog().run(&mut replay, MemType::SequentialConsistency);

        assert_eq!(replayed, result);
        assert_eq!(retrace, trace);
    }
}

#[test]
fn buffered_schedules_replay_too() {
    let executions: Vec<_> = run_sct(
        Way::systematic(Bounds::NONE),
        MemType::TotalStoreOrder,
        prog(),
    )
    .collect();

    assert!(!executions.is_empty());

    for (result, trace) in executions {
        let mut replay = Replay::new(trace.iter().map(|step| step.decision));
        let (replayed, retrace) = prog().run(&mut replay, MemType::TotalStoreOrder);

        assert_eq!(replayed, result);
        assert_eq!(retrace, trace);
    }
}
