//! The set of model threads within one execution.

use crate::trace::{Lookahead, MVarId, TVarId, ThreadAction, ThreadId};

use std::collections::BTreeSet;
use std::fmt;

/// Why a thread cannot run.
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) enum BlockedOn {
    /// Waiting for an MVar to become empty.
    Put(MVarId),
    /// Waiting for an MVar to become full.
    Take(MVarId),
    /// A retried transaction, waiting for any of the read TVars to change.
    Stm(BTreeSet<TVarId>),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) enum State {
    Runnable,
    Blocked(BlockedOn),
    Terminated,
}

pub(crate) struct Thread {
    pub(crate) id: ThreadId,
    pub(crate) state: State,

    /// The operation this thread will perform when next scheduled. Set when
    /// the thread parks at a scheduling point; kept across blocking so a
    /// woken thread re-attempts the same operation.
    pub(crate) pending: Option<Lookahead>,

    /// What the thread did during the step it was last resumed for. Taken
    /// by the executor after each resume.
    pub(crate) performed: Option<ThreadAction>,
}

impl Thread {
    fn new(id: ThreadId) -> Thread {
        Thread {
            id,
            state: State::Runnable,
            pending: None,
            performed: None,
        }
    }

    pub(crate) fn is_runnable(&self) -> bool {
        self.state == State::Runnable
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.state == State::Terminated
    }

    pub(crate) fn set_runnable(&mut self) {
        self.state = State::Runnable;
    }

    pub(crate) fn set_blocked(&mut self, on: BlockedOn) {
        self.state = State::Blocked(on);
    }

    pub(crate) fn set_terminated(&mut self) {
        self.state = State::Terminated;
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Thread")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("pending", &self.pending)
            .finish()
    }
}

/// Every user thread of one execution, plus which one is active.
#[derive(Debug)]
pub(crate) struct Set {
    threads: Vec<Thread>,
    active: usize,
}

impl Set {
    /// A set containing only the initial thread, active.
    pub(crate) fn new() -> Set {
        Set {
            threads: vec![Thread::new(ThreadId::INITIAL)],
            active: 0,
        }
    }

    /// Create a new thread. It starts runnable with no pending operation.
    pub(crate) fn new_thread(&mut self) -> ThreadId {
        let id = ThreadId::from_index(self.threads.len());
        self.threads.push(Thread::new(id));
        id
    }

    pub(crate) fn active_id(&self) -> ThreadId {
        ThreadId::from_index(self.active)
    }

    pub(crate) fn active_mut(&mut self) -> &mut Thread {
        &mut self.threads[self.active]
    }

    pub(crate) fn set_active(&mut self, id: ThreadId) {
        self.active = id.index();
    }

    pub(crate) fn get_mut(&mut self, id: ThreadId) -> &mut Thread {
        &mut self.threads[id.index()]
    }

    pub(crate) fn main(&self) -> &Thread {
        &self.threads[ThreadId::INITIAL.index()]
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Thread> {
        self.threads.iter()
    }

    /// Wake every thread blocked taking from `mvar`. Returns who woke, in
    /// thread order.
    pub(crate) fn wake_takers(&mut self, mvar: MVarId) -> Vec<ThreadId> {
        self.wake(|on| *on == BlockedOn::Take(mvar))
    }

    /// Wake every thread blocked putting into `mvar`.
    pub(crate) fn wake_putters(&mut self, mvar: MVarId) -> Vec<ThreadId> {
        self.wake(|on| *on == BlockedOn::Put(mvar))
    }

    /// Wake every thread whose retried transaction read one of `written`.
    pub(crate) fn wake_stm(&mut self, written: &BTreeSet<TVarId>) -> Vec<ThreadId> {
        self.wake(|on| match on {
            BlockedOn::Stm(watched) => !watched.is_disjoint(written),
            _ => false,
        })
    }

    fn wake(&mut self, pred: impl Fn(&BlockedOn) -> bool) -> Vec<ThreadId> {
        let mut woken = Vec::new();
        for thread in &mut self.threads {
            if let State::Blocked(on) = &thread.state {
                if pred(on) {
                    thread.set_runnable();
                    woken.push(thread.id);
                }
            }
        }
        woken
    }
}
