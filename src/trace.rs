//! The vocabulary of an execution: thread identifiers, actions, lookaheads,
//! scheduling decisions, traces, and failures.
//!
//! A [`Trace`] is the complete record of one execution of a model: one
//! [`Step`] per primitive operation, each carrying the scheduling decision
//! that caused it, the decisions that were available instead, and the action
//! the scheduled thread performed.

use std::fmt;

/// Identifies a thread within one execution of a model.
///
/// Identifiers are totally ordered. [`ThreadId::INITIAL`] is the first user
/// thread; user threads created by `fork` count upwards from it. Identifiers
/// strictly below `INITIAL` are *commit threads*: phantom threads that stand
/// for a buffered write reaching memory under a relaxed memory model.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ThreadId(i32);

impl ThreadId {
    /// The first user thread of every execution.
    pub const INITIAL: ThreadId = ThreadId(0);

    /// Returns `true` if this identifier denotes a commit thread.
    pub fn is_commit(self) -> bool {
        self.0 < 0
    }

    pub(crate) fn from_index(index: usize) -> ThreadId {
        ThreadId(index as i32)
    }

    pub(crate) fn index(self) -> usize {
        assert!(
            !self.is_commit(),
            "[weft internal bug] commit thread has no index"
        );
        self.0 as usize
    }

    pub(crate) fn commit(counter: i32) -> ThreadId {
        assert!(counter < 0, "[weft internal bug] commit ids are negative");
        ThreadId(counter)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(fmt)
    }
}

impl fmt::Debug for ThreadId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "ThreadId({})", self.0)
    }
}

/// Identifies a [`CRef`](crate::sync::CRef) within one execution.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CRefId(pub(crate) usize);

/// Identifies an [`MVar`](crate::sync::MVar) within one execution.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MVarId(pub(crate) usize);

/// Identifies a [`TVar`](crate::stm::TVar) within one execution.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TVarId(pub(crate) usize);

/// A scheduling decision, relative to the previously running thread.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Decision {
    /// The very first thread scheduled in an execution.
    Start(ThreadId),
    /// Keep running the thread that ran the previous step.
    Continue,
    /// Run a different thread than the previous step.
    SwitchTo(ThreadId),
}

/// The thread a decision resolves to, given the previously running thread.
pub fn tid_of(prev: ThreadId, decision: Decision) -> ThreadId {
    match decision {
        Decision::Start(tid) => tid,
        Decision::Continue => prev,
        Decision::SwitchTo(tid) => tid,
    }
}

/// The decision that schedules `tid`, given the previously running thread.
pub fn decision_of(prev: Option<ThreadId>, tid: ThreadId) -> Decision {
    match prev {
        None => Decision::Start(tid),
        Some(p) if p == tid => Decision::Continue,
        Some(_) => Decision::SwitchTo(tid),
    }
}

/// What a thread did when it was scheduled for one step.
///
/// Every variant carries enough detail to decide whether two actions are
/// dependent (whether swapping them could change the outcome).
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum ThreadAction {
    /// Created a new thread.
    Fork(ThreadId),
    /// Ceded the processor without blocking.
    Yield,
    /// Created a shared reference.
    NewCRef(CRefId),
    /// Read from a shared reference.
    ReadCRef(CRefId),
    /// Wrote to a shared reference. Under a buffered memory model the write
    /// went into the writer's store buffer, not to memory.
    WriteCRef(CRefId),
    /// Synchronised read-modify-write of a shared reference. Commits every
    /// outstanding store buffer first.
    ModifyCRef(CRefId),
    /// A buffered write by the named thread reached memory.
    CommitCRef(ThreadId, CRefId),
    /// Created a new (empty) MVar.
    NewMVar(MVarId),
    /// Filled an MVar, waking the listed threads.
    PutMVar(MVarId, Vec<ThreadId>),
    /// Attempted to fill a full MVar, and blocked.
    BlockedPutMVar(MVarId),
    /// Emptied an MVar, waking the listed threads.
    TakeMVar(MVarId, Vec<ThreadId>),
    /// Attempted to empty an empty MVar, and blocked.
    BlockedTakeMVar(MVarId),
    /// Committed a transaction touching the listed TVars, waking the listed
    /// threads.
    Stm(Vec<TVarId>, Vec<ThreadId>),
    /// Ran a transaction which retried; blocked on the TVars it read.
    BlockedStm(Vec<TVarId>),
    /// The main thread returned, ending the execution and abandoning every
    /// other thread. Only recorded when another thread was still alive; the
    /// step is dependent with everything, since any progress the abandoned
    /// threads could have made is cut off here.
    Stop,
}

impl ThreadAction {
    /// Returns `true` for store-buffer commit actions.
    pub fn is_commit(&self) -> bool {
        matches!(self, ThreadAction::CommitCRef(..))
    }

    /// Returns `true` if the action left the acting thread blocked.
    pub fn is_block(&self) -> bool {
        matches!(
            self,
            ThreadAction::BlockedPutMVar(_)
                | ThreadAction::BlockedTakeMVar(_)
                | ThreadAction::BlockedStm(_)
        )
    }

    /// The lookahead this action presented before it executed.
    pub fn lookahead(&self) -> Lookahead {
        match self {
            ThreadAction::Fork(_) => Lookahead::Fork,
            ThreadAction::Yield => Lookahead::Yield,
            ThreadAction::NewCRef(_) => Lookahead::NewCRef,
            ThreadAction::ReadCRef(r) => Lookahead::ReadCRef(*r),
            ThreadAction::WriteCRef(r) => Lookahead::WriteCRef(*r),
            ThreadAction::ModifyCRef(r) => Lookahead::ModifyCRef(*r),
            ThreadAction::CommitCRef(tid, r) => Lookahead::CommitCRef(*tid, *r),
            ThreadAction::NewMVar(_) => Lookahead::NewMVar,
            ThreadAction::PutMVar(m, _) | ThreadAction::BlockedPutMVar(m) => {
                Lookahead::PutMVar(*m)
            }
            ThreadAction::TakeMVar(m, _) | ThreadAction::BlockedTakeMVar(m) => {
                Lookahead::TakeMVar(*m)
            }
            ThreadAction::Stm(..) | ThreadAction::BlockedStm(_) => Lookahead::Stm,
            ThreadAction::Stop => Lookahead::Stop,
        }
    }
}

/// The next action a thread will perform, with runtime-unknown detail
/// erased.
///
/// Lookaheads let the scheduler and the explorer reason about a step before
/// it executes: which object it touches, whether it yields, whether it may
/// unblock other threads.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Lookahead {
    /// Will create a thread.
    Fork,
    /// Will yield.
    Yield,
    /// Will create a shared reference.
    NewCRef,
    /// Will read the given shared reference.
    ReadCRef(CRefId),
    /// Will write the given shared reference.
    WriteCRef(CRefId),
    /// Will perform a synchronised read-modify-write.
    ModifyCRef(CRefId),
    /// Will commit a buffered write of the named thread.
    CommitCRef(ThreadId, CRefId),
    /// Will create an MVar.
    NewMVar,
    /// Will fill (or block on) the given MVar.
    PutMVar(MVarId),
    /// Will empty (or block on) the given MVar.
    TakeMVar(MVarId),
    /// Will run a transaction. The TVar footprint is unknown until it runs.
    Stm,
    /// The main thread will return, ending the execution.
    Stop,
}

impl Lookahead {
    /// Returns `true` for yield-like steps.
    pub fn will_yield(self) -> bool {
        matches!(self, Lookahead::Yield)
    }

    /// Returns `true` for steps that may release a shared resource and so
    /// unblock other threads.
    pub fn will_release(self) -> bool {
        matches!(
            self,
            Lookahead::Fork | Lookahead::PutMVar(_) | Lookahead::TakeMVar(_) | Lookahead::Stm
        )
    }

    /// Returns `true` for store-buffer commit steps.
    pub fn is_commit(self) -> bool {
        matches!(self, Lookahead::CommitCRef(..))
    }
}

/// One primitive step of an execution.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Step {
    /// The decision the scheduler made.
    pub decision: Decision,
    /// The decisions that were available instead.
    pub alternatives: Vec<Decision>,
    /// What the scheduled thread did.
    pub action: ThreadAction,
}

/// The ordered record of one execution: one [`Step`] per primitive step.
pub type Trace = Vec<Step>;

/// Why an execution did not produce a value.
///
/// Failures are outcomes of the program under test, not engine errors: the
/// explorer records them and keeps exploring.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, thiserror::Error)]
pub enum Failure {
    /// Every live thread is blocked, and the main thread is blocked on a
    /// shared primitive.
    #[error("every thread is blocked")]
    Deadlock,
    /// Every live thread is blocked, and the main thread is blocked on a
    /// retried transaction.
    #[error("every thread is blocked on a transaction")]
    StmDeadlock,
    /// The execution reached a state it should not have been able to reach,
    /// such as a scheduler choosing a thread that cannot run.
    #[error("the execution reached an impossible state")]
    InternalError,
    /// The scheduler declined to choose a thread. Produced when every
    /// runnable thread exceeds the configured bounds.
    #[error("the scheduler aborted the execution")]
    Abort,
    /// An exploration was started from inside a running model.
    #[error("explorations cannot be nested inside a running model")]
    IllegalSubconcurrency,
    /// A panic escaped the main thread of the model.
    #[error("the main thread panicked")]
    UncaughtException,
}
