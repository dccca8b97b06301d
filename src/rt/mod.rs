//! The deterministic executor.
//!
//! One call to [`run`] performs one execution of a model: user threads run
//! on coroutine fibers, parking at every shared-state operation; between
//! parks the executor asks the scheduler which thread performs the next
//! step, resumes it, and records what it did. The produced [`Trace`] is the
//! complete schedule of the execution, sufficient to replay it.

mod buffer;
mod execution;
pub(crate) mod fiber;
pub(crate) mod object;
pub(crate) mod thread;

pub(crate) use self::execution::Execution;
pub(crate) use self::object::{clone_value, take_value, AnyClone, Store};
pub(crate) use self::thread::BlockedOn;

use crate::sched::Scheduler;
use crate::settings::MemType;
use crate::trace::{
    decision_of, CRefId, Failure, Lookahead, MVarId, Step, TVarId, ThreadAction, ThreadId, Trace,
};

use self::fiber::Pool;

use scoped_tls::scoped_thread_local;

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};

use tracing::trace;

struct State<'a> {
    execution: &'a mut Execution,
    spawns: &'a mut VecDeque<Spawn>,
}

struct Spawn {
    tid: ThreadId,
    f: Box<dyn FnOnce()>,
}

scoped_thread_local! {
    static STATE: RefCell<State<'static>>
}

unsafe fn transmute_lt<'a>(state: State<'a>) -> State<'static> {
    std::mem::transmute(state)
}

fn with_state<F, R>(f: F) -> R
where
    F: FnOnce(&mut State<'_>) -> R,
{
    assert!(
        STATE.is_set(),
        "model operations may only be used inside a running model"
    );
    STATE.with(|cell| f(&mut *cell.borrow_mut()))
}

/// Access the current execution. Panics outside a running model.
pub(crate) fn execution<F, R>(f: F) -> R
where
    F: FnOnce(&mut Execution) -> R,
{
    with_state(|state| f(state.execution))
}

/// Run the fiber of `tid` with the execution context installed.
fn tick(pool: &mut Pool, tid: ThreadId, execution: &mut Execution, spawns: &mut VecDeque<Spawn>) {
    let state = RefCell::new(unsafe { transmute_lt(State { execution, spawns }) });
    STATE.set(&state, || pool.resume(tid.index()));
}

/// Create the fibers of freshly forked threads and run each to its first
/// scheduling point, so every runnable thread has a pending operation.
fn drain_spawns(pool: &mut Pool, execution: &mut Execution, spawns: &mut VecDeque<Spawn>) {
    while let Some(spawn) = spawns.pop_front() {
        let index = pool.add(spawn.f);
        assert_eq!(
            index,
            spawn.tid.index(),
            "[weft internal bug] fiber and thread indexes diverged"
        );
        execution.threads.set_active(spawn.tid);
        tick(pool, spawn.tid, execution, spawns);
    }
}

/// The outcome of one execution, before result extraction.
pub(crate) struct RunOutcome {
    pub(crate) failure: Option<Failure>,
    pub(crate) trace: Trace,
    pub(crate) store: Store,
    /// Threads other than main still alive at the end. A setup prefix
    /// leaving live children cannot be captured as a snapshot.
    pub(crate) live_children: bool,
}

/// Execute a model once under `sched`.
///
/// `store` seeds the shared-object store (a snapshot replay passes a
/// captured one). With `pinned` set the main thread starts in the
/// unexplored setup phase and must call [`unpin`] before its explored part.
pub(crate) fn run(
    memtype: MemType,
    store: Store,
    pinned: bool,
    sched: &mut dyn Scheduler,
    main: Box<dyn FnOnce()>,
) -> RunOutcome {
    if STATE.is_set() {
        return RunOutcome {
            failure: Some(Failure::IllegalSubconcurrency),
            trace: Vec::new(),
            store: Store::new(),
            live_children: false,
        };
    }

    let mut execution = Execution::new(memtype, store, pinned);
    let mut pool = Pool::new();
    let mut spawns = VecDeque::new();

    // The main thread is already in the set; its fiber runs eagerly to its
    // first scheduling point (through the whole setup phase, if pinned).
    pool.add(main);
    tick(&mut pool, ThreadId::INITIAL, &mut execution, &mut spawns);
    drain_spawns(&mut pool, &mut execution, &mut spawns);

    let mut trace: Trace = Vec::new();
    let mut prior: Option<(ThreadId, ThreadAction)> = None;

    let failure = loop {
        if execution.main_terminated() {
            break None;
        }

        if execution.pinned {
            // The setup phase blocked before handing over.
            break Some(block_failure(&execution));
        }

        let runnable = execution.runnable();
        if runnable.is_empty() {
            break Some(block_failure(&execution));
        }

        let chosen = match sched.schedule(prior.as_ref().map(|(t, a)| (*t, a)), &runnable) {
            Some(tid) => tid,
            None => break Some(Failure::Abort),
        };

        if !runnable.contains_key(&chosen) {
            break Some(Failure::InternalError);
        }

        let prev = prior.as_ref().map(|(t, _)| *t);
        let decision = decision_of(prev, chosen);
        let alternatives = runnable
            .keys()
            .filter(|&&t| t != chosen)
            .map(|&t| decision_of(prev, t))
            .collect();

        let action = if chosen.is_commit() {
            execution.commit(chosen)
        } else {
            execution.threads.set_active(chosen);
            tick(&mut pool, chosen, &mut execution, &mut spawns);
            let action = execution
                .threads
                .get_mut(chosen)
                .performed
                .take()
                .expect("[weft internal bug] scheduled thread performed no action");
            drain_spawns(&mut pool, &mut execution, &mut spawns);
            action
        };

        if prev != Some(chosen) {
            trace!(thread = %chosen, "switch");
        }

        trace.push(Step {
            decision,
            alternatives,
            action: action.clone(),
        });
        prior = Some((chosen, action));
    };

    // Cancel fibers still suspended (threads abandoned when the main thread
    // returned, or blocked at the end). The execution context stays
    // installed, pinned, so destructors that touch model state remain
    // defined while the fiber stacks unwind.
    execution.pinned = true;
    let live_children = execution
        .threads
        .iter()
        .any(|t| t.id != ThreadId::INITIAL && !t.is_terminated());
    {
        let state = RefCell::new(unsafe {
            transmute_lt(State {
                execution: &mut execution,
                spawns: &mut spawns,
            })
        });
        STATE.set(&state, move || drop(pool));
    }

    RunOutcome {
        failure,
        trace,
        store: execution.store,
        live_children,
    }
}

fn block_failure(execution: &Execution) -> Failure {
    match &execution.threads.main().state {
        thread::State::Blocked(BlockedOn::Stm(_)) => Failure::StmDeadlock,
        _ => Failure::Deadlock,
    }
}

/// Catch a panic from a thread body. Generator cancellation unwinds are
/// re-raised so fiber teardown is not mistaken for a panic.
pub(crate) fn guard<R>(f: impl FnOnce() -> R) -> Result<R, ()> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(v) => Ok(v),
        Err(payload) => {
            if payload.is::<generator::Error>() {
                panic::resume_unwind(payload);
            }
            Err(())
        }
    }
}

/// Register the next operation of the active thread and park until the
/// scheduler picks it. A no-op during the pinned setup phase.
fn branch(lookahead: Lookahead) {
    if execution(|e| e.pinned) {
        return;
    }
    execution(|e| e.threads.active_mut().pending = Some(lookahead));
    Pool::switch();
}

/// Record what the active thread just did, unless pinned (pinned steps are
/// not part of the schedule).
fn finish(e: &mut Execution, action: ThreadAction) {
    if !e.pinned {
        e.threads.active_mut().performed = Some(action);
    }
}

/// Record a blocking attempt and park until woken. The pending lookahead
/// is (re)set so a woken thread re-attempts the same operation; a thread
/// that blocks during the pinned phase gets its lookahead here, since it
/// never passed a branch.
fn block_here(action: ThreadAction, on: BlockedOn) {
    execution(|e| {
        let active = e.threads.active_mut();
        active.pending = Some(action.lookahead());
        active.performed = Some(action);
        active.set_blocked(on);
    });
    Pool::switch();
}

/// End the explored part never having started: flip the setup phase off.
pub(crate) fn unpin() {
    execution(|e| e.pinned = false);
}

/// The active thread is done; it will never run again.
pub(crate) fn thread_done() {
    execution(|e| {
        let active = e.threads.active_mut();
        active.pending = None;
        active.set_terminated();
        trace!(thread = %active.id, "done");
    });
}

/// The main thread is done. If any other thread is still alive, its
/// termination is a real scheduling step: abandoning live threads is
/// dependent with anything they could still have done, and exploring their
/// progress ahead of this point is how their races surface at all. A main
/// thread that is alone terminates silently.
pub(crate) fn main_done() {
    let others_alive = execution(|e| {
        !e.pinned
            && e.threads
                .iter()
                .any(|t| t.id != ThreadId::INITIAL && !t.is_terminated())
    });

    if others_alive {
        branch(Lookahead::Stop);
        execution(|e| finish(e, ThreadAction::Stop));
    }

    thread_done();
}

/// Create a new thread running `f`.
pub(crate) fn spawn(f: Box<dyn FnOnce()>) -> ThreadId {
    if !execution(|e| e.pinned) {
        branch(Lookahead::Fork);
    }

    with_state(|state| {
        let tid = state.execution.threads.new_thread();
        trace!(thread = %tid, "spawn");

        let body: Box<dyn FnOnce()> = Box::new(move || {
            let _ = guard(f);
            thread_done();
        });
        state.spawns.push_back(Spawn { tid, f: body });

        finish(state.execution, ThreadAction::Fork(tid));
        tid
    })
}

/// Cede the processor without blocking.
pub(crate) fn yield_now() {
    if execution(|e| e.pinned) {
        return;
    }
    branch(Lookahead::Yield);
    execution(|e| finish(e, ThreadAction::Yield));
}

pub(crate) fn new_cref(value: Box<dyn AnyClone>) -> CRefId {
    branch(Lookahead::NewCRef);
    execution(|e| {
        let id = e.store.new_cref(value);
        finish(e, ThreadAction::NewCRef(id));
        id
    })
}

pub(crate) fn read_cref(id: CRefId) -> Box<dyn AnyClone> {
    branch(Lookahead::ReadCRef(id));
    execution(|e| {
        let tid = e.threads.active_id();
        let value = match e.buffers.latest(tid, id) {
            Some(buffered) => buffered.clone_box(),
            None => e.store.cref(id).clone_box(),
        };
        finish(e, ThreadAction::ReadCRef(id));
        value
    })
}

pub(crate) fn write_cref(id: CRefId, value: Box<dyn AnyClone>) {
    branch(Lookahead::WriteCRef(id));
    execution(|e| {
        if e.pinned || e.memtype == MemType::SequentialConsistency {
            e.store.set_cref(id, value);
        } else {
            let tid = e.threads.active_id();
            e.buffers.push(e.memtype, tid, id, value);
        }
        finish(e, ThreadAction::WriteCRef(id));
    })
}

pub(crate) fn modify_cref(
    id: CRefId,
    f: impl FnOnce(&dyn AnyClone) -> Box<dyn AnyClone>,
) -> Box<dyn AnyClone> {
    branch(Lookahead::ModifyCRef(id));
    execution(|e| {
        e.write_barrier();
        let old = e.store.cref(id).clone_box();
        let new = f(&*old);
        e.store.set_cref(id, new);
        finish(e, ThreadAction::ModifyCRef(id));
        old
    })
}

pub(crate) fn new_mvar() -> MVarId {
    branch(Lookahead::NewMVar);
    execution(|e| {
        let id = e.store.new_mvar();
        finish(e, ThreadAction::NewMVar(id));
        id
    })
}

pub(crate) fn put_mvar(id: MVarId, value: Box<dyn AnyClone>) {
    branch(Lookahead::PutMVar(id));
    let mut value = Some(value);
    loop {
        let stored = execution(|e| {
            match e.store.put_mvar(id, value.take().expect("[weft internal bug] value lost")) {
                None => {
                    let woken = e.threads.wake_takers(id);
                    finish(e, ThreadAction::PutMVar(id, woken));
                    true
                }
                Some(v) => {
                    value = Some(v);
                    false
                }
            }
        });
        if stored {
            return;
        }
        block_here(ThreadAction::BlockedPutMVar(id), BlockedOn::Put(id));
    }
}

pub(crate) fn take_mvar(id: MVarId) -> Box<dyn AnyClone> {
    branch(Lookahead::TakeMVar(id));
    loop {
        let taken = execution(|e| match e.store.take_mvar(id) {
            Some(v) => {
                let woken = e.threads.wake_putters(id);
                finish(e, ThreadAction::TakeMVar(id, woken));
                Some(v)
            }
            None => None,
        });
        if let Some(v) = taken {
            return v;
        }
        block_here(ThreadAction::BlockedTakeMVar(id), BlockedOn::Take(id));
    }
}

/// Announce a transaction as the next operation.
pub(crate) fn stm_branch() {
    branch(Lookahead::Stm);
}

pub(crate) fn stm_new_tvar(value: Box<dyn AnyClone>) -> TVarId {
    execution(|e| e.store.new_tvar(value))
}

pub(crate) fn stm_read_tvar(id: TVarId) -> Box<dyn AnyClone> {
    execution(|e| e.store.tvar(id).clone_box())
}

/// Commit a transaction: apply its writes and wake retriers watching any
/// written TVar.
pub(crate) fn stm_commit(writes: BTreeMap<TVarId, Box<dyn AnyClone>>, touched: BTreeSet<TVarId>) {
    execution(|e| {
        let written: BTreeSet<TVarId> = writes.keys().copied().collect();
        for (id, value) in writes {
            e.store.set_tvar(id, value);
        }
        let woken = e.threads.wake_stm(&written);
        finish(e, ThreadAction::Stm(touched.into_iter().collect(), woken));
    })
}

/// Block a retried transaction on the TVars it read.
pub(crate) fn stm_retry(reads: BTreeSet<TVarId>) {
    let action = ThreadAction::BlockedStm(reads.iter().copied().collect());
    block_here(action, BlockedOn::Stm(reads));
}
