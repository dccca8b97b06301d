//! Model programs: what the explorer executes.
//!
//! A model is a closure (or a setup/body pair) that the executor can run
//! any number of times, once per explored schedule. Models must be
//! deterministic: all nondeterminism must come from the scheduling of the
//! crate's own primitives.

use crate::rt::{self, Store};
use crate::sched::Scheduler;
use crate::settings::MemType;
use crate::trace::{Failure, Lookahead, ThreadAction, ThreadId, Trace};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

type Slot<T> = Arc<Mutex<Option<Result<T, Failure>>>>;

/// A program the executor can run under a schedule.
///
/// This is the capability the exploration driver consumes: one execution
/// per call, scheduled by `sched`, returning the result and the complete
/// trace. Implementations that support snapshot replay additionally expose
/// a captured [`Snapshot`].
pub trait Model<T> {
    /// Execute once under `sched` and the given memory model.
    fn run(&self, sched: &mut dyn Scheduler, memtype: MemType) -> (Result<T, Failure>, Trace);

    /// Whether [`snapshot`](Model::snapshot) can ever succeed.
    fn can_snapshot(&self) -> bool {
        false
    }

    /// Capture the state after the deterministic setup prefix, if the
    /// program has one and the prefix stays on the main thread.
    fn snapshot(&self, memtype: MemType) -> Option<Snapshot<T>> {
        let _ = memtype;
        None
    }
}

/// A one-phase model built from a closure. See [`basic`].
pub struct Basic<F> {
    f: Arc<F>,
}

/// A model from a single closure: the whole computation is explored.
pub fn basic<T, F>(f: F) -> Basic<F>
where
    F: Fn() -> T + Send + Sync + 'static,
    T: Send + 'static,
{
    Basic { f: Arc::new(f) }
}

impl<T, F> Model<T> for Basic<F>
where
    F: Fn() -> T + Send + Sync + 'static,
    T: Send + 'static,
{
    fn run(&self, sched: &mut dyn Scheduler, memtype: MemType) -> (Result<T, Failure>, Trace) {
        let slot: Slot<T> = Arc::new(Mutex::new(None));
        let f = self.f.clone();
        let finish = slot.clone();

        let main: Box<dyn FnOnce()> = Box::new(move || {
            let result = rt::guard(|| f());
            *finish.lock().unwrap() = Some(result.map_err(|()| Failure::UncaughtException));
            rt::main_done();
        });

        resolve(rt::run(memtype, Store::new(), false, sched, main), &slot)
    }
}

impl<F> fmt::Debug for Basic<F> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Basic").finish()
    }
}

/// A two-phase model. See [`with_setup`].
pub struct WithSetup<G, F> {
    setup: Arc<G>,
    body: Arc<F>,
}

/// A model with a deterministic setup prefix.
///
/// `setup` runs with no exploration: its operations apply immediately, and
/// any thread it forks runs to completion (or to a blocking point) inside
/// the prefix. When the prefix ends with no thread of its own still alive,
/// the driver captures the shared state once and replays every execution
/// from the capture, skipping the prefix entirely; otherwise the prefix is
/// re-run, still unexplored, at the start of every execution.
pub fn with_setup<S, T, G, F>(setup: G, body: F) -> WithSetup<G, F>
where
    G: Fn() -> S + Send + Sync + 'static,
    F: Fn(&S) -> T + Send + Sync + 'static,
    S: Send + 'static,
    T: Send + 'static,
{
    WithSetup {
        setup: Arc::new(setup),
        body: Arc::new(body),
    }
}

impl<S, T, G, F> Model<T> for WithSetup<G, F>
where
    G: Fn() -> S + Send + Sync + 'static,
    F: Fn(&S) -> T + Send + Sync + 'static,
    S: Send + 'static,
    T: Send + 'static,
{
    fn run(&self, sched: &mut dyn Scheduler, memtype: MemType) -> (Result<T, Failure>, Trace) {
        let slot: Slot<T> = Arc::new(Mutex::new(None));
        let setup = self.setup.clone();
        let body = self.body.clone();
        let finish = slot.clone();

        let main: Box<dyn FnOnce()> = Box::new(move || {
            let result = rt::guard(|| {
                let seed = setup();
                rt::unpin();
                body(&seed)
            });
            *finish.lock().unwrap() = Some(result.map_err(|()| Failure::UncaughtException));
            rt::main_done();
        });

        resolve(rt::run(memtype, Store::new(), true, sched, main), &slot)
    }

    fn can_snapshot(&self) -> bool {
        true
    }

    fn snapshot(&self, memtype: MemType) -> Option<Snapshot<T>> {
        let setup = self.setup.clone();
        let stash: Arc<Mutex<Option<S>>> = Arc::new(Mutex::new(None));
        let captured = stash.clone();

        let main: Box<dyn FnOnce()> = Box::new(move || {
            if let Ok(seed) = rt::guard(|| setup()) {
                *captured.lock().unwrap() = Some(seed);
            }
            rt::main_done();
        });

        let outcome = rt::run(memtype, Store::new(), true, &mut Pinned, main);
        if outcome.failure.is_some() || outcome.live_children {
            return None;
        }
        let seed = Arc::new(stash.lock().unwrap().take()?);

        let body = self.body.clone();
        Some(Snapshot {
            store: outcome.store,
            body: Arc::new(move || body(&seed)),
        })
    }
}

impl<G, F> fmt::Debug for WithSetup<G, F> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("WithSetup").finish()
    }
}

/// The state of a model after its setup prefix: the shared-object store and
/// the explored body, ready to replay without re-running the prefix.
pub struct Snapshot<T> {
    store: Store,
    body: Arc<dyn Fn() -> T>,
}

impl<T: Send + 'static> Snapshot<T> {
    /// Execute the body once from the captured state.
    pub fn run(&self, sched: &mut dyn Scheduler, memtype: MemType) -> (Result<T, Failure>, Trace) {
        let slot: Slot<T> = Arc::new(Mutex::new(None));
        let body = self.body.clone();
        let finish = slot.clone();

        let main: Box<dyn FnOnce()> = Box::new(move || {
            let result = rt::guard(|| body());
            *finish.lock().unwrap() = Some(result.map_err(|()| Failure::UncaughtException));
            rt::main_done();
        });

        resolve(rt::run(memtype, self.store.clone(), false, sched, main), &slot)
    }

    /// The threads runnable at the capture point.
    pub fn threads(&self) -> Vec<ThreadId> {
        vec![ThreadId::INITIAL]
    }
}

impl<T> fmt::Debug for Snapshot<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Snapshot").field("store", &self.store).finish()
    }
}

/// Scheduler for the capture run. The prefix is pinned, so scheduling never
/// happens; declining is only a safety net.
struct Pinned;

impl Scheduler for Pinned {
    fn schedule(
        &mut self,
        _prior: Option<(ThreadId, &ThreadAction)>,
        _runnable: &BTreeMap<ThreadId, Lookahead>,
    ) -> Option<ThreadId> {
        None
    }
}

fn resolve<T>(outcome: rt::RunOutcome, slot: &Slot<T>) -> (Result<T, Failure>, Trace) {
    let result = match outcome.failure {
        Some(failure) => Err(failure),
        None => slot
            .lock()
            .unwrap()
            .take()
            .unwrap_or(Err(Failure::InternalError)),
    };
    (result, outcome.trace)
}
