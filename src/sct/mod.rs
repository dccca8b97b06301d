//! The exploration driver and the user-facing entry points.
//!
//! [`Results`] is a lazy sequence of executions: each call to `next()`
//! runs the model as many times as it takes to produce one reportable
//! `(result, trace)` pair, folding every execution into the exploration
//! state as it goes. Dropping the iterator early stops the exploration;
//! collecting it exhausts the schedule space (or the random budget).

pub(crate) mod bounds;
pub(crate) mod dpor;

use crate::model::{Model, Snapshot};
use crate::sched::{Scheduler, UniformSched, WeightedSched};
use crate::settings::{Bounds, Discard, DiscardFn, MemType, PrintFn, Settings, ShowFn, Way};
use crate::trace::{Failure, ThreadId, Trace};

use self::dpor::{find_backtrack_steps, Dpor, DporSched};

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::hash::Hash;

use rand::rngs::StdRng;
use rand::SeedableRng;

use tracing::debug;

/// Explore a model, reporting every distinct execution.
///
/// The returned [`Results`] yields one `(result, trace)` pair per reported
/// execution, lazily: schedules are only explored as the iterator is
/// driven.
pub fn run_sct<T, P>(way: Way, memtype: MemType, program: P) -> Results<T>
where
    P: Model<T> + 'static,
    T: Send + 'static,
{
    run_sct_with_settings(Settings::new(way, memtype), program)
}

/// [`run_sct`] with a discard function applied to every execution before it
/// is reported.
pub fn run_sct_discard<T, P>(
    discard: impl Fn(&Result<T, Failure>) -> Option<Discard> + 'static,
    way: Way,
    memtype: MemType,
    program: P,
) -> Results<T>
where
    P: Model<T> + 'static,
    T: Send + 'static,
{
    let mut settings = Settings::new(way, memtype);
    settings.set_discard(discard);
    run_sct_with_settings(settings, program)
}

/// The set of distinct results a model can produce: [`run_sct`] with traces
/// dropped and results deduplicated.
pub fn results_set<T, P>(way: Way, memtype: MemType, program: P) -> HashSet<Result<T, Failure>>
where
    P: Model<T> + 'static,
    T: Eq + Hash + Send + 'static,
{
    run_sct_discard(|_| Some(Discard::Trace), way, memtype, program)
        .map(|(result, _)| result)
        .collect()
}

/// Systematic exploration under the given bounds.
pub fn sct_bound<T, P>(memtype: MemType, bounds: Bounds, program: P) -> Results<T>
where
    P: Model<T> + 'static,
    T: Send + 'static,
{
    run_sct(Way::Systematic(bounds), memtype, program)
}

/// Uniform random exploration: exactly `executions` runs.
pub fn sct_uniform_random<T, P>(
    memtype: MemType,
    seed: u64,
    executions: usize,
    program: P,
) -> Results<T>
where
    P: Model<T> + 'static,
    T: Send + 'static,
{
    run_sct(Way::uniform(seed, executions), memtype, program)
}

/// Weighted (swarm) random exploration: exactly `executions` runs,
/// redrawing thread weights every `reuse` runs.
pub fn sct_weighted_random<T, P>(
    memtype: MemType,
    seed: u64,
    executions: usize,
    reuse: usize,
    program: P,
) -> Results<T>
where
    P: Model<T> + 'static,
    T: Send + 'static,
{
    run_sct(Way::weighted(seed, executions, reuse), memtype, program)
}

/// The primitive form: explore under a full [`Settings`] record.
pub fn run_sct_with_settings<T, P>(settings: Settings<T>, program: P) -> Results<T>
where
    P: Model<T> + 'static,
    T: Send + 'static,
{
    let program: Box<dyn Model<T>> = Box::new(program);
    let memtype = settings.memtype();
    let debug_print = settings.debug_print().cloned();

    let snapshot = if program.can_snapshot() {
        let snapshot = program.snapshot(memtype);
        if snapshot.is_none() {
            debug_out(
                &debug_print,
                "snapshot capture failed; replaying the setup prefix each execution",
            );
        }
        snapshot
    } else {
        None
    };

    let threads = snapshot
        .as_ref()
        .map(|s| s.threads())
        .unwrap_or_else(|| vec![ThreadId::INITIAL]);

    let strategy = match settings.way().clone() {
        Way::Systematic(bounds) => Strategy::Systematic {
            dpor: Dpor::new(memtype, &threads, bounds.length != Some(0)),
            bounds,
        },
        Way::Uniform { seed, executions } => Strategy::Uniform {
            rng: StdRng::seed_from_u64(seed),
            remaining: executions,
        },
        Way::Weighted {
            seed,
            executions,
            reuse,
        } => Strategy::Weighted {
            rng: StdRng::seed_from_u64(seed),
            remaining: executions,
            reuse,
            uses: 0,
            weights: BTreeMap::new(),
        },
    };

    Results {
        program,
        snapshot,
        memtype,
        discard: settings.discard().cloned(),
        debug_show: settings.debug_show().cloned(),
        debug_print,
        strategy,
        done: false,
    }
}

/// The lazy sequence of reported executions.
pub struct Results<T> {
    program: Box<dyn Model<T>>,
    snapshot: Option<Snapshot<T>>,
    memtype: MemType,
    discard: Option<DiscardFn<T>>,
    debug_show: Option<ShowFn<T>>,
    debug_print: Option<PrintFn>,
    strategy: Strategy,
    done: bool,
}

enum Strategy {
    Systematic {
        dpor: Dpor,
        bounds: Bounds,
    },
    Uniform {
        rng: StdRng,
        remaining: usize,
    },
    Weighted {
        rng: StdRng,
        remaining: usize,
        reuse: usize,
        uses: usize,
        weights: BTreeMap<ThreadId, u32>,
    },
}

impl<T: Send + 'static> Results<T> {
    fn execute(
        program: &dyn Model<T>,
        snapshot: &Option<Snapshot<T>>,
        sched: &mut dyn Scheduler,
        memtype: MemType,
    ) -> (Result<T, Failure>, Trace) {
        match snapshot {
            Some(snapshot) => snapshot.run(sched, memtype),
            None => program.run(sched, memtype),
        }
    }
}

impl<T: Send + 'static> Iterator for Results<T> {
    type Item = (Result<T, Failure>, Trace);

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let (result, trace) = match &mut self.strategy {
                Strategy::Systematic { dpor, bounds } => {
                    let (prefix, conservative, sleep) = match dpor.find_schedule_prefix() {
                        Some(found) => found,
                        None => {
                            self.done = true;
                            return None;
                        }
                    };

                    let mut sched = DporSched::new(prefix, sleep, *bounds, self.memtype);
                    let (result, trace) = Results::execute(
                        &*self.program,
                        &self.snapshot,
                        &mut sched,
                        self.memtype,
                    );

                    dpor.incorporate_trace(conservative, &trace);
                    if trace.is_empty() {
                        // No scheduling points: the model has exactly one
                        // behaviour.
                        self.done = true;
                    }

                    if sched.ignore {
                        continue;
                    }

                    let steps = find_backtrack_steps(
                        self.memtype,
                        bounds,
                        sched.bound_kill,
                        &sched.bpoints,
                        &trace,
                    );
                    dpor.incorporate_backtrack_steps(&steps);

                    (result, trace)
                }

                Strategy::Uniform { rng, remaining } => {
                    if *remaining == 0 {
                        self.done = true;
                        return None;
                    }
                    *remaining -= 1;

                    let mut sched = UniformSched::new(rng);
                    Results::execute(&*self.program, &self.snapshot, &mut sched, self.memtype)
                }

                Strategy::Weighted {
                    rng,
                    remaining,
                    reuse,
                    uses,
                    weights,
                } => {
                    if *remaining == 0 {
                        self.done = true;
                        return None;
                    }
                    *remaining -= 1;

                    let outcome = {
                        let mut sched = WeightedSched::new(rng, weights);
                        Results::execute(&*self.program, &self.snapshot, &mut sched, self.memtype)
                    };

                    *uses += 1;
                    if *uses >= *reuse {
                        weights.clear();
                        *uses = 0;
                    }

                    outcome
                }
            };

            match self.discard.as_ref().and_then(|d| d(&result)) {
                Some(Discard::ResultAndTrace) => {
                    let shown = self
                        .debug_show
                        .as_ref()
                        .map(|show| show(&result))
                        .unwrap_or_else(|| String::from("_"));
                    debug_out(&self.debug_print, &format!("discarded result: {}", shown));
                }
                Some(Discard::Trace) => return Some((result, Vec::new())),
                None => return Some((result, trace)),
            }
        }

        None
    }
}

impl<T> fmt::Debug for Results<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strategy = match &self.strategy {
            Strategy::Systematic { .. } => "systematic",
            Strategy::Uniform { .. } => "uniform",
            Strategy::Weighted { .. } => "weighted",
        };
        fmt.debug_struct("Results")
            .field("memtype", &self.memtype)
            .field("strategy", &strategy)
            .field("done", &self.done)
            .finish()
    }
}

fn debug_out(print: &Option<PrintFn>, message: &str) {
    match print {
        Some(print) => print(message),
        None => debug!("{}", message),
    }
}
