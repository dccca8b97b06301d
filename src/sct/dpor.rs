//! Dynamic partial-order reduction: the exploration tree, the dependency
//! relation, trace folding, backtrack computation, and the schedule-prefix
//! driven scheduler.
//!
//! The tree is an arena: nodes live in a growable vector and edges are
//! `ThreadId -> child index` maps. Each node describes the state of the
//! exploration after a particular prefix of decisions: which threads were
//! runnable, which decisions have been explored (`done`/`taken`), which
//! still must be (`todo`, with a conservative marker), and which are known
//! redundant (`sleep`).

use crate::sched::Scheduler;
use crate::sct::bounds::{self, BoundKey};
use crate::settings::{Bounds, MemType};
use crate::trace::{
    decision_of, tid_of, CRefId, Lookahead, MVarId, Step, TVarId, ThreadAction, ThreadId, Trace,
};

use std::collections::{BTreeMap, BTreeSet, VecDeque};

#[derive(Debug)]
struct Node {
    /// Threads runnable when this node was reached.
    runnable: BTreeSet<ThreadId>,
    /// Decisions yet to explore from here; `true` marks a conservative
    /// point added by a bound.
    todo: BTreeMap<ThreadId, bool>,
    /// Explored children.
    done: BTreeMap<ThreadId, usize>,
    /// Threads asleep here: scheduling them reaches an explored
    /// equivalence class.
    sleep: BTreeMap<ThreadId, ThreadAction>,
    /// The action each explored child performed from here. Conservative
    /// branches are not recorded, so they never justify sleeping.
    taken: BTreeMap<ThreadId, ThreadAction>,
}

impl Node {
    fn new(runnable: BTreeSet<ThreadId>) -> Node {
        Node {
            runnable,
            todo: BTreeMap::new(),
            done: BTreeMap::new(),
            sleep: BTreeMap::new(),
            taken: BTreeMap::new(),
        }
    }
}

/// The exploration tree.
#[derive(Debug)]
pub(crate) struct Dpor {
    nodes: Vec<Node>,
    memtype: MemType,
}

impl Dpor {
    /// A fresh tree over the given initial runnable set. With `explorable`
    /// unset (a zero length bound) the tree starts exhausted.
    pub(crate) fn new(memtype: MemType, threads: &[ThreadId], explorable: bool) -> Dpor {
        let mut root = Node::new(threads.iter().copied().collect());
        if explorable {
            root.todo.insert(ThreadId::INITIAL, false);
        }
        Dpor {
            nodes: vec![root],
            memtype,
        }
    }

    /// The leftmost-deepest schedule prefix ending in an unexplored
    /// decision, with its conservative marker and the sleep set to start
    /// from. `None` once the tree is exhausted.
    pub(crate) fn find_schedule_prefix(
        &self,
    ) -> Option<(Vec<ThreadId>, bool, BTreeMap<ThreadId, ThreadAction>)> {
        self.prefix_from(0).map(|(mut prefix, conservative, sleep)| {
            prefix.reverse();
            (prefix, conservative, sleep)
        })
    }

    fn prefix_from(
        &self,
        node: usize,
    ) -> Option<(Vec<ThreadId>, bool, BTreeMap<ThreadId, ThreadAction>)> {
        for (&tid, &child) in &self.nodes[node].done {
            if let Some((mut prefix, conservative, sleep)) = self.prefix_from(child) {
                prefix.push(tid);
                return Some((prefix, conservative, sleep));
            }
        }

        let n = &self.nodes[node];
        let (&tid, &conservative) = n.todo.iter().next()?;
        let mut sleep = n.sleep.clone();
        sleep.extend(n.taken.iter().map(|(t, a)| (*t, a.clone())));
        sleep.remove(&tid);
        Some((vec![tid], conservative, sleep))
    }

    /// Fold an executed trace into the tree: walk the known part, then
    /// graft the new suffix as a fresh chain, threading sleep sets along.
    pub(crate) fn incorporate_trace(&mut self, conservative: bool, trace: &Trace) {
        let mut node = 0;
        let mut prev = ThreadId::INITIAL;

        for (i, step) in trace.iter().enumerate() {
            let tid = tid_of(prev, step.decision);

            if let Some(&child) = self.nodes[node].done.get(&tid) {
                node = child;
                prev = tid;
                continue;
            }

            // First divergence: this is the to-do point the prefix ended
            // in. Consume it and graft the rest of the trace.
            self.nodes[node].todo.remove(&tid);
            let mut sleep = self.nodes[node].sleep.clone();
            sleep.extend(self.nodes[node].taken.iter().map(|(t, a)| (*t, a.clone())));
            self.graft(node, conservative, prev, sleep, &trace[i..]);
            return;
        }
    }

    fn graft(
        &mut self,
        mut parent: usize,
        conservative: bool,
        mut prev: ThreadId,
        mut sleep: BTreeMap<ThreadId, ThreadAction>,
        suffix: &[Step],
    ) {
        let mut first = true;
        for step in suffix {
            let tid = tid_of(prev, step.decision);

            // A sleeper stays asleep only while the execution is
            // independent of it.
            sleep.remove(&tid);
            let memtype = self.memtype;
            sleep.retain(|_, action| !dependent(memtype, &step.action, action));

            let runnable: BTreeSet<ThreadId> = step
                .alternatives
                .iter()
                .map(|&d| tid_of(prev, d))
                .chain(Some(tid))
                .collect();

            let child = self.nodes.len();
            self.nodes.push(Node {
                runnable,
                todo: BTreeMap::new(),
                done: BTreeMap::new(),
                sleep: sleep.clone(),
                taken: BTreeMap::new(),
            });

            let node = &mut self.nodes[parent];
            node.done.insert(tid, child);
            if !(first && conservative) {
                node.taken.insert(tid, step.action.clone());
            }

            parent = child;
            prev = tid;
            first = false;
        }
    }

    /// Merge computed backtrack points into the to-do sets along the trace
    /// just incorporated, honouring the sleep-set discipline.
    pub(crate) fn incorporate_backtrack_steps(&mut self, steps: &[BacktrackStep]) {
        let mut node = 0;
        for step in steps {
            {
                let n = &mut self.nodes[node];
                for (&tid, &conservative) in &step.backtracks {
                    if !n.done.contains_key(&tid) && !n.sleep.contains_key(&tid) {
                        n.todo.entry(tid).or_insert(conservative);
                    }
                }
            }

            node = match self.nodes[node].done.get(&step.tid) {
                Some(&child) => child,
                None => return,
            };
        }
    }
}

/// One analysed step of a trace, with the backtrack points registered at
/// it.
#[derive(Debug)]
pub(crate) struct BacktrackStep {
    /// The thread that ran.
    pub(crate) tid: ThreadId,
    /// What it did.
    pub(crate) action: ThreadAction,
    /// Everything runnable at this point, with lookaheads.
    pub(crate) runnable: BTreeMap<ThreadId, Lookahead>,
    /// Preemptions accumulated before this step.
    pub(crate) preemptions: usize,
    /// Threads to explore from this point; `true` marks conservative.
    pub(crate) backtracks: BTreeMap<ThreadId, bool>,
}

/// Analyse a trace for races: for every step and every thread enabled
/// there, find the most recent earlier step of a different thread whose
/// action is dependent with what the enabled thread would do, and register
/// a backtrack point via the bound's augmentation.
///
/// With `bound_kill` set the final step was cut short by the bounds, and
/// contributes no points of its own.
pub(crate) fn find_backtrack_steps(
    memtype: MemType,
    bounds: &Bounds,
    bound_kill: bool,
    bpoints: &[BTreeMap<ThreadId, Lookahead>],
    trace: &Trace,
) -> Vec<BacktrackStep> {
    let count = bpoints.len().min(trace.len());
    let mut steps: Vec<BacktrackStep> = Vec::with_capacity(count);
    let mut all_threads: BTreeSet<ThreadId> = BTreeSet::new();
    let mut prev: Option<(ThreadId, ThreadAction)> = None;
    let mut key = BoundKey::default();

    for i in 0..count {
        let step = &trace[i];
        let runnable = &bpoints[i];
        let tid = tid_of(prev.as_ref().map_or(ThreadId::INITIAL, |(t, _)| *t), step.decision);

        steps.push(BacktrackStep {
            tid,
            action: step.action.clone(),
            runnable: runnable.clone(),
            preemptions: key.preemptions(),
            backtracks: BTreeMap::new(),
        });
        all_threads.extend(runnable.keys().copied());

        let kills_early = bound_kill && i == count - 1;
        if !kills_early {
            let mut points: Vec<(usize, ThreadId)> = Vec::new();
            for (&u, &lookahead) in runnable {
                for &v in &all_threads {
                    if u == v {
                        continue;
                    }
                    let race = steps
                        .iter()
                        .enumerate()
                        .rev()
                        .find(|(_, b)| {
                            b.tid == v && dependent_lookahead(memtype, &b.action, lookahead)
                        })
                        .map(|(j, _)| j);
                    if let Some(j) = race {
                        points.push((j, u));
                    }
                }
            }
            bounds::backtrack(bounds, &mut steps, &points);
        }

        let prior_runnable = prev
            .as_ref()
            .map_or(false, |(t, _)| runnable.contains_key(t));
        key = key.advance(
            prev.as_ref().map(|(t, a)| (*t, a)),
            prior_runnable,
            step.decision,
            tid,
            step.action.lookahead(),
        );
        prev = Some((tid, step.action.clone()));
    }

    steps
}

/// A simplified view of an action for the dependency relation.
enum Kind<'a> {
    Read(CRefId),
    Write(CRefId),
    Modify(CRefId),
    Commit(CRefId),
    MVar(MVarId),
    Stm(Option<&'a [TVarId]>),
    /// Main-thread termination: abandons every other thread, so it is
    /// dependent with everything.
    Halt,
    Inert,
}

fn kind_of_action(action: &ThreadAction) -> Kind<'_> {
    match action {
        ThreadAction::ReadCRef(r) => Kind::Read(*r),
        ThreadAction::WriteCRef(r) => Kind::Write(*r),
        ThreadAction::ModifyCRef(r) => Kind::Modify(*r),
        ThreadAction::CommitCRef(_, r) => Kind::Commit(*r),
        ThreadAction::PutMVar(m, _)
        | ThreadAction::BlockedPutMVar(m)
        | ThreadAction::TakeMVar(m, _)
        | ThreadAction::BlockedTakeMVar(m) => Kind::MVar(*m),
        ThreadAction::Stm(tvars, _) | ThreadAction::BlockedStm(tvars) => Kind::Stm(Some(tvars)),
        ThreadAction::Stop => Kind::Halt,
        _ => Kind::Inert,
    }
}

fn kind_of_lookahead(lookahead: Lookahead) -> Kind<'static> {
    match lookahead {
        Lookahead::ReadCRef(r) => Kind::Read(r),
        Lookahead::WriteCRef(r) => Kind::Write(r),
        Lookahead::ModifyCRef(r) => Kind::Modify(r),
        Lookahead::CommitCRef(_, r) => Kind::Commit(r),
        Lookahead::PutMVar(m) | Lookahead::TakeMVar(m) => Kind::MVar(m),
        Lookahead::Stm => Kind::Stm(None),
        Lookahead::Stop => Kind::Halt,
        _ => Kind::Inert,
    }
}

fn dependent_kinds(memtype: MemType, a: &Kind<'_>, b: &Kind<'_>) -> bool {
    use self::Kind::*;

    let sc = memtype == MemType::SequentialConsistency;
    match (a, b) {
        // Ending the execution conflicts with everything the abandoned
        // threads could still have done.
        (Halt, _) | (_, Halt) => true,

        // Unsynchronised writes only fill a buffer under TSO/PSO; the
        // racing step is the commit, not the write.
        (Read(r1), Write(r2)) | (Write(r1), Read(r2)) => r1 == r2 && sc,
        (Write(r1), Write(r2)) => r1 == r2 && sc,

        (Modify(r1), Read(r2))
        | (Read(r1), Modify(r2))
        | (Modify(r1), Write(r2))
        | (Write(r1), Modify(r2))
        | (Modify(r1), Modify(r2))
        | (Modify(r1), Commit(r2))
        | (Commit(r1), Modify(r2)) => r1 == r2,

        (Commit(r1), Read(r2))
        | (Read(r1), Commit(r2))
        | (Commit(r1), Write(r2))
        | (Write(r1), Commit(r2))
        | (Commit(r1), Commit(r2)) => r1 == r2,

        (MVar(m1), MVar(m2)) => m1 == m2,

        (Stm(x), Stm(y)) => match (x, y) {
            (Some(x), Some(y)) => x.iter().any(|t| y.contains(t)),
            // An unexecuted transaction has an unknown footprint.
            _ => true,
        },

        _ => false,
    }
}

/// Whether two executed actions are dependent: swapping them could change
/// the outcome.
pub(crate) fn dependent(memtype: MemType, a: &ThreadAction, b: &ThreadAction) -> bool {
    dependent_kinds(memtype, &kind_of_action(a), &kind_of_action(b))
}

/// Whether an executed action is dependent with what another thread is
/// about to do.
pub(crate) fn dependent_lookahead(
    memtype: MemType,
    action: &ThreadAction,
    lookahead: Lookahead,
) -> bool {
    dependent_kinds(
        memtype,
        &kind_of_action(action),
        &kind_of_lookahead(lookahead),
    )
}

/// The scheduler of systematic exploration: replays a schedule prefix,
/// then picks the lowest runnable thread that the bounds admit and the
/// sleep set does not veto.
#[derive(Debug)]
pub(crate) struct DporSched {
    prefix: VecDeque<ThreadId>,
    sleep: BTreeMap<ThreadId, ThreadAction>,
    bounds: Bounds,
    memtype: MemType,
    key: BoundKey,

    /// The runnable/lookahead map at every query, for backtrack analysis.
    pub(crate) bpoints: Vec<BTreeMap<ThreadId, Lookahead>>,
    /// The execution reached only explored equivalence classes (or the
    /// prefix failed to replay) and must be suppressed.
    pub(crate) ignore: bool,
    /// The bounds rejected every runnable thread.
    pub(crate) bound_kill: bool,
}

impl DporSched {
    pub(crate) fn new(
        prefix: Vec<ThreadId>,
        sleep: BTreeMap<ThreadId, ThreadAction>,
        bounds: Bounds,
        memtype: MemType,
    ) -> DporSched {
        DporSched {
            prefix: prefix.into(),
            sleep,
            bounds,
            memtype,
            key: BoundKey::default(),
            bpoints: Vec::new(),
            ignore: false,
            bound_kill: false,
        }
    }
}

impl Scheduler for DporSched {
    fn schedule(
        &mut self,
        prior: Option<(ThreadId, &ThreadAction)>,
        runnable: &BTreeMap<ThreadId, Lookahead>,
    ) -> Option<ThreadId> {
        self.bpoints.push(runnable.clone());

        let prev = prior.map(|(t, _)| t);
        let prior_runnable = prev.map_or(false, |p| runnable.contains_key(&p));

        if let Some(tid) = self.prefix.pop_front() {
            if !runnable.contains_key(&tid) {
                self.ignore = true;
                return None;
            }
            let decision = decision_of(prev, tid);
            self.key = self
                .key
                .clone()
                .advance(prior, prior_runnable, decision, tid, runnable[&tid]);
            return Some(tid);
        }

        // What just ran may have woken sleepers.
        if let Some((_, action)) = prior {
            let memtype = self.memtype;
            self.sleep.retain(|_, slept| !dependent(memtype, action, slept));
        }

        let mut any_within = false;
        for (&tid, &lookahead) in runnable {
            let decision = decision_of(prev, tid);
            let next = match bounds::step(
                &self.bounds,
                Some(&self.key),
                prior,
                prior_runnable,
                decision,
                tid,
                lookahead,
            ) {
                Some(key) => key,
                None => continue,
            };
            any_within = true;
            if self.sleep.contains_key(&tid) {
                continue;
            }
            self.key = next;
            return Some(tid);
        }

        if any_within {
            self.ignore = true;
        } else {
            self.bound_kill = true;
        }
        None
    }
}
