//! Incremental bound functions and their backtrack augmentations.
//!
//! A bound key is threaded through one execution and advanced per step; a
//! candidate step is admitted only if every enabled bound accepts the
//! advanced key. When a bound prunes schedules it can hide interleavings
//! the unbounded exploration would reach, so each bound also augments the
//! backtrack points recorded for later exploration.

use crate::sct::dpor::BacktrackStep;
use crate::settings::{Bounds, MemType};
use crate::trace::{Decision, Lookahead, ThreadAction, ThreadId};

use std::collections::BTreeMap;

/// The accumulator checked after each step: preemptions so far (and the
/// last non-commit thread), yields per scheduled thread, and the step
/// count.
#[derive(Debug, Clone, Default)]
pub(crate) struct BoundKey {
    preemptions: usize,
    last_user: Option<ThreadId>,
    yields: BTreeMap<ThreadId, usize>,
    length: usize,
}

impl BoundKey {
    /// The key after scheduling `tid` (resolved from `decision`) whose next
    /// operation is `lookahead`, given the previous step. `prior_runnable`
    /// says whether the previously scheduled thread could still run:
    /// switching away from a finished thread is not a preemption.
    pub(crate) fn advance(
        mut self,
        prior: Option<(ThreadId, &ThreadAction)>,
        prior_runnable: bool,
        decision: Decision,
        tid: ThreadId,
        lookahead: Lookahead,
    ) -> BoundKey {
        self.length += 1;

        // A forked thread counts for fairness from the moment it exists,
        // scheduled or not: a spinner's yield count is measured against it.
        if let Some((_, ThreadAction::Fork(child))) = prior {
            self.yields.entry(*child).or_insert(0);
        }

        if !tid.is_commit() {
            match decision {
                Decision::Start(_) | Decision::Continue => self.last_user = Some(tid),
                Decision::SwitchTo(_) => {
                    let free = match (self.last_user, prior) {
                        // Leaving a commit thread back to where we came from.
                        (Some(last), _) if last == tid => true,
                        // Leaving a commit thread somewhere else.
                        (_, Some((prev, _))) if prev.is_commit() => false,
                        // The previous thread cannot continue; something
                        // else has to run.
                        _ if !prior_runnable => true,
                        // An ordinary switch is free only away from a thread
                        // that blocked or yielded.
                        (_, Some((_, action))) => {
                            action.is_block() || *action == ThreadAction::Yield
                        }
                        _ => true,
                    };
                    if !free {
                        self.preemptions += 1;
                    }
                    self.last_user = Some(tid);
                }
            }

            let count = self.yields.entry(tid).or_insert(0);
            if lookahead.will_yield() {
                *count += 1;
            }
        }

        self
    }

    pub(crate) fn preemptions(&self) -> usize {
        self.preemptions
    }
}

/// Whether every enabled bound accepts the key.
pub(crate) fn within(bounds: &Bounds, key: &BoundKey) -> bool {
    if let Some(pb) = bounds.preemption {
        if key.preemptions > pb {
            return false;
        }
    }

    if let Some(fb) = bounds.fair {
        if !key.yields.is_empty() {
            let max = key.yields.values().max().copied().unwrap_or(0);
            let min = key.yields.values().min().copied().unwrap_or(0);
            if max - min > fb {
                return false;
            }
        }
    }

    if let Some(lb) = bounds.length {
        if key.length > lb {
            return false;
        }
    }

    true
}

/// The incremental bound function: advance and check in one call. `None`
/// rejects the step.
pub(crate) fn step(
    bounds: &Bounds,
    key: Option<&BoundKey>,
    prior: Option<(ThreadId, &ThreadAction)>,
    prior_runnable: bool,
    decision: Decision,
    tid: ThreadId,
    lookahead: Lookahead,
) -> Option<BoundKey> {
    let next = key
        .cloned()
        .unwrap_or_default()
        .advance(prior, prior_runnable, decision, tid, lookahead);
    if within(bounds, &next) {
        Some(next)
    } else {
        None
    }
}

/// Merge backtrack points into the steps, using the first enabled bound's
/// augmentation (preemption, then fair, then length).
pub(crate) fn backtrack(bounds: &Bounds, steps: &mut [BacktrackStep], points: &[(usize, ThreadId)]) {
    if let Some(pb) = bounds.preemption {
        pbacktrack(pb, steps, points);
    } else if bounds.fair.is_some() {
        fbacktrack(steps, points);
    } else {
        let plain: Vec<_> = points.iter().map(|&(i, tid)| (i, false, tid)).collect();
        backtrack_at(&|_, _| false, None, steps, &plain);
    }
}

/// Preemption augmentation: each primary point also adds a conservative
/// point at the most recent prior transition whose immediate predecessor
/// ran a different thread, where neither frame is a commit. Points at steps
/// already at the preemption bound are dropped.
fn pbacktrack(pb: usize, steps: &mut [BacktrackStep], points: &[(usize, ThreadId)]) {
    let mut expanded = Vec::with_capacity(points.len() * 2);
    for &(i, tid) in points {
        expanded.push((i, false, tid));
        if let Some(j) = conservative_point(steps, i) {
            expanded.push((j, true, tid));
        }
    }
    backtrack_at(&|_, _| false, Some(pb), steps, &expanded);
}

fn conservative_point(steps: &[BacktrackStep], from: usize) -> Option<usize> {
    let mut j = from;
    while j > 1 {
        j -= 1;
        if steps[j - 1].tid != steps[j].tid
            && !steps[j].action.is_commit()
            && !steps[j - 1].action.is_commit()
        {
            return Some(j);
        }
    }
    None
}

/// Fair augmentation: a point whose thread would perform a release widens
/// to every thread runnable at that step, so fairness cannot hide
/// starvation behind the bound.
fn fbacktrack(steps: &mut [BacktrackStep], points: &[(usize, ThreadId)]) {
    let releases = |tid: ThreadId, step: &BacktrackStep| {
        step.runnable.get(&tid).map_or(false, |l| l.will_release())
    };
    let plain: Vec<_> = points.iter().map(|&(i, tid)| (i, false, tid)).collect();
    backtrack_at(&releases, None, steps, &plain);
}

/// Add each point to its step's backtrack set. A thread that is not
/// runnable at the step, or for which `to_all` holds, widens to every
/// runnable thread there. A primary point overrides a conservative one.
fn backtrack_at(
    to_all: &dyn Fn(ThreadId, &BacktrackStep) -> bool,
    preemption_cap: Option<usize>,
    steps: &mut [BacktrackStep],
    points: &[(usize, bool, ThreadId)],
) {
    for &(i, conservative, tid) in points {
        if let Some(cap) = preemption_cap {
            if steps[i].preemptions >= cap {
                continue;
            }
        }

        let step = &mut steps[i];
        if step.runnable.contains_key(&tid) && !to_all(tid, step) {
            step.backtracks
                .entry(tid)
                .and_modify(|c| *c &= conservative)
                .or_insert(conservative);
        } else {
            let everyone: Vec<ThreadId> = step.runnable.keys().copied().collect();
            for u in everyone {
                step.backtracks
                    .entry(u)
                    .and_modify(|c| *c &= conservative)
                    .or_insert(conservative);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::CRefId;

    fn t(n: usize) -> ThreadId {
        ThreadId::from_index(n)
    }

    #[test]
    fn switching_from_a_live_thread_is_a_preemption() {
        let fork = ThreadAction::Fork(t(1));
        let mut key = BoundKey::default();
        key = key.advance(None, false, Decision::Start(t(0)), t(0), Lookahead::Fork);
        key = key.advance(
            Some((t(0), &fork)),
            true,
            Decision::SwitchTo(t(1)),
            t(1),
            Lookahead::NewCRef,
        );
        assert_eq!(key.preemptions(), 1);
    }

    #[test]
    fn switching_away_from_a_yield_is_free() {
        let yielded = ThreadAction::Yield;
        let mut key = BoundKey::default();
        key = key.advance(None, false, Decision::Start(t(0)), t(0), Lookahead::Yield);
        key = key.advance(
            Some((t(0), &yielded)),
            true,
            Decision::SwitchTo(t(1)),
            t(1),
            Lookahead::NewCRef,
        );
        assert_eq!(key.preemptions(), 0);
    }

    #[test]
    fn switching_away_from_a_finished_thread_is_free() {
        let read = ThreadAction::ReadCRef(CRefId(0));
        let mut key = BoundKey::default();
        key = key.advance(None, false, Decision::Start(t(0)), t(0), Lookahead::ReadCRef(CRefId(0)));
        key = key.advance(
            Some((t(0), &read)),
            false,
            Decision::SwitchTo(t(1)),
            t(1),
            Lookahead::NewCRef,
        );
        assert_eq!(key.preemptions(), 0);
    }

    #[test]
    fn commit_round_trip_to_the_same_thread_is_free() {
        let commit = ThreadId::commit(-1);
        let write = ThreadAction::WriteCRef(CRefId(0));
        let committed = ThreadAction::CommitCRef(t(0), CRefId(0));

        let mut key = BoundKey::default();
        key = key.advance(None, false, Decision::Start(t(0)), t(0), Lookahead::WriteCRef(CRefId(0)));
        key = key.advance(
            Some((t(0), &write)),
            true,
            Decision::SwitchTo(commit),
            commit,
            Lookahead::CommitCRef(t(0), CRefId(0)),
        );
        key = key.advance(
            Some((commit, &committed)),
            false,
            Decision::SwitchTo(t(0)),
            t(0),
            Lookahead::ReadCRef(CRefId(0)),
        );
        assert_eq!(key.preemptions(), 0);
    }

    #[test]
    fn leaving_a_commit_thread_elsewhere_costs_one() {
        let commit = ThreadId::commit(-1);
        let write = ThreadAction::WriteCRef(CRefId(0));
        let committed = ThreadAction::CommitCRef(t(0), CRefId(0));

        let mut key = BoundKey::default();
        key = key.advance(None, false, Decision::Start(t(0)), t(0), Lookahead::WriteCRef(CRefId(0)));
        key = key.advance(
            Some((t(0), &write)),
            true,
            Decision::SwitchTo(commit),
            commit,
            Lookahead::CommitCRef(t(0), CRefId(0)),
        );
        key = key.advance(
            Some((commit, &committed)),
            false,
            Decision::SwitchTo(t(1)),
            t(1),
            Lookahead::NewCRef,
        );
        assert_eq!(key.preemptions(), 1);
    }

    #[test]
    fn fair_bound_measures_the_yield_spread() {
        let bounds = Bounds {
            preemption: None,
            fair: Some(1),
            length: None,
        };
        let yielded = ThreadAction::Yield;

        let mut key = BoundKey::default();
        key = key.advance(None, false, Decision::Start(t(0)), t(0), Lookahead::Yield);
        key = key.advance(
            Some((t(0), &yielded)),
            true,
            Decision::Continue,
            t(0),
            Lookahead::Yield,
        );
        assert!(within(&bounds, &key));

        // A second thread that has never yielded stretches the spread.
        let stretched = key.advance(
            Some((t(0), &yielded)),
            true,
            Decision::SwitchTo(t(1)),
            t(1),
            Lookahead::NewCRef,
        );
        assert!(!within(&bounds, &stretched));
    }

    #[test]
    fn forked_threads_count_for_fairness_before_they_run() {
        let bounds = Bounds {
            preemption: None,
            fair: Some(1),
            length: None,
        };
        let fork = ThreadAction::Fork(t(1));
        let yielded = ThreadAction::Yield;

        let mut key = BoundKey::default();
        key = key.advance(None, false, Decision::Start(t(0)), t(0), Lookahead::Fork);
        key = key.advance(
            Some((t(0), &fork)),
            true,
            Decision::Continue,
            t(0),
            Lookahead::Yield,
        );
        assert!(within(&bounds, &key));

        // A second yield leaves the forked (never scheduled) thread two
        // behind.
        key = key.advance(
            Some((t(0), &yielded)),
            true,
            Decision::Continue,
            t(0),
            Lookahead::Yield,
        );
        assert!(!within(&bounds, &key));
    }

    #[test]
    fn length_bound_counts_every_step() {
        let bounds = Bounds {
            preemption: None,
            fair: None,
            length: Some(2),
        };
        let mut key = BoundKey::default();
        key = key.advance(None, false, Decision::Start(t(0)), t(0), Lookahead::NewCRef);
        assert!(within(&bounds, &key));
        key = key.advance(None, true, Decision::Continue, t(0), Lookahead::NewCRef);
        assert!(within(&bounds, &key));
        key = key.advance(None, true, Decision::Continue, t(0), Lookahead::NewCRef);
        assert!(!within(&bounds, &key));
    }
}
