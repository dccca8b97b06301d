//! The scheduler interface, and the random scheduling strategies.
//!
//! A scheduler is queried once per step with the previous step and the map
//! of runnable threads (each with the operation it is about to perform),
//! and answers with the thread to run next. Returning `None` aborts the
//! execution.

use crate::trace::{Lookahead, ThreadAction, ThreadId};

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::Rng;

/// Chooses which runnable thread performs the next step.
pub trait Scheduler {
    /// Choose a thread from `runnable`, or `None` to abort the execution.
    ///
    /// `prior` is the thread scheduled for the previous step and the action
    /// it performed; it is `None` for the first step of an execution.
    /// `runnable` is never empty and maps each runnable thread to the
    /// operation it will perform if chosen.
    fn schedule(
        &mut self,
        prior: Option<(ThreadId, &ThreadAction)>,
        runnable: &BTreeMap<ThreadId, Lookahead>,
    ) -> Option<ThreadId>;
}

/// Picks uniformly among the runnable threads at every step.
#[derive(Debug)]
pub struct UniformSched<'a> {
    rng: &'a mut StdRng,
}

impl<'a> UniformSched<'a> {
    /// A uniform scheduler drawing from the given generator.
    pub fn new(rng: &'a mut StdRng) -> UniformSched<'a> {
        UniformSched { rng }
    }
}

impl Scheduler for UniformSched<'_> {
    fn schedule(
        &mut self,
        _prior: Option<(ThreadId, &ThreadAction)>,
        runnable: &BTreeMap<ThreadId, Lookahead>,
    ) -> Option<ThreadId> {
        let choice = self.rng.gen_range(0..runnable.len());
        runnable.keys().nth(choice).copied()
    }
}

/// Picks threads with probability proportional to a per-thread weight.
///
/// A thread is assigned a weight in `[1, 50]` the first time it appears in
/// the runnable set. The weight map outlives a single execution, so one set
/// of weights steers several executions (one member of a swarm).
#[derive(Debug)]
pub struct WeightedSched<'a> {
    rng: &'a mut StdRng,
    weights: &'a mut BTreeMap<ThreadId, u32>,
}

impl<'a> WeightedSched<'a> {
    /// A weighted scheduler drawing from the given generator and weights.
    pub fn new(
        rng: &'a mut StdRng,
        weights: &'a mut BTreeMap<ThreadId, u32>,
    ) -> WeightedSched<'a> {
        WeightedSched { rng, weights }
    }
}

impl Scheduler for WeightedSched<'_> {
    fn schedule(
        &mut self,
        _prior: Option<(ThreadId, &ThreadAction)>,
        runnable: &BTreeMap<ThreadId, Lookahead>,
    ) -> Option<ThreadId> {
        for &tid in runnable.keys() {
            let rng = &mut *self.rng;
            self.weights
                .entry(tid)
                .or_insert_with(|| rng.gen_range(1..=50));
        }

        let total: u32 = runnable.keys().map(|tid| self.weights[tid]).sum();
        let mut roll = self.rng.gen_range(0..total);

        for &tid in runnable.keys() {
            let weight = self.weights[&tid];
            if roll < weight {
                return Some(tid);
            }
            roll -= weight;
        }

        unreachable!("[weft internal bug] weighted roll exceeded the total weight");
    }
}
