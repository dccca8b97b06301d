#![allow(deprecated)]

//! Coroutine fibers backing the model threads.
//!
//! Every model thread runs on a `generator` coroutine, all multiplexed on
//! the caller's OS thread. A fiber is created parked; loading it with a
//! closure and resuming runs that closure until it parks at a scheduling
//! point ([`Pool::switch`]) or returns. Fibers still suspended when an
//! execution ends are cancelled.

use generator::{Generator, Gn};

use std::fmt;

const STACK_SIZE: usize = 2 << 20;

type Fiber = Generator<'static, Option<Box<dyn FnOnce()>>, ()>;

/// The fibers of one execution, indexed by user thread index.
pub(crate) struct Pool {
    fibers: Vec<Fiber>,
}

impl Pool {
    pub(crate) fn new() -> Pool {
        Pool { fibers: Vec::new() }
    }

    /// Create the fiber for the next thread index and load it with `f`.
    /// The closure does not run yet; the first [`Pool::resume`] runs it.
    pub(crate) fn add(&mut self, f: Box<dyn FnOnce()>) -> usize {
        let mut fiber = spawn_fiber();
        fiber.set_para(Some(f));
        fiber.resume();

        self.fibers.push(fiber);
        self.fibers.len() - 1
    }

    /// Run the fiber until it parks at its next scheduling point, blocks,
    /// or its closure returns.
    pub(crate) fn resume(&mut self, index: usize) {
        self.fibers[index].resume();
    }

    /// Park the calling fiber; control returns to whoever resumed it.
    pub(crate) fn switch() {
        generator::yield_with(());
    }
}

fn spawn_fiber() -> Fiber {
    let mut g = Gn::new_opt(STACK_SIZE, move || {
        loop {
            let f: Option<Box<dyn FnOnce()>> = generator::yield_(()).unwrap();
            generator::yield_with(());
            f.unwrap()();
        }
    });
    // Park at the first `yield_`, ready to receive a closure.
    g.resume();
    g
}

impl fmt::Debug for Pool {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Pool").field("fibers", &self.fibers.len()).finish()
    }
}
