//! Exploration configuration: ways, bounds, memory models, discard
//! functions, and the [`Settings`] record tying them together.

use crate::trace::Failure;

use std::fmt;
use std::sync::Arc;

/// How to explore the schedules of a model.
#[derive(Debug, Clone)]
pub enum Way {
    /// Systematically enumerate schedules with dynamic partial-order
    /// reduction, restricted by the given bounds.
    Systematic(Bounds),
    /// Run a fixed number of executions, choosing uniformly among runnable
    /// threads at every step.
    Uniform {
        /// Seed for the random generator.
        seed: u64,
        /// How many executions to run.
        executions: usize,
    },
    /// Run a fixed number of executions with per-thread random weights,
    /// redrawing the weights every `reuse` executions (a swarm of fixed
    /// scheduling policies).
    Weighted {
        /// Seed for the random generator.
        seed: u64,
        /// How many executions to run.
        executions: usize,
        /// How many executions share one set of weights.
        reuse: usize,
    },
}

impl Way {
    /// Systematic exploration under the given bounds.
    pub fn systematic(bounds: Bounds) -> Way {
        Way::Systematic(bounds)
    }

    /// Uniform random scheduling for `executions` runs.
    pub fn uniform(seed: u64, executions: usize) -> Way {
        Way::Uniform { seed, executions }
    }

    /// Weighted random scheduling for `executions` runs, redrawing weights
    /// every `reuse` runs.
    pub fn weighted(seed: u64, executions: usize, reuse: usize) -> Way {
        Way::Weighted {
            seed,
            executions,
            reuse,
        }
    }
}

impl Default for Way {
    fn default() -> Way {
        Way::Systematic(Bounds::default())
    }
}

/// Limits on how far a single execution may stray.
///
/// A disabled bound (`None`) never rejects a step. The defaults are small
/// on purpose: most concurrency bugs show up within a couple of
/// preemptions.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Bounds {
    /// Maximum number of preemptive context switches.
    pub preemption: Option<usize>,
    /// Maximum difference between any two threads' yield counts.
    pub fair: Option<usize>,
    /// Maximum number of steps in one execution.
    pub length: Option<usize>,
}

impl Bounds {
    /// No bounds at all: the unrestricted exploration.
    pub const NONE: Bounds = Bounds {
        preemption: None,
        fair: None,
        length: None,
    };
}

impl Default for Bounds {
    fn default() -> Bounds {
        Bounds {
            preemption: Some(2),
            fair: Some(5),
            length: Some(250),
        }
    }
}

/// The memory model the executor simulates.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum MemType {
    /// Writes are immediately visible to every thread.
    SequentialConsistency,
    /// Each thread buffers its writes in program order; a buffered write
    /// reaches memory at a later commit step.
    TotalStoreOrder,
    /// Each thread buffers its writes per reference; writes to different
    /// references may commit in either order.
    PartialStoreOrder,
}

impl Default for MemType {
    fn default() -> MemType {
        MemType::TotalStoreOrder
    }
}

/// What to drop from a reported execution.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Discard {
    /// Keep the result, drop the trace.
    Trace,
    /// Drop the whole execution.
    ResultAndTrace,
}

/// A predicate deciding what to discard from a result.
pub type DiscardFn<T> = Arc<dyn Fn(&Result<T, Failure>) -> Option<Discard>>;

/// A formatter for results, used when logging discarded executions.
pub type ShowFn<T> = Arc<dyn Fn(&Result<T, Failure>) -> String>;

/// A sink for debug output.
pub type PrintFn = Arc<dyn Fn(&str)>;

/// Everything an exploration needs to know, in one record.
///
/// Construct with [`Settings::new`], then adjust through the setters. The
/// accessors are deliberately plain getter/setter pairs, one per field.
pub struct Settings<T> {
    way: Way,
    memtype: MemType,
    discard: Option<DiscardFn<T>>,
    debug_show: Option<ShowFn<T>>,
    debug_print: Option<PrintFn>,
}

impl<T> Settings<T> {
    /// Settings for the given way and memory model, with nothing discarded
    /// and no debug output.
    pub fn new(way: Way, memtype: MemType) -> Settings<T> {
        Settings {
            way,
            memtype,
            discard: None,
            debug_show: None,
            debug_print: None,
        }
    }

    /// The configured way.
    pub fn way(&self) -> &Way {
        &self.way
    }

    /// Replace the way.
    pub fn set_way(&mut self, way: Way) -> &mut Self {
        self.way = way;
        self
    }

    /// The configured memory model.
    pub fn memtype(&self) -> MemType {
        self.memtype
    }

    /// Replace the memory model.
    pub fn set_memtype(&mut self, memtype: MemType) -> &mut Self {
        self.memtype = memtype;
        self
    }

    /// The configured discard function, if any.
    pub fn discard(&self) -> Option<&DiscardFn<T>> {
        self.discard.as_ref()
    }

    /// Replace the discard function.
    pub fn set_discard(
        &mut self,
        discard: impl Fn(&Result<T, Failure>) -> Option<Discard> + 'static,
    ) -> &mut Self {
        self.discard = Some(Arc::new(discard));
        self
    }

    /// The configured result formatter, if any.
    pub fn debug_show(&self) -> Option<&ShowFn<T>> {
        self.debug_show.as_ref()
    }

    /// Replace the result formatter used when logging discarded executions.
    pub fn set_debug_show(
        &mut self,
        show: impl Fn(&Result<T, Failure>) -> String + 'static,
    ) -> &mut Self {
        self.debug_show = Some(Arc::new(show));
        self
    }

    /// The configured debug sink, if any.
    pub fn debug_print(&self) -> Option<&PrintFn> {
        self.debug_print.as_ref()
    }

    /// Replace the debug sink. Without one, debug output goes to `tracing`.
    pub fn set_debug_print(&mut self, print: impl Fn(&str) + 'static) -> &mut Self {
        self.debug_print = Some(Arc::new(print));
        self
    }
}

impl<T> Default for Settings<T> {
    fn default() -> Settings<T> {
        Settings::new(Way::default(), MemType::default())
    }
}

impl<T> fmt::Debug for Settings<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Settings")
            .field("way", &self.way)
            .field("memtype", &self.memtype)
            .field("discard", &self.discard.as_ref().map(|_| ".."))
            .field("debug_show", &self.debug_show.as_ref().map(|_| ".."))
            .field("debug_print", &self.debug_print.as_ref().map(|_| ".."))
            .finish()
    }
}
