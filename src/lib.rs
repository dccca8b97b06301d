#![deny(missing_debug_implementations, missing_docs, rust_2018_idioms)]

//! Weft is a tool for testing concurrent programs by exploring their
//! schedules.
//!
//! A test builds a *model*: a deterministic program written against weft's
//! concurrency primitives ([`sync::CRef`], [`sync::MVar`], [`stm`],
//! [`thread::spawn`]). The explorer runs the model over and over, each time
//! under a different interleaving of its threads, and reports every
//! distinct outcome together with the exact schedule that produced it.
//!
//! Exhaustively enumerating interleavings explodes combinatorially, so the
//! systematic explorer uses *dynamic partial-order reduction*: two
//! executions that only reorder independent operations are equivalent, and
//! only one representative per equivalence class is run. On top of that,
//! *bounds* ([`Bounds`]) cut off schedules that are unlikely to reveal new
//! bugs (too many preemptions, too unfair a scheduler, too many steps),
//! while conservatively re-adding exploration points so that cheap bugs
//! are not hidden by the bound.
//!
//! # Example
//!
//! Two threads each increment a shared reference with a plain read and
//! write. The update can be lost, and the main thread may read before
//! either increment lands:
//!
//! ```no_run
//! use weft::sync::CRef;
//! use weft::{model, results_set, Bounds, MemType, Way};
//!
//! let outcomes = results_set(
//!     Way::systematic(Bounds::NONE),
//!     MemType::SequentialConsistency,
//!     model::basic(|| {
//!         let counter = CRef::new(0);
//!
//!         weft::thread::spawn(move || {
//!             let seen = counter.read();
//!             counter.write(seen + 1);
//!         });
//!         weft::thread::spawn(move || {
//!             let seen = counter.read();
//!             counter.write(seen + 1);
//!         });
//!
//!         counter.read()
//!     }),
//! );
//!
//! assert_eq!(
//!     outcomes,
//!     vec![Ok(0), Ok(1), Ok(2)].into_iter().collect()
//! );
//! ```
//!
//! # Memory models
//!
//! The executor simulates one of three memory models ([`MemType`]). Under
//! `TotalStoreOrder` and `PartialStoreOrder`, plain writes sit in a store
//! buffer until a phantom *commit thread* moves them to memory, so stale
//! reads and reordered commits are explored like any other scheduling
//! choice. `SequentialConsistency` makes every write immediately visible.
//!
//! # Random exploration
//!
//! For models too large to enumerate, [`Way::uniform`] runs a fixed number
//! of uniformly random schedules and [`Way::weighted`] runs a swarm of
//! fixed random scheduling policies. Both share the driver and report
//! results the same way, and a fixed seed reproduces the same sequence.

pub mod model;
pub mod sched;
mod sct;
pub mod settings;
pub mod stm;
pub mod sync;
pub mod thread;
pub mod trace;

mod rt;

pub use crate::model::{basic, with_setup};
pub use crate::sched::Scheduler;
pub use crate::sct::{
    results_set, run_sct, run_sct_discard, run_sct_with_settings, sct_bound, sct_uniform_random,
    sct_weighted_random, Results,
};
pub use crate::settings::{Bounds, Discard, MemType, Settings, Way};
pub use crate::trace::{Failure, ThreadId, Trace};
