//! Thread operations for model programs.

use crate::rt;
use crate::trace::ThreadId;

/// Create a model thread running `f`.
///
/// Returns the new thread's identifier. There is no join: a model ends when
/// its main thread returns, and threads communicate through the shared
/// primitives.
pub fn spawn<F>(f: F) -> ThreadId
where
    F: FnOnce() + Send + 'static,
{
    rt::spawn(Box::new(f))
}

/// Cede the processor without blocking.
///
/// Yields are what the fair bound counts: a thread spinning on a condition
/// should yield each iteration, letting bounded exploration cut schedules
/// that starve the rest of the model.
pub fn yield_now() {
    rt::yield_now();
}
