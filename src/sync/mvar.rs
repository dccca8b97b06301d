//! Blocking single-slot channels.

use crate::rt;
use crate::trace::MVarId;

use std::marker::PhantomData;

/// A single-slot blocking channel, starting empty.
///
/// [`put`](MVar::put) blocks while the slot is full and wakes every blocked
/// taker; [`take`](MVar::take) blocks while the slot is empty and wakes
/// every blocked putter. Woken threads re-attempt their operation when next
/// scheduled, so wake-order races are visible to the explorer.
pub struct MVar<T> {
    id: MVarId,
    _p: PhantomData<fn(T) -> T>,
}

impl<T: Clone + Send + 'static> MVar<T> {
    /// Create an empty MVar.
    pub fn new() -> MVar<T> {
        MVar {
            id: rt::new_mvar(),
            _p: PhantomData,
        }
    }

    /// Fill the slot, blocking while it is full.
    pub fn put(&self, value: T) {
        rt::put_mvar(self.id, Box::new(value));
    }

    /// Empty the slot, blocking while it is empty.
    pub fn take(&self) -> T {
        rt::take_value(rt::take_mvar(self.id))
    }
}

impl<T: Clone + Send + 'static> Default for MVar<T> {
    fn default() -> MVar<T> {
        MVar::new()
    }
}

impl<T> Clone for MVar<T> {
    fn clone(&self) -> MVar<T> {
        *self
    }
}

impl<T> Copy for MVar<T> {}

impl<T> std::fmt::Debug for MVar<T> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_tuple("MVar").field(&self.id).finish()
    }
}
