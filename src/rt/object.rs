//! The per-execution store of shared-object values.
//!
//! Values are kept behind clonable `Any` boxes so the store as a whole can
//! be deep-copied, which is what backs snapshot capture.

use crate::trace::{CRefId, MVarId, TVarId};

use std::any::Any;
use std::fmt;

/// A value that can be stored, cloned, and recovered by downcast.
pub(crate) trait AnyClone: Any {
    fn clone_box(&self) -> Box<dyn AnyClone>;
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any + Clone> AnyClone for T {
    fn clone_box(&self) -> Box<dyn AnyClone> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl Clone for Box<dyn AnyClone> {
    fn clone(&self) -> Box<dyn AnyClone> {
        self.clone_box()
    }
}

/// Downcast a stored value to its concrete type and clone it out.
pub(crate) fn clone_value<T: Clone + 'static>(value: &dyn AnyClone) -> T {
    value
        .as_any()
        .downcast_ref::<T>()
        .expect("[weft internal bug] stored value has the wrong type")
        .clone()
}

/// Downcast an owned stored value to its concrete type.
pub(crate) fn take_value<T: 'static>(value: Box<dyn AnyClone>) -> T {
    *value
        .into_any()
        .downcast::<T>()
        .ok()
        .expect("[weft internal bug] stored value has the wrong type")
}

/// All shared objects created during one execution.
#[derive(Clone, Default)]
pub(crate) struct Store {
    crefs: Vec<Box<dyn AnyClone>>,
    mvars: Vec<Option<Box<dyn AnyClone>>>,
    tvars: Vec<Box<dyn AnyClone>>,
}

impl Store {
    pub(crate) fn new() -> Store {
        Store::default()
    }

    pub(crate) fn new_cref(&mut self, value: Box<dyn AnyClone>) -> CRefId {
        self.crefs.push(value);
        CRefId(self.crefs.len() - 1)
    }

    pub(crate) fn cref(&self, id: CRefId) -> &dyn AnyClone {
        &*self.crefs[id.0]
    }

    pub(crate) fn set_cref(&mut self, id: CRefId, value: Box<dyn AnyClone>) {
        self.crefs[id.0] = value;
    }

    pub(crate) fn new_mvar(&mut self) -> MVarId {
        self.mvars.push(None);
        MVarId(self.mvars.len() - 1)
    }

    /// Fill an MVar. If it was already full the value is handed back.
    pub(crate) fn put_mvar(
        &mut self,
        id: MVarId,
        value: Box<dyn AnyClone>,
    ) -> Option<Box<dyn AnyClone>> {
        let slot = &mut self.mvars[id.0];
        if slot.is_some() {
            return Some(value);
        }
        *slot = Some(value);
        None
    }

    /// Empty an MVar, returning its value if it was full.
    pub(crate) fn take_mvar(&mut self, id: MVarId) -> Option<Box<dyn AnyClone>> {
        self.mvars[id.0].take()
    }

    pub(crate) fn new_tvar(&mut self, value: Box<dyn AnyClone>) -> TVarId {
        self.tvars.push(value);
        TVarId(self.tvars.len() - 1)
    }

    pub(crate) fn tvar(&self, id: TVarId) -> &dyn AnyClone {
        &*self.tvars[id.0]
    }

    pub(crate) fn set_tvar(&mut self, id: TVarId, value: Box<dyn AnyClone>) {
        self.tvars[id.0] = value;
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Store")
            .field("crefs", &self.crefs.len())
            .field("mvars", &self.mvars.len())
            .field("tvars", &self.tvars.len())
            .finish()
    }
}
