//! Software transactional memory, at scheduling granularity.
//!
//! A whole transaction is a single step of the schedule: the explorer never
//! interleaves inside one. A transaction that [`retry`]s blocks its thread
//! until another transaction writes one of the TVars it read, then runs
//! again from the top.

use crate::rt::{self, AnyClone};
use crate::trace::TVarId;

use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;

/// A transactional variable.
///
/// Created inside a transaction with [`Tx::new_tvar`]; read and written
/// only inside transactions.
pub struct TVar<T> {
    id: TVarId,
    _p: PhantomData<fn(T) -> T>,
}

impl<T> Clone for TVar<T> {
    fn clone(&self) -> TVar<T> {
        *self
    }
}

impl<T> Copy for TVar<T> {}

impl<T> std::fmt::Debug for TVar<T> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_tuple("TVar").field(&self.id).finish()
    }
}

/// The marker returned by [`retry`].
#[derive(Debug, Clone, Copy)]
pub struct Retry;

/// What a transaction body returns: a value, or a retry.
pub type StmResult<T> = Result<T, Retry>;

/// Abandon the current attempt and block until a read TVar changes.
pub fn retry<T>() -> StmResult<T> {
    Err(Retry)
}

/// One attempt of a transaction: the log of reads, writes, and created
/// TVars.
#[derive(Default)]
pub struct Tx {
    reads: BTreeSet<TVarId>,
    writes: BTreeMap<TVarId, Box<dyn AnyClone>>,
    created: BTreeSet<TVarId>,
}

impl std::fmt::Debug for Tx {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("Tx")
            .field("reads", &self.reads)
            .field("writes", &self.writes.keys())
            .field("created", &self.created)
            .finish()
    }
}

impl Tx {
    /// Create a TVar holding `value`.
    pub fn new_tvar<T: Clone + Send + 'static>(&mut self, value: T) -> TVar<T> {
        let id = rt::stm_new_tvar(Box::new(value));
        self.created.insert(id);
        TVar {
            id,
            _p: PhantomData,
        }
    }

    /// Read a TVar, seeing this transaction's own earlier writes.
    pub fn read<T: Clone + Send + 'static>(&mut self, tvar: &TVar<T>) -> T {
        self.reads.insert(tvar.id);
        match self.writes.get(&tvar.id) {
            Some(pending) => rt::clone_value(&**pending),
            None => rt::take_value(rt::stm_read_tvar(tvar.id)),
        }
    }

    /// Write a TVar. The write is applied only if the transaction commits.
    pub fn write<T: Clone + Send + 'static>(&mut self, tvar: &TVar<T>, value: T) {
        self.writes.insert(tvar.id, Box::new(value));
    }
}

/// Run a transaction to completion, blocking through retries.
///
/// The body may run several times (once per wake-up after a retry), so it
/// must be free of side effects outside the transaction log.
pub fn atomically<T>(body: impl Fn(&mut Tx) -> StmResult<T>) -> T {
    rt::stm_branch();
    loop {
        let mut tx = Tx::default();
        match body(&mut tx) {
            Ok(value) => {
                let mut touched = tx.reads;
                touched.extend(tx.created.iter().copied());
                touched.extend(tx.writes.keys().copied());
                rt::stm_commit(tx.writes, touched);
                return value;
            }
            Err(Retry) => rt::stm_retry(tx.reads),
        }
    }
}
