//! Store buffers for the relaxed memory models.
//!
//! Under `TotalStoreOrder` every thread owns one FIFO buffer; under
//! `PartialStoreOrder` every (thread, reference) pair owns one. A non-empty
//! buffer manifests as a runnable *commit thread* whose only possible step
//! is to move the buffer's oldest write to memory. Commit threads get
//! identifiers below [`ThreadId::INITIAL`], from a descending counter.

use crate::rt::object::AnyClone;
use crate::settings::MemType;
use crate::trace::{CRefId, Lookahead, ThreadId};

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Debug)]
struct BufKey {
    tid: ThreadId,
    cref: Option<CRefId>,
}

struct BufEntry {
    cref: CRefId,
    value: Box<dyn AnyClone>,
}

pub(crate) struct Buffers {
    bufs: BTreeMap<BufKey, VecDeque<BufEntry>>,
    commit_ids: BTreeMap<BufKey, ThreadId>,
    by_commit_id: BTreeMap<ThreadId, BufKey>,
    next_commit: i32,
}

impl Buffers {
    pub(crate) fn new() -> Buffers {
        Buffers {
            bufs: BTreeMap::new(),
            commit_ids: BTreeMap::new(),
            by_commit_id: BTreeMap::new(),
            next_commit: -1,
        }
    }

    fn key(memtype: MemType, tid: ThreadId, cref: CRefId) -> BufKey {
        match memtype {
            MemType::TotalStoreOrder => BufKey { tid, cref: None },
            MemType::PartialStoreOrder => BufKey { tid, cref: Some(cref) },
            MemType::SequentialConsistency => {
                panic!("[weft internal bug] no store buffers under sequential consistency")
            }
        }
    }

    /// Append a write to the owning buffer, allocating a commit thread for
    /// the buffer on first use.
    pub(crate) fn push(
        &mut self,
        memtype: MemType,
        tid: ThreadId,
        cref: CRefId,
        value: Box<dyn AnyClone>,
    ) {
        let key = Buffers::key(memtype, tid, cref);

        if !self.commit_ids.contains_key(&key) {
            let commit = ThreadId::commit(self.next_commit);
            self.next_commit -= 1;
            self.commit_ids.insert(key, commit);
            self.by_commit_id.insert(commit, key);
        }

        self.bufs
            .entry(key)
            .or_insert_with(VecDeque::new)
            .push_back(BufEntry { cref, value });
    }

    /// The newest buffered value this thread holds for `cref`, if any.
    /// Reads consult this before memory: a thread always sees its own
    /// writes.
    pub(crate) fn latest(&self, tid: ThreadId, cref: CRefId) -> Option<&dyn AnyClone> {
        self.bufs
            .iter()
            .filter(|(key, _)| key.tid == tid)
            .flat_map(|(_, buf)| buf.iter())
            .filter(|entry| entry.cref == cref)
            .last()
            .map(|entry| &*entry.value)
    }

    /// The pending commit steps: one per non-empty buffer, as
    /// `(commit thread, lookahead)`.
    pub(crate) fn commits(&self) -> impl Iterator<Item = (ThreadId, Lookahead)> + '_ {
        self.bufs.iter().filter(|(_, buf)| !buf.is_empty()).map(move |(key, buf)| {
            let commit = self.commit_ids[key];
            let front = buf.front().expect("[weft internal bug] empty buffer listed");
            (commit, Lookahead::CommitCRef(key.tid, front.cref))
        })
    }

    /// Perform the commit step of the given commit thread: pop the oldest
    /// write of its buffer. Returns the writer thread, the reference, and
    /// the value to store.
    pub(crate) fn commit(&mut self, commit: ThreadId) -> (ThreadId, CRefId, Box<dyn AnyClone>) {
        let key = *self
            .by_commit_id
            .get(&commit)
            .expect("[weft internal bug] unknown commit thread");
        let buf = self.bufs.get_mut(&key).expect("[weft internal bug] commit without buffer");
        let entry = buf.pop_front().expect("[weft internal bug] commit of empty buffer");
        (key.tid, entry.cref, entry.value)
    }

    /// Drain every buffer in key order, oldest write first: the full write
    /// barrier performed by synchronised operations.
    pub(crate) fn drain_all(&mut self) -> Vec<(CRefId, Box<dyn AnyClone>)> {
        let mut drained = Vec::new();
        for buf in self.bufs.values_mut() {
            while let Some(entry) = buf.pop_front() {
                drained.push((entry.cref, entry.value));
            }
        }
        drained
    }
}

impl fmt::Debug for Buffers {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Buffers")
            .field("buffered", &self.bufs.values().map(|b| b.len()).sum::<usize>())
            .field("next_commit", &self.next_commit)
            .finish()
    }
}
