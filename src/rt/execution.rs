//! The state of one execution of a model.

use crate::rt::buffer::Buffers;
use crate::rt::object::Store;
use crate::rt::thread;
use crate::settings::MemType;
use crate::trace::{Lookahead, ThreadAction, ThreadId};

use std::collections::BTreeMap;

use tracing::trace;

#[derive(Debug)]
pub(crate) struct Execution {
    pub(crate) threads: thread::Set,
    pub(crate) store: Store,
    pub(crate) buffers: Buffers,
    pub(crate) memtype: MemType,

    /// While set, operations execute immediately with no scheduling point:
    /// the deterministic setup prefix of a two-phase program.
    pub(crate) pinned: bool,
}

impl Execution {
    pub(crate) fn new(memtype: MemType, store: Store, pinned: bool) -> Execution {
        Execution {
            threads: thread::Set::new(),
            store,
            buffers: Buffers::new(),
            memtype,
            pinned,
        }
    }

    /// Everything that can be scheduled right now: runnable user threads
    /// (with the operation each will perform) plus one commit thread per
    /// non-empty store buffer.
    pub(crate) fn runnable(&self) -> BTreeMap<ThreadId, Lookahead> {
        let mut runnable: BTreeMap<ThreadId, Lookahead> = self.buffers.commits().collect();

        for thread in self.threads.iter() {
            if thread.is_runnable() {
                let lookahead = thread
                    .pending
                    .expect("[weft internal bug] runnable thread with no pending operation");
                runnable.insert(thread.id, lookahead);
            }
        }

        runnable
    }

    /// Perform the step of a commit thread: move its buffer's oldest write
    /// to memory.
    pub(crate) fn commit(&mut self, commit: ThreadId) -> ThreadAction {
        let (writer, cref, value) = self.buffers.commit(commit);
        self.store.set_cref(cref, value);

        trace!(?writer, ?cref, "commit");

        ThreadAction::CommitCRef(writer, cref)
    }

    /// Commit every outstanding buffered write, in buffer order. The write
    /// barrier performed by synchronised operations.
    pub(crate) fn write_barrier(&mut self) {
        for (cref, value) in self.buffers.drain_all() {
            self.store.set_cref(cref, value);
        }
    }

    /// True once the main thread can never run again.
    pub(crate) fn main_terminated(&self) -> bool {
        self.threads.main().is_terminated()
    }
}
