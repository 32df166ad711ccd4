//! Wakes request handlers once the log index they submitted to is applied.

use std::collections::BTreeMap;
use std::mem;

use futures::channel::oneshot::{self, Receiver, Sender};

use crate::kvraft::command::DedupKey;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Get(Option<String>),
    PutAppend,
}

/// What the apply loop produced at a log index, and for which command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedResult {
    pub dedup_key: DedupKey,
    pub outcome: Outcome,
}

/// The receiver yields `None` when the index was covered by an installed
/// snapshot instead of being applied here.
pub type Waiter = Receiver<Option<AppliedResult>>;

#[derive(Debug)]
pub enum Wait {
    /// The index was already applied and its result is still recorded.
    Ready(AppliedResult),
    /// The index was already applied but its result is gone.
    Passed,
    Pending(Waiter),
}

#[derive(Default)]
pub struct WaitTable {
    slots: BTreeMap<u64, Vec<Sender<Option<AppliedResult>>>>,
    results: BTreeMap<u64, AppliedResult>,
}

impl WaitTable {
    pub fn new() -> WaitTable {
        WaitTable::default()
    }

    /// Registers interest in `index`. `applied` is the highest index the
    /// apply loop has processed so far.
    pub fn wait(&mut self, index: u64, applied: u64) -> Wait {
        if let Some(result) = self.results.get(&index) {
            return Wait::Ready(result.clone());
        }
        if index <= applied {
            return Wait::Passed;
        }
        let (tx, rx) = oneshot::channel();
        self.slots.entry(index).or_default().push(tx);
        Wait::Pending(rx)
    }

    /// Records the result at `index`, replacing any older one, and wakes every
    /// waiter of that index.
    pub fn signal(&mut self, index: u64, result: AppliedResult) {
        if let Some(waiters) = self.slots.remove(&index) {
            for tx in waiters {
                let _ = tx.send(Some(result.clone()));
            }
        }
        self.results.insert(index, result);
    }

    /// Wakes waiters at or below `index` without a result.
    pub fn release_upto(&mut self, index: u64) {
        let above = self.slots.split_off(&(index + 1));
        for (_, waiters) in mem::replace(&mut self.slots, above) {
            for tx in waiters {
                let _ = tx.send(None);
            }
        }
    }

    /// Drops the waiters of `index` that stopped listening.
    pub fn forget(&mut self, index: u64) {
        if let Some(waiters) = self.slots.get_mut(&index) {
            waiters.retain(|tx| !tx.is_canceled());
            if waiters.is_empty() {
                self.slots.remove(&index);
            }
        }
    }

    /// Keeps only the results of the last `retention` applied indices.
    pub fn prune(&mut self, applied: u64, retention: u64) {
        let floor = applied.saturating_sub(retention);
        self.results = self.results.split_off(&(floor + 1));
    }

    /// Drops every waiter; their receivers observe cancellation.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.results.clear();
    }

    pub fn pending(&self) -> usize {
        self.slots.values().map(Vec::len).sum()
    }

    pub fn recorded(&self) -> usize {
        self.results.len()
    }
}
