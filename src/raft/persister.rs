//! Durable storage shared by the consensus log and the k/v snapshots.

use std::sync::{Arc, Mutex};

pub trait Persister: Send + Sync + 'static {
    fn raft_state(&self) -> Vec<u8>;
    fn save_raft_state(&self, state: Vec<u8>);
    fn snapshot(&self) -> Vec<u8>;
    fn save_snapshot(&self, snapshot: Vec<u8>);

    /// Size in bytes of the persisted log, used to decide when to compact.
    fn raft_state_size(&self) -> usize {
        self.raft_state().len()
    }
}

impl<T: ?Sized + Persister> Persister for Box<T> {
    fn raft_state(&self) -> Vec<u8> {
        (**self).raft_state()
    }
    fn save_raft_state(&self, state: Vec<u8>) {
        (**self).save_raft_state(state)
    }
    fn snapshot(&self) -> Vec<u8> {
        (**self).snapshot()
    }
    fn save_snapshot(&self, snapshot: Vec<u8>) {
        (**self).save_snapshot(snapshot)
    }
    fn raft_state_size(&self) -> usize {
        (**self).raft_state_size()
    }
}

impl<T: ?Sized + Persister> Persister for Arc<T> {
    fn raft_state(&self) -> Vec<u8> {
        (**self).raft_state()
    }
    fn save_raft_state(&self, state: Vec<u8>) {
        (**self).save_raft_state(state)
    }
    fn snapshot(&self) -> Vec<u8> {
        (**self).snapshot()
    }
    fn save_snapshot(&self, snapshot: Vec<u8>) {
        (**self).save_snapshot(snapshot)
    }
    fn raft_state_size(&self) -> usize {
        (**self).raft_state_size()
    }
}

/// Keeps the log and the snapshot in memory.
#[derive(Default)]
pub struct SimplePersister {
    states: Mutex<(
        Vec<u8>, // raft state
        Vec<u8>, // snapshot
    )>,
}

impl SimplePersister {
    pub fn new() -> SimplePersister {
        SimplePersister::default()
    }
}

impl Persister for SimplePersister {
    fn raft_state(&self) -> Vec<u8> {
        self.states.lock().unwrap().0.clone()
    }

    fn save_raft_state(&self, state: Vec<u8>) {
        self.states.lock().unwrap().0 = state;
    }

    fn snapshot(&self) -> Vec<u8> {
        self.states.lock().unwrap().1.clone()
    }

    fn save_snapshot(&self, snapshot: Vec<u8>) {
        self.states.lock().unwrap().1 = snapshot;
    }

    fn raft_state_size(&self) -> usize {
        self.states.lock().unwrap().0.len()
    }
}
