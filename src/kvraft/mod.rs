//! The key/value service based on a raft log.
//!
//! ## general
//! `KvServer` owns the state shared by everything below: the `KvStore`, the
//! `WaitTable`, the snapshot position and the applied index, all behind one
//! lock.
//!
//! `Node::new` spawns the `ApplyLoop` worker, which receives `ApplyMsg` from
//! raft, applies them to the store in order, and wakes waiting requests.
//!
//! `Node` handles the rpc. A request is submitted to raft, then waits on the
//! `WaitTable` slot of its log index; if the result applied there belongs to
//! another command, the request is resubmitted. Writes are deduplicated by
//! `(client_id, seq)`, so a retried write takes effect once.
//!
//! ## snapshot
//! After each applied entry the `SnapshotManager` checks the persisted log
//! size against `maxraftstate`, saves a snapshot of the store and asks raft to
//! truncate its log. The same snapshot is loaded at startup and whenever raft
//! installs one from the leader.

mod apply;
pub mod command;
#[cfg(test)]
pub mod config;
pub mod errors;
pub mod notify;
pub mod options;
pub mod server;
pub mod snapshot;
pub mod state_machine;

pub use self::options::KvOptions;
pub use self::server::{KvServer, Node};
