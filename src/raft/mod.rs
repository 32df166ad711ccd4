//! The contract between the k/v service and the consensus module it runs on.
//!
//! Leader election, replication and commit tracking are implemented elsewhere;
//! the service only submits commands, probes leadership and consumes the
//! committed feed.

pub mod errors;
pub mod persister;

use self::errors::Result;

/// As each Raft peer becomes aware that successive log entries are committed,
/// the peer should send an `ApplyMsg` to the service on the same server, via
/// the `apply_ch` handed to the service, in commit order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyMsg {
    Command {
        data: Vec<u8>,
        index: u64,
    },
    /// The consensus module installed a snapshot received from the leader. The
    /// snapshot is already saved in the persister.
    Snapshot {
        term: u64,
        index: u64,
    },
}

/// State of a raft peer.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct State {
    pub term: u64,
    pub is_leader: bool,
}

impl State {
    /// The current term of this peer.
    pub fn term(&self) -> u64 {
        self.term
    }

    /// Whether this peer believes it is the leader.
    pub fn is_leader(&self) -> bool {
        self.is_leader
    }
}

pub trait Consensus: Send + Sync + 'static {
    /// Starts agreement on the next command to be appended to the log. If
    /// this server isn't the leader, returns [`errors::Error::NotLeader`].
    /// There is no guarantee that the command will ever be committed.
    ///
    /// Returns the index the command will appear at if it's ever committed,
    /// and the current term. Must not block on the log.
    fn start(&self, command: &[u8]) -> Result<(u64, u64)>;

    fn get_state(&self) -> State;

    /// The term of the entry at `index`, if the log still holds it.
    fn term_at(&self, index: u64) -> Option<u64>;

    /// The service has a snapshot covering everything up to and including
    /// `index`; the log no longer needs those entries.
    fn truncate_log(&self, index: u64);

    fn kill(&self);
}
