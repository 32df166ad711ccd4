use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::future::{self, Either};
use futures_timer::Delay;

use crate::kvraft::apply::ApplyLoop;
use crate::kvraft::command::{Command, DedupKey};
use crate::kvraft::errors::{Error, Result};
use crate::kvraft::notify::{AppliedResult, Outcome, Wait, WaitTable};
use crate::kvraft::options::KvOptions;
use crate::kvraft::snapshot::{SnapshotManager, SnapshotMeta};
use crate::kvraft::state_machine::KvStore;
use crate::proto::kvraftpb::*;
use crate::raft::persister::Persister;
use crate::raft::{self, ApplyMsg, Consensus};

/// Everything guarded by the server lock.
pub(crate) struct KvState {
    pub(crate) store: KvStore,
    pub(crate) waiters: WaitTable,
    pub(crate) snapshot: SnapshotMeta,
    pub(crate) last_applied: u64,
}

pub struct KvServer {
    pub rf: Arc<dyn Consensus>,
    me: usize,
    name: String,
    pub(crate) options: KvOptions,
    pub(crate) snapshots: SnapshotManager,
    pub(crate) state: Mutex<KvState>,
}

impl KvServer {
    /// Builds a server on top of `rf`. State is restored from the snapshot
    /// held by `persister`.
    pub fn new(
        rf: Arc<dyn Consensus>,
        me: usize,
        persister: Arc<dyn Persister>,
        options: KvOptions,
    ) -> Result<KvServer> {
        let name = format!("[{}]", me);
        let snapshots = SnapshotManager::new(name.clone(), persister, options.maxraftstate);
        let (store, snapshot) = snapshots.restore()?;
        let state = KvState {
            store,
            waiters: WaitTable::new(),
            snapshot,
            last_applied: snapshot.last_included_index,
        };
        Ok(KvServer {
            rf,
            me,
            name,
            options,
            snapshots,
            state: Mutex::new(state),
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Clone)]
pub struct Node {
    server: Arc<KvServer>,
    cancel_ch: UnboundedSender<Option<ApplyMsg>>,
}

impl Node {
    /// Starts the apply worker of `kv`, fed by the committed entries of its
    /// consensus module.
    pub fn new(kv: KvServer, apply_ch: UnboundedReceiver<ApplyMsg>) -> Node {
        let server = Arc::new(kv);
        let (cancel_ch, cancel) = unbounded();
        ApplyLoop::new(server.clone()).spawn(apply_ch, cancel);
        Node { server, cancel_ch }
    }

    /// Stops the apply worker and the consensus module. Pending requests
    /// answer with `Status::Shutdown`.
    pub fn kill(&self) {
        let _ = self.cancel_ch.unbounded_send(None);
        self.server.state.lock().unwrap().waiters.clear();
        self.server.rf.kill();
        info!("{}: killed", self.server.name());
    }

    /// The current term of this peer.
    pub fn term(&self) -> u64 {
        self.get_state().term()
    }

    /// Whether this peer believes it is the leader.
    pub fn is_leader(&self) -> bool {
        self.get_state().is_leader()
    }

    pub fn get_state(&self) -> raft::State {
        self.server.rf.get_state()
    }

    pub fn me(&self) -> usize {
        self.server.me
    }

    /// The highest log index applied to the store.
    pub fn last_applied(&self) -> u64 {
        self.server.state.lock().unwrap().last_applied
    }

    /// The position of the last snapshot taken or installed.
    pub fn snapshot_meta(&self) -> SnapshotMeta {
        self.server.state.lock().unwrap().snapshot
    }

    #[cfg(test)]
    pub(crate) fn server(&self) -> &Arc<KvServer> {
        &self.server
    }

    async fn do_get(&self, args: GetRequest) -> Result<Option<String>> {
        match self.replicate(Command::from_get(args)).await? {
            Outcome::Get(value) => Ok(value),
            Outcome::PutAppend => Err(Error::MismatchedOutcome),
        }
    }

    async fn do_put_append(&self, args: PutAppendRequest) -> Result<()> {
        let command = Command::from_put_append(args)?;
        self.replicate(command).await.map(|_| ())
    }

    /// Drives `command` through the log until the result applied at its
    /// index belongs to it.
    async fn replicate(&self, command: Command) -> Result<Outcome> {
        let dedup_key = command.dedup_key().ok_or(Error::EmptyCommand)?;
        let data = command.encode()?;
        let mut attempts = 0;
        loop {
            if !self.server.rf.get_state().is_leader() {
                return Err(Error::WrongLeader);
            }
            if let Command::PutAppend { client_id, seq, .. } = &command {
                let state = self.server.state.lock().unwrap();
                if state.store.is_duplicate(*client_id, *seq) {
                    return Ok(Outcome::PutAppend);
                }
            }

            let (index, term) = self.server.rf.start(&data)?;
            let wait = {
                let mut state = self.server.state.lock().unwrap();
                let applied = state.last_applied;
                state.waiters.wait(index, applied)
            };
            debug!(
                "{}: {:?} started at {} (term {})",
                self.server.name(),
                dedup_key,
                index,
                term
            );
            if let Some(result) = self.wait_applied(index, term, wait).await? {
                if answers(&result, &dedup_key, &command) {
                    return Ok(result.outcome);
                }
            }

            attempts += 1;
            if let Some(max) = self.server.options.max_resubmits {
                if attempts > max {
                    return Err(Error::RetriesExhausted { attempts });
                }
            }
            debug!(
                "{}: index {} was taken by another command, resubmit {:?}",
                self.server.name(),
                index,
                dedup_key
            );
        }
    }

    /// Waits until `index` is applied, giving up once the deadline passes or
    /// this peer stops leading the term the command was submitted in.
    async fn wait_applied(
        &self,
        index: u64,
        term: u64,
        wait: Wait,
    ) -> Result<Option<AppliedResult>> {
        let mut rx = match wait {
            Wait::Ready(result) => return Ok(Some(result)),
            Wait::Passed => return Ok(None),
            Wait::Pending(rx) => rx,
        };
        let options = &self.server.options;
        let deadline = Instant::now() + options.commit_timeout;
        let result = loop {
            let tick = Delay::new(options.leadership_check_interval);
            match future::select(&mut rx, tick).await {
                Either::Left((applied, _)) => break applied.map_err(|_| Error::Shutdown),
                Either::Right(_) => {
                    let state = self.server.rf.get_state();
                    if state.term() > term || !state.is_leader() {
                        break Err(Error::WrongLeader);
                    }
                    if Instant::now() >= deadline {
                        break Err(Error::Timeout { index });
                    }
                }
            }
        };
        if result.is_err() {
            drop(rx);
            self.server.state.lock().unwrap().waiters.forget(index);
        }
        result
    }

    fn error_reply(&self, e: Error) -> (bool, Status) {
        match e {
            Error::WrongLeader => (true, Status::Ok),
            Error::RetriesExhausted { attempts } => {
                debug!(
                    "{}: gave up after {} resubmissions",
                    self.server.name(),
                    attempts
                );
                (true, Status::Ok)
            }
            Error::Timeout { index } => {
                debug!("{}: index {} timed out", self.server.name(), index);
                (false, Status::Timeout)
            }
            Error::Shutdown => (false, Status::Shutdown),
            e => {
                error!("{}: rejected request: {}", self.server.name(), e);
                (false, Status::InvalidRequest)
            }
        }
    }
}

/// A result answers a command only if it was produced by that very command.
fn answers(result: &AppliedResult, dedup_key: &DedupKey, command: &Command) -> bool {
    if result.dedup_key != *dedup_key {
        return false;
    }
    match (&result.outcome, command) {
        (Outcome::Get(_), Command::Get { .. }) => true,
        (Outcome::PutAppend, Command::PutAppend { .. }) => true,
        _ => false,
    }
}

#[async_trait::async_trait]
impl KvService for Node {
    async fn get(&self, args: GetRequest) -> GetReply {
        match self.do_get(args).await {
            Ok(Some(value)) => GetReply {
                wrong_leader: false,
                status: Status::Ok as i32,
                value,
            },
            Ok(None) => GetReply {
                wrong_leader: false,
                status: Status::NoKey as i32,
                value: String::new(),
            },
            Err(e) => {
                let (wrong_leader, status) = self.error_reply(e);
                GetReply {
                    wrong_leader,
                    status: status as i32,
                    value: String::new(),
                }
            }
        }
    }

    async fn put_append(&self, args: PutAppendRequest) -> PutAppendReply {
        match self.do_put_append(args).await {
            Ok(()) => PutAppendReply {
                wrong_leader: false,
                status: Status::Ok as i32,
            },
            Err(e) => {
                let (wrong_leader, status) = self.error_reply(e);
                PutAppendReply {
                    wrong_leader,
                    status: status as i32,
                }
            }
        }
    }
}
