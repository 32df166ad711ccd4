use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::executor::block_on;

use crate::kvraft::options::KvOptions;
use crate::kvraft::server::{KvServer, Node};
use crate::proto::kvraftpb::*;
use crate::raft::errors::{Error, Result};
use crate::raft::persister::{Persister, SimplePersister};
use crate::raft::{ApplyMsg, Consensus, State};

static CLIENT_ID: AtomicI64 = AtomicI64::new(1000);

fn init_logger() {
    use std::sync::Once;
    static LOGGER_INIT: Once = Once::new();
    LOGGER_INIT.call_once(env_logger::init);
}

#[derive(Clone)]
struct MemLog {
    term: u64,
    is_leader: bool,
    // started entries stay uncommitted while held.
    hold: bool,
    killed: bool,
    // index of the entry just before `entries[0]`.
    offset: u64,
    entries: Vec<(u64, Vec<u8>)>,
    committed: u64,
}

impl MemLog {
    fn last_index(&self) -> u64 {
        self.offset + self.entries.len() as u64
    }
}

/// A single-peer log that commits what it is given, with knobs to simulate
/// leadership changes.
pub struct MemRaft {
    log: Mutex<MemLog>,
    apply_tx: UnboundedSender<ApplyMsg>,
    persister: Arc<SimplePersister>,
}

impl MemRaft {
    pub fn new(persister: Arc<SimplePersister>, apply_tx: UnboundedSender<ApplyMsg>) -> MemRaft {
        let log = MemLog {
            term: 1,
            is_leader: true,
            hold: false,
            killed: false,
            offset: 0,
            entries: vec![],
            committed: 0,
        };
        MemRaft {
            log: Mutex::new(log),
            apply_tx,
            persister,
        }
    }

    /// A new peer with the same durable log, replaying every entry above the
    /// snapshot on `apply_tx`.
    pub fn restart(&self, apply_tx: UnboundedSender<ApplyMsg>) -> MemRaft {
        let mut log = self.log.lock().unwrap().clone();
        log.killed = false;
        log.hold = false;
        log.committed = log.offset;
        let rf = MemRaft {
            log: Mutex::new(log),
            apply_tx,
            persister: self.persister.clone(),
        };
        rf.commit();
        rf
    }

    fn persist(&self, log: &MemLog) {
        let state: Vec<u8> = log
            .entries
            .iter()
            .flat_map(|(_, data)| data.iter().copied())
            .collect();
        self.persister.save_raft_state(state);
    }

    fn commit(&self) {
        let mut log = self.log.lock().unwrap();
        while log.committed < log.last_index() {
            log.committed += 1;
            let index = log.committed;
            let data = log.entries[(index - log.offset - 1) as usize].1.clone();
            let _ = self.apply_tx.unbounded_send(ApplyMsg::Command { data, index });
        }
    }

    /// Holds new entries uncommitted, or commits everything held so far.
    pub fn hold(&self, hold: bool) {
        self.log.lock().unwrap().hold = hold;
        if !hold {
            self.commit();
        }
    }

    pub fn set_leader(&self, is_leader: bool) {
        self.log.lock().unwrap().is_leader = is_leader;
    }

    pub fn next_term(&self) {
        self.log.lock().unwrap().term += 1;
    }

    /// Replaces the uncommitted entry at `index`, as a new leader would.
    pub fn overwrite(&self, index: u64, data: Vec<u8>) {
        let mut log = self.log.lock().unwrap();
        assert!(index > log.committed, "entry {} is already committed", index);
        let term = log.term;
        let pos = (index - log.offset - 1) as usize;
        log.entries[pos] = (term, data);
        self.persist(&log);
    }

    /// Saves a snapshot received from a leader and hands it to the service.
    pub fn install_snapshot(&self, data: Vec<u8>, index: u64, term: u64) {
        let mut log = self.log.lock().unwrap();
        self.persister.save_snapshot(data);
        log.entries.clear();
        log.offset = index;
        log.committed = index;
        self.persist(&log);
        let _ = self.apply_tx.unbounded_send(ApplyMsg::Snapshot { term, index });
    }

    /// Announces a snapshot at `index` without touching the log or the
    /// persister, as a lagging consensus module might.
    pub fn deliver_snapshot(&self, index: u64, term: u64) {
        let _ = self.apply_tx.unbounded_send(ApplyMsg::Snapshot { term, index });
    }

    pub fn last_index(&self) -> u64 {
        self.log.lock().unwrap().last_index()
    }

    /// Number of entries still held in the log.
    pub fn log_len(&self) -> usize {
        self.log.lock().unwrap().entries.len()
    }
}

impl Consensus for MemRaft {
    fn start(&self, command: &[u8]) -> Result<(u64, u64)> {
        let (index, term, hold) = {
            let mut log = self.log.lock().unwrap();
            if log.killed || !log.is_leader {
                return Err(Error::NotLeader);
            }
            let term = log.term;
            log.entries.push((term, command.to_vec()));
            self.persist(&log);
            (log.last_index(), term, log.hold)
        };
        if !hold {
            self.commit();
        }
        Ok((index, term))
    }

    fn get_state(&self) -> State {
        let log = self.log.lock().unwrap();
        State {
            term: log.term,
            is_leader: log.is_leader && !log.killed,
        }
    }

    fn term_at(&self, index: u64) -> Option<u64> {
        let log = self.log.lock().unwrap();
        if index <= log.offset || index > log.last_index() {
            return None;
        }
        Some(log.entries[(index - log.offset - 1) as usize].0)
    }

    fn truncate_log(&self, index: u64) {
        let mut log = self.log.lock().unwrap();
        if index <= log.offset {
            return;
        }
        let n = ((index - log.offset) as usize).min(log.entries.len());
        log.entries.drain(..n);
        log.offset = index;
        self.persist(&log);
    }

    fn kill(&self) {
        self.log.lock().unwrap().killed = true;
    }
}

pub struct Config {
    pub persister: Arc<SimplePersister>,
    pub rf: Arc<MemRaft>,
    pub node: Node,
    options: KvOptions,
}

impl Config {
    pub fn new(options: KvOptions) -> Config {
        init_logger();
        let persister = Arc::new(SimplePersister::new());
        let (tx, apply_ch) = unbounded();
        let rf = Arc::new(MemRaft::new(persister.clone(), tx));
        let kv = KvServer::new(rf.clone(), 0, persister.clone(), options.clone())
            .expect("empty persister restores");
        Config {
            persister,
            rf,
            node: Node::new(kv, apply_ch),
            options,
        }
    }

    /// Kills the server and starts a new one from the persisted state.
    pub fn restart(&mut self) {
        self.node.kill();
        let (tx, apply_ch) = unbounded();
        let rf = Arc::new(self.rf.restart(tx));
        let kv = KvServer::new(rf.clone(), 0, self.persister.clone(), self.options.clone())
            .expect("persisted snapshot restores");
        self.rf = rf;
        self.node = Node::new(kv, apply_ch);
    }

    pub fn make_client(&self) -> Clerk {
        self.make_client_with_id(CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// A clerk reusing the id of an earlier one, with a fresh sequence.
    pub fn make_client_with_id(&self, client_id: i64) -> Clerk {
        Clerk {
            node: self.node.clone(),
            client_id,
            seq: AtomicU64::new(0),
        }
    }

    pub fn wait_until(&self, what: &str, cond: impl Fn() -> bool) {
        let start = Instant::now();
        while !cond() {
            if start.elapsed() > Duration::from_secs(5) {
                panic!("timed out waiting for {}", what);
            }
            thread::sleep(Duration::from_millis(5));
        }
    }
}

impl Drop for Config {
    fn drop(&mut self) {
        self.node.kill();
    }
}

/// Talks to one server, numbering its requests.
pub struct Clerk {
    pub node: Node,
    pub client_id: i64,
    seq: AtomicU64,
}

impl Clerk {
    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self, key: &str) -> GetReply {
        let seq = self.next_seq();
        block_on(self.node.get(GetRequest {
            key: key.to_owned(),
            client_id: self.client_id,
            seq,
        }))
    }

    pub fn put(&self, key: &str, value: &str) -> PutAppendReply {
        let seq = self.next_seq();
        self.put_append_with_seq(key, value, Op::Put, seq)
    }

    pub fn append(&self, key: &str, value: &str) -> PutAppendReply {
        let seq = self.next_seq();
        self.put_append_with_seq(key, value, Op::Append, seq)
    }

    pub fn put_append_with_seq(&self, key: &str, value: &str, op: Op, seq: u64) -> PutAppendReply {
        block_on(self.node.put_append(PutAppendRequest {
            key: key.to_owned(),
            value: value.to_owned(),
            op: op as i32,
            client_id: self.client_id,
            seq,
        }))
    }
}
