use std::sync::Arc;

use prost::Message;

use crate::kvraft::errors::{Error, Result};
use crate::kvraft::state_machine::KvStore;
use crate::proto::kvraftpb::SnapshotPayload;
use crate::raft::persister::Persister;
use crate::raft::Consensus;

/// Version written into every snapshot this server produces.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Snapshot once the log reaches this share of `maxraftstate`.
const SNAPSHOT_THRESHOLD_RATIO: f64 = 0.8;

/// The log position a snapshot replaces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SnapshotMeta {
    pub last_included_index: u64,
    pub last_included_term: u64,
}

pub fn encode(store: &KvStore, meta: SnapshotMeta) -> Result<Vec<u8>> {
    let payload = SnapshotPayload {
        version: SNAPSHOT_VERSION,
        last_included_index: meta.last_included_index,
        last_included_term: meta.last_included_term,
        client_seqs: store.client_seqs().clone(),
        store: store.data().clone(),
    };
    let mut buf = Vec::with_capacity(payload.encoded_len());
    payload.encode(&mut buf)?;
    Ok(buf)
}

/// An empty blob decodes to an empty store at index zero.
pub fn decode(data: &[u8]) -> Result<(KvStore, SnapshotMeta)> {
    if data.is_empty() {
        return Ok((KvStore::new(), SnapshotMeta::default()));
    }
    let payload = SnapshotPayload::decode(data)?;
    if payload.version != SNAPSHOT_VERSION {
        return Err(Error::UnsupportedVersion(payload.version));
    }
    let meta = SnapshotMeta {
        last_included_index: payload.last_included_index,
        last_included_term: payload.last_included_term,
    };
    Ok((KvStore::from_parts(payload.store, payload.client_seqs), meta))
}

/// Decides when to compact the log, and moves snapshots in and out of the
/// persister.
pub struct SnapshotManager {
    name: String,
    persister: Arc<dyn Persister>,
    // snapshot if log grows this big
    maxraftstate: Option<usize>,
}

impl SnapshotManager {
    pub fn new(
        name: String,
        persister: Arc<dyn Persister>,
        maxraftstate: Option<usize>,
    ) -> SnapshotManager {
        SnapshotManager {
            name,
            persister,
            maxraftstate,
        }
    }

    pub fn should_snapshot(&self) -> bool {
        match self.maxraftstate {
            None => false,
            Some(max) => {
                self.persister.raft_state_size() as f64 >= max as f64 * SNAPSHOT_THRESHOLD_RATIO
            }
        }
    }

    /// Snapshots `store` as of `index` if the log grew too large, then lets
    /// the consensus module drop the covered entries.
    pub fn maybe_snapshot(
        &self,
        rf: &dyn Consensus,
        store: &KvStore,
        index: u64,
    ) -> Result<Option<SnapshotMeta>> {
        if !self.should_snapshot() {
            return Ok(None);
        }
        self.take_snapshot(rf, store, index)
    }

    pub fn take_snapshot(
        &self,
        rf: &dyn Consensus,
        store: &KvStore,
        index: u64,
    ) -> Result<Option<SnapshotMeta>> {
        let term = match rf.term_at(index) {
            Some(term) => term,
            None => {
                warn!(
                    "{}: entry {} is no longer in the log, skip snapshot",
                    self.name, index
                );
                return Ok(None);
            }
        };
        let meta = SnapshotMeta {
            last_included_index: index,
            last_included_term: term,
        };
        let data = encode(store, meta)?;
        debug!(
            "{}: snapshot at {} (term {}), {} bytes",
            self.name,
            index,
            term,
            data.len()
        );
        self.persister.save_snapshot(data);
        rf.truncate_log(index);
        Ok(Some(meta))
    }

    /// Loads the latest persisted snapshot.
    pub fn restore(&self) -> Result<(KvStore, SnapshotMeta)> {
        let (store, meta) = decode(&self.persister.snapshot())?;
        info!(
            "{}: restored {} keys at index {} (term {})",
            self.name,
            store.data().len(),
            meta.last_included_index,
            meta.last_included_term
        );
        Ok((store, meta))
    }
}
