use std::collections::{BTreeMap, HashMap};

use crate::kvraft::command::WriteMode;

/// The replicated key/value map and the highest write sequence applied for
/// each client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KvStore {
    data: BTreeMap<String, String>,
    client_seqs: HashMap<i64, u64>,
}

impl KvStore {
    pub fn new() -> KvStore {
        KvStore::default()
    }

    pub(crate) fn from_parts(
        data: BTreeMap<String, String>,
        client_seqs: HashMap<i64, u64>,
    ) -> KvStore {
        KvStore { data, client_seqs }
    }

    pub fn data(&self) -> &BTreeMap<String, String> {
        &self.data
    }

    pub fn client_seqs(&self) -> &HashMap<i64, u64> {
        &self.client_seqs
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    pub fn put(&mut self, key: String, value: String) {
        self.data.insert(key, value);
    }

    pub fn append(&mut self, key: String, value: &str) {
        self.data.entry(key).or_default().push_str(value);
    }

    pub fn last_seq(&self, client_id: i64) -> Option<u64> {
        self.client_seqs.get(&client_id).copied()
    }

    /// Whether a write numbered `seq` from `client_id` was already applied.
    pub fn is_duplicate(&self, client_id: i64, seq: u64) -> bool {
        self.last_seq(client_id).map_or(false, |last| last >= seq)
    }

    /// Applies a write unless it is a duplicate. Returns whether the store
    /// changed.
    pub fn apply_write(
        &mut self,
        client_id: i64,
        seq: u64,
        mode: WriteMode,
        key: String,
        value: String,
    ) -> bool {
        if self.is_duplicate(client_id, seq) {
            return false;
        }
        self.client_seqs.insert(client_id, seq);
        match mode {
            WriteMode::Put => self.put(key, value),
            WriteMode::Append => self.append(key, &value),
        }
        true
    }
}
