use std::sync::Arc;
use std::thread::{self, JoinHandle};

use futures::channel::mpsc::UnboundedReceiver;
use futures::executor::block_on_stream;
use futures::{future, stream, StreamExt};

use crate::kvraft::command::{Command, DedupKey};
use crate::kvraft::notify::{AppliedResult, Outcome};
use crate::kvraft::server::{KvServer, KvState};
use crate::raft::ApplyMsg;

/// The only writer of the store: applies committed entries one at a time, in
/// the order the consensus module delivers them.
pub(crate) struct ApplyLoop {
    server: Arc<KvServer>,
}

impl ApplyLoop {
    pub(crate) fn new(server: Arc<KvServer>) -> ApplyLoop {
        ApplyLoop { server }
    }

    /// Runs the loop on its own thread until `cancel` yields `None` or the
    /// consensus module hangs up.
    pub(crate) fn spawn(
        self,
        apply_ch: UnboundedReceiver<ApplyMsg>,
        cancel: UnboundedReceiver<Option<ApplyMsg>>,
    ) -> JoinHandle<()> {
        thread::spawn(move || {
            info!("{}: apply worker start", self.server.name());
            let feed = apply_ch
                .map(Some)
                .chain(stream::once(future::ready(None)));
            for message in block_on_stream(stream::select(feed, cancel)) {
                match message {
                    Some(message) => self.apply(message),
                    None => break,
                }
            }
            info!("{}: apply worker ends", self.server.name());
        })
    }

    pub(crate) fn apply(&self, message: ApplyMsg) {
        match message {
            ApplyMsg::Command { data, index } => {
                let applied = self.server.state.lock().unwrap().last_applied;
                if index <= applied {
                    debug!(
                        "{}: skip entry {}, already applied up to {}",
                        self.server.name(),
                        index,
                        applied
                    );
                    return;
                }
                match Command::decode(&data) {
                    Ok(command) => self.apply_command(index, command),
                    Err(e) => {
                        error!(
                            "{}: failed to decode entry {}: {}",
                            self.server.name(),
                            index,
                            e
                        );
                        let mut state = self.server.state.lock().unwrap();
                        state.last_applied = index;
                        state.waiters.release_upto(index);
                    }
                }
            }
            ApplyMsg::Snapshot { term, index } => {
                let applied = self.server.state.lock().unwrap().last_applied;
                if index <= applied {
                    debug!(
                        "{}: skip snapshot at {}, already applied up to {}",
                        self.server.name(),
                        index,
                        applied
                    );
                    return;
                }
                debug!(
                    "{}: install snapshot at {} (term {})",
                    self.server.name(),
                    index,
                    term
                );
                self.apply_command(index, Command::InstallSnapshot)
            }
        }
    }

    fn apply_command(&self, index: u64, command: Command) {
        let mut guard = self.server.state.lock().unwrap();
        let state = &mut *guard;
        let result = match command {
            Command::Get {
                key,
                client_id,
                seq,
            } => {
                let value = state.store.get(&key).map(str::to_owned);
                AppliedResult {
                    dedup_key: DedupKey {
                        key,
                        client_id,
                        seq,
                    },
                    outcome: Outcome::Get(value),
                }
            }
            Command::PutAppend {
                key,
                value,
                mode,
                client_id,
                seq,
            } => {
                let dedup_key = DedupKey {
                    key: key.clone(),
                    client_id,
                    seq,
                };
                if !state.store.apply_write(client_id, seq, mode, key, value) {
                    debug!(
                        "{}: duplicated write {:?} at {}",
                        self.server.name(),
                        dedup_key,
                        index
                    );
                }
                AppliedResult {
                    dedup_key,
                    outcome: Outcome::PutAppend,
                }
            }
            Command::InstallSnapshot => {
                self.install_snapshot(state, index);
                return;
            }
        };
        state.last_applied = index;

        let server = &self.server;
        match server
            .snapshots
            .maybe_snapshot(&*server.rf, &state.store, index)
        {
            Ok(Some(meta)) => state.snapshot = meta,
            Ok(None) => {}
            Err(e) => error!("{}: failed to snapshot at {}: {}", server.name(), index, e),
        }

        state.waiters.signal(index, result);
        state.waiters.prune(index, server.options.result_retention);
    }

    /// Reloads the store from the snapshot the consensus module saved for
    /// `index`. The covered entries are gone from the log, so an unreadable
    /// snapshot leaves nothing to recover from.
    fn install_snapshot(&self, state: &mut KvState, index: u64) {
        let (store, meta) = self.server.snapshots.restore().unwrap_or_else(|e| {
            panic!(
                "{}: failed to install snapshot at {}: {}",
                self.server.name(),
                index,
                e
            )
        });
        if meta.last_included_index != index {
            error!(
                "{}: persisted snapshot is at {}, expected {}, ignored",
                self.server.name(),
                meta.last_included_index,
                index
            );
            return;
        }
        state.store = store;
        state.snapshot = meta;
        state.last_applied = index;
        state.waiters.release_upto(index);
    }
}
