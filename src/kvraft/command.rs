use prost::Message;

use crate::kvraft::errors::{Error, Result};
use crate::proto::kvraftpb::command_envelope::Command as WireCommand;
use crate::proto::kvraftpb::*;

/// Version written into every log entry this server produces.
pub const COMMAND_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMode {
    Put,
    Append,
}

impl WriteMode {
    fn from_op(op: i32) -> Result<WriteMode> {
        match Op::from_i32(op) {
            Some(Op::Put) => Ok(WriteMode::Put),
            Some(Op::Append) => Ok(WriteMode::Append),
            Some(Op::Unknown) | None => Err(Error::UnknownOp(op)),
        }
    }

    fn to_op(self) -> Op {
        match self {
            WriteMode::Put => Op::Put,
            WriteMode::Append => Op::Append,
        }
    }
}

/// Matches an applied log entry to the request waiting for it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub key: String,
    pub client_id: i64,
    pub seq: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Get {
        key: String,
        client_id: i64,
        seq: u64,
    },
    PutAppend {
        key: String,
        value: String,
        mode: WriteMode,
        client_id: i64,
        seq: u64,
    },
    /// Reload the state machine from the persisted snapshot.
    InstallSnapshot,
}

impl Command {
    pub fn from_get(request: GetRequest) -> Self {
        Command::Get {
            key: request.key,
            client_id: request.client_id,
            seq: request.seq,
        }
    }

    pub fn from_put_append(request: PutAppendRequest) -> Result<Self> {
        Ok(Command::PutAppend {
            mode: WriteMode::from_op(request.op)?,
            key: request.key,
            value: request.value,
            client_id: request.client_id,
            seq: request.seq,
        })
    }

    /// `None` for commands no request can be waiting on.
    pub fn dedup_key(&self) -> Option<DedupKey> {
        match self {
            Command::Get {
                key,
                client_id,
                seq,
            }
            | Command::PutAppend {
                key,
                client_id,
                seq,
                ..
            } => Some(DedupKey {
                key: key.clone(),
                client_id: *client_id,
                seq: *seq,
            }),
            Command::InstallSnapshot => None,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let command = match self {
            Command::Get {
                key,
                client_id,
                seq,
            } => WireCommand::Get(GetRequest {
                key: key.clone(),
                client_id: *client_id,
                seq: *seq,
            }),
            Command::PutAppend {
                key,
                value,
                mode,
                client_id,
                seq,
            } => WireCommand::PutAppend(PutAppendRequest {
                key: key.clone(),
                value: value.clone(),
                op: mode.to_op() as i32,
                client_id: *client_id,
                seq: *seq,
            }),
            // Snapshots reach the service through the consensus module, never
            // through the log.
            Command::InstallSnapshot => return Err(Error::EmptyCommand),
        };
        let envelope = CommandEnvelope {
            version: COMMAND_VERSION,
            command: Some(command),
        };
        let mut buf = Vec::with_capacity(envelope.encoded_len());
        envelope.encode(&mut buf)?;
        Ok(buf)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let envelope = CommandEnvelope::decode(data)?;
        if envelope.version != COMMAND_VERSION {
            return Err(Error::UnsupportedVersion(envelope.version));
        }
        match envelope.command {
            Some(WireCommand::Get(request)) => Ok(Command::from_get(request)),
            Some(WireCommand::PutAppend(request)) => Command::from_put_append(request),
            None => Err(Error::EmptyCommand),
        }
    }
}
