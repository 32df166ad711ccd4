use std::result;

use thiserror::Error;

use crate::raft;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error("current node isn't leader")]
    WrongLeader,
    #[error("command at index {index} was not applied before the deadline")]
    Timeout { index: u64 },
    #[error("command was displaced from the log {attempts} times")]
    RetriesExhausted { attempts: usize },
    #[error("the server is shutting down")]
    Shutdown,
    #[error("unknown put/append op {0}")]
    UnknownOp(i32),
    #[error("unsupported encoding version {0}")]
    UnsupportedVersion(u32),
    #[error("log entry carries no command")]
    EmptyCommand,
    #[error("applied result does not match the command kind")]
    MismatchedOutcome,
    #[error("encode error: {0}")]
    Encode(prost::EncodeError),
    #[error("decode error: {0}")]
    Decode(prost::DecodeError),
}

impl From<raft::errors::Error> for Error {
    fn from(e: raft::errors::Error) -> Error {
        match e {
            raft::errors::Error::NotLeader => Error::WrongLeader,
        }
    }
}

impl From<prost::EncodeError> for Error {
    fn from(e: prost::EncodeError) -> Error {
        Error::Encode(e)
    }
}

impl From<prost::DecodeError> for Error {
    fn from(e: prost::DecodeError) -> Error {
        Error::Decode(e)
    }
}

pub type Result<T> = result::Result<T, Error>;
