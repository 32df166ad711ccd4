use std::result;

use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error("current node isn't leader")]
    NotLeader,
}

pub type Result<T> = result::Result<T, Error>;
