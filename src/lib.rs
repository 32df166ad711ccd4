#![deny(clippy::all)]

//! A linearizable key/value service layered on top of a replicated log.
//!
//! The consensus module itself lives outside this crate; [`raft::Consensus`]
//! and [`raft::persister::Persister`] describe what the service needs from it.

#[macro_use]
extern crate log;
#[macro_use]
extern crate prost_derive;

pub mod kvraft;
pub mod proto;
pub mod raft;
