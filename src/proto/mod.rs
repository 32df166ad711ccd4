pub mod kvraftpb {
    use std::collections::{BTreeMap, HashMap};

    /// Put or Append
    #[derive(Clone, PartialEq, Message)]
    pub struct PutAppendRequest {
        #[prost(string, tag = "1")]
        pub key: String,
        #[prost(string, tag = "2")]
        pub value: String,
        // "Put" or "Append"
        #[prost(enumeration = "Op", tag = "3")]
        pub op: i32,
        #[prost(int64, tag = "4")]
        pub client_id: i64,
        #[prost(uint64, tag = "5")]
        pub seq: u64,
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct PutAppendReply {
        #[prost(bool, tag = "1")]
        pub wrong_leader: bool,
        #[prost(enumeration = "Status", tag = "2")]
        pub status: i32,
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct GetRequest {
        #[prost(string, tag = "1")]
        pub key: String,
        #[prost(int64, tag = "2")]
        pub client_id: i64,
        #[prost(uint64, tag = "3")]
        pub seq: u64,
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct GetReply {
        #[prost(bool, tag = "1")]
        pub wrong_leader: bool,
        #[prost(enumeration = "Status", tag = "2")]
        pub status: i32,
        #[prost(string, tag = "3")]
        pub value: String,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
    pub enum Op {
        Unknown = 0,
        Put = 1,
        Append = 2,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
    pub enum Status {
        Ok = 0,
        NoKey = 1,
        Timeout = 2,
        Shutdown = 3,
        InvalidRequest = 4,
    }

    /// A command as it is stored in the replicated log.
    #[derive(Clone, PartialEq, Message)]
    pub struct CommandEnvelope {
        #[prost(uint32, tag = "1")]
        pub version: u32,
        #[prost(oneof = "command_envelope::Command", tags = "2, 3")]
        pub command: Option<command_envelope::Command>,
    }

    pub mod command_envelope {
        #[derive(Clone, PartialEq, Oneof)]
        pub enum Command {
            #[prost(message, tag = "2")]
            Get(super::GetRequest),
            #[prost(message, tag = "3")]
            PutAppend(super::PutAppendRequest),
        }
    }

    /// The durable snapshot blob.
    #[derive(Clone, PartialEq, Message)]
    pub struct SnapshotPayload {
        #[prost(uint32, tag = "1")]
        pub version: u32,
        #[prost(uint64, tag = "2")]
        pub last_included_index: u64,
        #[prost(uint64, tag = "3")]
        pub last_included_term: u64,
        #[prost(map = "int64, uint64", tag = "4")]
        pub client_seqs: HashMap<i64, u64>,
        #[prost(btree_map = "string, string", tag = "5")]
        pub store: BTreeMap<String, String>,
    }

    #[async_trait::async_trait]
    pub trait KvService: Clone + Send + Sync + 'static {
        async fn get(&self, args: GetRequest) -> GetReply;
        async fn put_append(&self, args: PutAppendRequest) -> PutAppendReply;
    }
}
