//! Protobuf payload messages.
//!
//! The message set is small and stable, so the types are maintained by hand
//! with prost derives instead of build-time codegen.

use prost::Message;

/// Request for a coverage plan over one namespace.
#[derive(Clone, PartialEq, Message)]
pub struct CoverageReq {
    #[prost(bytes = "vec", tag = "1")]
    pub bucket_type: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub bucket: Vec<u8>,
    /// Minimum number of partitions the plan should cover.
    #[prost(uint32, optional, tag = "3")]
    pub min_partitions: Option<u32>,
    /// A previously obtained coverage context the store should refresh.
    #[prost(bytes = "vec", optional, tag = "4")]
    pub replace_cover: Option<Vec<u8>>,
    /// Coverage contexts whose partitions failed and should be excluded
    /// or reassigned.
    #[prost(bytes = "vec", repeated, tag = "5")]
    pub unavailable_cover: Vec<Vec<u8>>,
}

/// One frame of a coverage plan response.
#[derive(Clone, PartialEq, Message)]
pub struct CoverageResp {
    #[prost(message, repeated, tag = "1")]
    pub entries: Vec<CoverageEntryPb>,
    /// Unset or `true` when this is the final frame of the response.
    #[prost(bool, optional, tag = "2")]
    pub done: Option<bool>,
}

/// One partition-ownership entry as encoded on the wire.
#[derive(Clone, PartialEq, Message)]
pub struct CoverageEntryPb {
    /// Opaque token echoed back on subsequent queries.
    #[prost(bytes = "vec", tag = "1")]
    pub cover_context: Vec<u8>,
    /// Human-readable description of the keyspace slice covered.
    #[prost(string, tag = "2")]
    pub keyspace_desc: String,
    #[prost(string, tag = "3")]
    pub ip: String,
    #[prost(uint32, tag = "4")]
    pub port: u32,
}

/// Error frame payload.
#[derive(Clone, PartialEq, Message)]
pub struct ErrorResp {
    #[prost(string, tag = "1")]
    pub errmsg: String,
    #[prost(uint32, tag = "2")]
    pub errcode: u32,
}
