//! Wire messages for depot manifests and depot state.
//!
//! Field numbers are fixed by the external format. Scalar fields are
//! proto2-style optional so that "absent" stays distinguishable from
//! "present with a default value".

use std::collections::HashMap;

/// One chunk of a file as described on the wire.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChunkData {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub chunk_id: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub checksum: Option<Vec<u8>>,
    #[prost(uint64, optional, tag = "3")]
    pub offset: Option<u64>,
    #[prost(uint32, optional, tag = "4")]
    pub compressed_length: Option<u32>,
    #[prost(uint32, optional, tag = "5")]
    pub uncompressed_length: Option<u32>,
}

/// One file of a manifest as described on the wire.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileData {
    #[prost(string, optional, tag = "1")]
    pub file_name: Option<String>,
    #[prost(message, repeated, tag = "2")]
    pub chunks: Vec<ChunkData>,
    /// Declared as an enum on the wire; carries OR-ed flag bits.
    #[prost(int32, optional, tag = "3")]
    pub flags: Option<i32>,
    #[prost(uint64, optional, tag = "4")]
    pub total_size: Option<u64>,
    #[prost(bytes = "vec", optional, tag = "5")]
    pub file_hash: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoManifest {
    #[prost(message, repeated, tag = "1")]
    pub files: Vec<FileData>,
    #[prost(uint64, optional, tag = "2")]
    pub id: Option<u64>,
    #[prost(message, optional, tag = "3")]
    pub creation_time: Option<::prost_types::Timestamp>,
}

/// Persisted form of the depot state: depot id to installed manifest id.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DepotConfigStore {
    #[prost(map = "uint32, uint64", tag = "1")]
    pub installed_manifest_ids: HashMap<u32, u64>,
}
