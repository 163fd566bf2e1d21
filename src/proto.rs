/// Hand-written subset of the remote execution API messages
///
/// Only the messages that take part in action key derivation are defined here.
/// Field tags follow the upstream proto definitions so the encoded bytes (and
/// therefore the digests) match what a remote execution service computes.
use serde::{Deserialize, Serialize};

/// Content digest: lowercase hex hash plus the size of the digested bytes
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ::prost::Message)]
pub struct Digest {
    #[prost(string, tag = "1")]
    pub hash: String,

    #[prost(int64, tag = "2")]
    pub size_bytes: i64,
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.hash, self.size_bytes)
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EnvironmentVariable {
    #[prost(string, tag = "1")]
    pub name: String,

    #[prost(string, tag = "2")]
    pub value: String,
}

/// The command line and environment of a spawn
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Command {
    #[prost(string, repeated, tag = "1")]
    pub arguments: ::prost::alloc::vec::Vec<String>,

    /// Sorted by name
    #[prost(message, repeated, tag = "2")]
    pub environment_variables: ::prost::alloc::vec::Vec<EnvironmentVariable>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Property {
    #[prost(string, tag = "1")]
    pub name: String,

    #[prost(string, tag = "2")]
    pub value: String,
}

/// Execution platform requirements
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Platform {
    /// Sorted by name
    #[prost(message, repeated, tag = "1")]
    pub properties: ::prost::alloc::vec::Vec<Property>,
}

/// Canonical description of a unit of work; its digest is the action key
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Action {
    #[prost(message, optional, tag = "1")]
    pub command_digest: Option<Digest>,

    #[prost(message, optional, tag = "2")]
    pub input_root_digest: Option<Digest>,

    /// Sorted exec paths of the declared output files
    #[prost(string, repeated, tag = "3")]
    pub output_files: ::prost::alloc::vec::Vec<String>,

    #[prost(string, repeated, tag = "4")]
    pub output_directories: ::prost::alloc::vec::Vec<String>,

    #[prost(message, optional, tag = "5")]
    pub platform: Option<Platform>,

    #[prost(message, optional, tag = "6")]
    pub timeout: Option<::prost_types::Duration>,

    #[prost(bool, tag = "7")]
    pub do_not_cache: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileNode {
    #[prost(string, tag = "1")]
    pub name: String,

    #[prost(message, optional, tag = "2")]
    pub digest: Option<Digest>,

    #[prost(bool, tag = "4")]
    pub is_executable: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DirectoryNode {
    #[prost(string, tag = "1")]
    pub name: String,

    #[prost(message, optional, tag = "2")]
    pub digest: Option<Digest>,
}

/// One level of the input tree
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Directory {
    #[prost(message, repeated, tag = "1")]
    pub files: ::prost::alloc::vec::Vec<FileNode>,

    #[prost(message, repeated, tag = "2")]
    pub directories: ::prost::alloc::vec::Vec<DirectoryNode>,
}
