//! Object identity and metadata structures.
//!
//! This module defines the types that pin down *which* bytes a read channel
//! returns: the resource coordinates of an object and the metadata snapshot
//! taken when the channel is opened.

use serde::{Deserialize, Serialize};

/// Coordinates of one object in a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    /// Bucket holding the object
    pub bucket: String,

    /// Object name within the bucket
    pub object: String,
}

impl ResourceId {
    pub fn new(bucket: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            object: object.into(),
        }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.object)
    }
}

/// Object metadata returned by the store's unary metadata call.
///
/// The streaming media call does not carry a generation number, so the
/// channel fetches this snapshot once at open time and cites the generation
/// on every subsequent read request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// Version identifier assigned by the store when the object was written.
    /// Reads pinned to a generation observe a single immutable snapshot.
    pub generation: u64,

    /// Total size of this generation, in bytes
    pub size: u64,

    /// Content-Encoding of the stored bytes; empty for identity encoding
    #[serde(default)]
    pub content_encoding: String,
}
