//! Candidate file model: one file awaiting store, retrieve, or deletion.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::classify::StorageStrategy;

/// A declared source for a candidate file's content.
///
/// The first reachable source is used. Remote URLs are carried in the model
/// but are staged to local paths by the transport plumbing before this core
/// sees them; at this layer only local sources are reachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceLocation {
    /// A file on the local filesystem.
    Local(PathBuf),
    /// A remote URL, not directly readable by this core.
    Remote(String),
}

impl SourceLocation {
    /// Whether this source can currently be read.
    pub fn is_reachable(&self) -> bool {
        match self {
            SourceLocation::Local(path) => path.is_file(),
            SourceLocation::Remote(_) => false,
        }
    }
}

/// One file awaiting store, retrieve, or deletion.
///
/// The (checksum, dest_node) pair is the logical identity; size and content
/// never change for a given checksum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFile {
    /// Algorithm-tagged content checksum, e.g. `blake3:<hex>`.
    pub checksum: String,
    /// File size in bytes.
    pub size_bytes: u64,
    /// MIME content type.
    pub content_type: String,
    /// Original file name; becomes the member name inside a bundle.
    pub name: String,
    /// Declared source locations, tried in order.
    pub sources: Vec<SourceLocation>,
    /// Destination node path in the archive-side namespace.
    pub dest_node: String,
    /// Archiving strategy, assigned by classification before subsets are built.
    pub strategy: Option<StorageStrategy>,
    /// Encoded physical reference, present for retrieve and delete requests.
    pub reference: Option<String>,
}

impl CandidateFile {
    /// Returns the first reachable local source path, if any.
    pub fn resolve_source(&self) -> Option<&Path> {
        self.sources.iter().find_map(|source| match source {
            SourceLocation::Local(path) if source.is_reachable() => Some(path.as_path()),
            _ => None,
        })
    }
}

/// Computes the algorithm-tagged content checksum of a payload.
pub fn content_checksum(data: &[u8]) -> String {
    format!("blake3:{}", blake3::hash(data).to_hex())
}
