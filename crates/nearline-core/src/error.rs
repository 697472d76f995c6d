//! Error types for the nearline archiving core.

use std::path::PathBuf;

use thiserror::Error;

use crate::reference::DecodeError;
use crate::subset::Operation;

/// Result type alias for archiving operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Error variants for archiving operations.
///
/// Per-file errors (`UnreachableSource`, `TransferFailure`, `Decode`,
/// `MemberNotFound`, `MissingReference`, `CorruptBundle`, `DuplicateMember`)
/// are recovered locally and reported through the progress sink. Subset-wide
/// errors (`InvalidThresholds`, `WorkspaceUnavailable`, `SessionUnavailable`,
/// `OperationMismatch`) are fatal for the whole execute call.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Wraps standard I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Misconfigured classification thresholds, detected at startup.
    #[error("Invalid thresholds: {reason}")]
    InvalidThresholds {
        /// Description of the violated invariant.
        reason: String,
    },

    /// No declared source location for the file is reachable.
    #[error("Unreachable source for file {checksum}")]
    UnreachableSource {
        /// Content checksum of the affected file.
        checksum: String,
    },

    /// Remote session I/O error during store, retrieve, or delete.
    #[error("Transfer failure on {path}: {reason}")]
    TransferFailure {
        /// Archive path of the physical unit being transferred.
        path: String,
        /// Description of the failure.
        reason: String,
    },

    /// Malformed physical reference string.
    #[error("Reference decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The file carries no recorded physical reference.
    #[error("No physical reference recorded for file {checksum}")]
    MissingReference {
        /// Content checksum of the affected file.
        checksum: String,
    },

    /// The named member is absent from the bundle at retrieval time.
    #[error("Member {member} not found in bundle {bundle}")]
    MemberNotFound {
        /// Archive path of the bundle object.
        bundle: String,
        /// The member name that was not found.
        member: String,
    },

    /// Bundle object failed magic, version, checksum, or bounds verification.
    #[error("Corrupt bundle at {path}: {reason}")]
    CorruptBundle {
        /// Archive path of the bundle object.
        path: String,
        /// Description of the corruption.
        reason: String,
    },

    /// Two files with the same name landed in one bundle-in-progress.
    #[error("Duplicate member name in bundle: {member}")]
    DuplicateMember {
        /// The colliding member name.
        member: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {reason}")]
    Serialization {
        /// Description of the error.
        reason: String,
    },

    /// Scratch workspace directory is not usable; fatal for the whole subset.
    #[error("Workspace unavailable at {path:?}: {reason}")]
    WorkspaceUnavailable {
        /// The workspace path that could not be used.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// The session pool cannot hand out a session; fatal for the whole subset.
    #[error("Archive session unavailable: {reason}")]
    SessionUnavailable {
        /// Description of the failure.
        reason: String,
    },

    /// The subset was built for a different operation than the one requested.
    #[error("Operation mismatch: subset was prepared for {expected}, got {actual}")]
    OperationMismatch {
        /// The operation the subset was prepared for.
        expected: Operation,
        /// The operation that was requested.
        actual: Operation,
    },
}
