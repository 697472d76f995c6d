//! Archive eraser: logical removal of one DELETE working subset.
//!
//! The eraser only signals that a logical file is no longer needed: direct
//! objects and split parts are removed outright, while a bundle member is
//! released from its bundle's ownership bookkeeping. Reaping an emptied
//! bundle is the remote reference-count collaborator's job. Removal is
//! idempotent: deleting an already-deleted reference succeeds again.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use nearline_core::{
    part_path, ArchiveError, ArchiveResult, CandidateFile, PhysicalReference, ProgressOutcome,
    ProgressSink, WorkingSubset,
};

use crate::session::ArchiveSession;

/// Statistics for one delete execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EraserStats {
    /// Files deleted successfully.
    pub files_deleted: u64,
    /// Files that failed to delete.
    pub files_failed: u64,
    /// Physical objects (including parts) removed.
    pub objects_removed: u64,
    /// Bundle members released.
    pub members_released: u64,
}

/// Eraser for DELETE working subsets.
pub struct ArchiveEraser<'a> {
    session: &'a dyn ArchiveSession,
}

impl<'a> ArchiveEraser<'a> {
    /// Creates an eraser over one session lease.
    pub fn new(session: &'a dyn ArchiveSession) -> Self {
        Self { session }
    }

    /// Deletes every file of the subset, emitting one outcome per file.
    pub async fn delete(
        &self,
        subset: &WorkingSubset,
        sink: &dyn ProgressSink,
    ) -> ArchiveResult<EraserStats> {
        let mut stats = EraserStats::default();
        debug!(subset = %subset.id, files = subset.files.len(), "deleting working subset");

        for file in &subset.files {
            match self.delete_file(file, &mut stats).await {
                Ok(()) => {
                    stats.files_deleted += 1;
                    sink.report(ProgressOutcome::Deleted {
                        checksum: file.checksum.clone(),
                    });
                }
                Err(err) => {
                    warn!(checksum = %file.checksum, error = %err, "delete failed");
                    stats.files_failed += 1;
                    sink.report(ProgressOutcome::DeleteFailed {
                        checksum: file.checksum.clone(),
                        cause: err.to_string(),
                    });
                }
            }
        }

        Ok(stats)
    }

    async fn delete_file(
        &self,
        file: &CandidateFile,
        stats: &mut EraserStats,
    ) -> ArchiveResult<()> {
        let encoded =
            file.reference
                .as_deref()
                .ok_or_else(|| ArchiveError::MissingReference {
                    checksum: file.checksum.clone(),
                })?;

        match PhysicalReference::decode(encoded)? {
            PhysicalReference::Direct { path, .. } => {
                self.session.remove(&path).await?;
                stats.objects_removed += 1;
            }
            PhysicalReference::SplitParts {
                path, part_count, ..
            } => {
                for idx in 1..=part_count {
                    self.session.remove(&part_path(&path, idx)).await?;
                    stats.objects_removed += 1;
                }
            }
            PhysicalReference::BundleMember {
                path, member_name, ..
            } => {
                self.session.release_member(&path, &member_name).await?;
                stats.members_released += 1;
            }
        }
        Ok(())
    }
}
