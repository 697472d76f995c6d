//! Archive engine facade: prepare working subsets and execute them against
//! the remote archive.
//!
//! Each execute entry point acquires a scoped session lease (and, for
//! store, a scratch area) and dispatches to the writer, reader, or eraser.
//! Subset-fatal conditions (exhausted session pool, unusable workspace, or
//! a subset prepared for a different operation) first report every file in
//! the subset as failed through the progress sink, then propagate the
//! single fatal error, so the caller always has a complete per-file
//! accounting.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use nearline_core::{
    ArchiveConfig, ArchiveError, ArchiveResult, CandidateFile, Operation, PreparedBatch,
    ProgressOutcome, ProgressSink, SubsetBuilder, WorkingSubset,
};

use crate::eraser::{ArchiveEraser, EraserStats};
use crate::reader::{ArchiveReader, ReaderStats};
use crate::session::{SessionLease, SessionPool};
use crate::workspace::Workspace;
use crate::writer::{ArchiveWriter, WriterStats};

/// Tiered archiving engine over one remote archive and one scratch
/// workspace.
pub struct ArchiveEngine<P: SessionPool> {
    config: ArchiveConfig,
    pool: P,
    workspace: Workspace,
}

impl<P: SessionPool> ArchiveEngine<P> {
    /// Creates an engine, validating the configuration and opening the
    /// scratch workspace. Threshold violations are fatal here, not
    /// per-file.
    pub fn new(
        config: ArchiveConfig,
        pool: P,
        workspace_root: impl Into<PathBuf>,
    ) -> ArchiveResult<Self> {
        config.validate()?;
        let workspace = Workspace::new(workspace_root)?;
        info!(archive = %config.archive_name, "archive engine created");
        Ok(Self {
            config,
            pool,
            workspace,
        })
    }

    /// The engine's configuration.
    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    /// The session pool this engine draws leases from.
    pub fn pool(&self) -> &P {
        &self.pool
    }

    /// Groups candidate files into working subsets for the given operation,
    /// reporting unreachable files as exclusions.
    pub fn prepare(&self, files: Vec<CandidateFile>, op: Operation) -> PreparedBatch {
        SubsetBuilder::new(&self.config).prepare(files, op)
    }

    /// Executes one STORE subset. Emits exactly one outcome per file.
    pub async fn store(
        &self,
        subset: &WorkingSubset,
        sink: &dyn ProgressSink,
    ) -> ArchiveResult<WriterStats> {
        self.check_op(subset, Operation::Store, sink)?;
        let lease = self.acquire(subset, Operation::Store, sink)?;
        let scratch = match self.workspace.scratch(subset.id) {
            Ok(scratch) => scratch,
            Err(err) => return Err(self.fail_subset(subset, Operation::Store, sink, err)),
        };

        let writer = ArchiveWriter::new(&self.config, lease.session(), &scratch);
        writer.store(subset, sink).await
    }

    /// Executes one RETRIEVE subset into `dest_dir`. Emits exactly one
    /// outcome per file.
    pub async fn retrieve(
        &self,
        subset: &WorkingSubset,
        dest_dir: &Path,
        sink: &dyn ProgressSink,
    ) -> ArchiveResult<ReaderStats> {
        self.check_op(subset, Operation::Retrieve, sink)?;
        let lease = self.acquire(subset, Operation::Retrieve, sink)?;

        let reader = ArchiveReader::new(lease.session());
        reader.retrieve(subset, dest_dir, sink).await
    }

    /// Executes one DELETE subset. Emits exactly one outcome per file.
    pub async fn delete(
        &self,
        subset: &WorkingSubset,
        sink: &dyn ProgressSink,
    ) -> ArchiveResult<EraserStats> {
        self.check_op(subset, Operation::Delete, sink)?;
        let lease = self.acquire(subset, Operation::Delete, sink)?;

        let eraser = ArchiveEraser::new(lease.session());
        eraser.delete(subset, sink).await
    }

    fn check_op(
        &self,
        subset: &WorkingSubset,
        requested: Operation,
        sink: &dyn ProgressSink,
    ) -> ArchiveResult<()> {
        if subset.op == requested {
            return Ok(());
        }
        let err = ArchiveError::OperationMismatch {
            expected: subset.op,
            actual: requested,
        };
        Err(self.fail_subset(subset, requested, sink, err))
    }

    fn acquire(
        &self,
        subset: &WorkingSubset,
        op: Operation,
        sink: &dyn ProgressSink,
    ) -> ArchiveResult<SessionLease> {
        self.pool
            .acquire()
            .map_err(|err| self.fail_subset(subset, op, sink, err))
    }

    /// Reports every file of the subset as failed with the fatal cause,
    /// then hands the error back for propagation.
    fn fail_subset(
        &self,
        subset: &WorkingSubset,
        op: Operation,
        sink: &dyn ProgressSink,
        err: ArchiveError,
    ) -> ArchiveError {
        let cause = err.to_string();
        warn!(subset = %subset.id, error = %cause, "subset-fatal failure");
        for file in &subset.files {
            let checksum = file.checksum.clone();
            let outcome = match op {
                Operation::Store => ProgressOutcome::StoreFailed {
                    checksum,
                    cause: cause.clone(),
                },
                Operation::Retrieve => ProgressOutcome::RetrieveFailed {
                    checksum,
                    cause: cause.clone(),
                },
                Operation::Delete => ProgressOutcome::DeleteFailed {
                    checksum,
                    cause: cause.clone(),
                },
            };
            sink.report(outcome);
        }
        err
    }
}
