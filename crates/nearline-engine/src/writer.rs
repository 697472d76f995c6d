//! Archive writer: stores one STORE working subset against the remote
//! archive.
//!
//! Files are processed in a stable order grouped by strategy: Normal files
//! transfer individually, Cut files stream out as sequentially-numbered
//! parts, Tar candidates accumulate into a bundle-in-progress staged in the
//! scratch workspace and flushed on size/age thresholds or at subset
//! exhaustion. Every file gets exactly one outcome through the progress
//! sink; one file's failure never aborts its siblings.

use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use nearline_core::{
    classify, object_path, part_path, ArchiveConfig, ArchiveError, ArchiveResult, CandidateFile,
    PhysicalReference, ProgressOutcome, ProgressSink, StorageStrategy, WorkingSubset,
};

use crate::bundle::{assemble, encode_bundle};
use crate::session::ArchiveSession;
use crate::workspace::Scratch;

/// Statistics for one store execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriterStats {
    /// Files stored successfully.
    pub files_stored: u64,
    /// Files that failed to store.
    pub files_failed: u64,
    /// Bundles flushed to the archive.
    pub bundles_flushed: u64,
    /// Split-file parts written.
    pub parts_written: u64,
    /// Total bytes transferred to the archive.
    pub bytes_transferred: u64,
}

/// One member accumulated in a bundle-in-progress.
#[derive(Debug)]
struct PendingMember {
    file: CandidateFile,
    len: u64,
}

/// Bundle-in-progress: member payloads appended to a scratch staging file.
///
/// Exclusively owned by the writer invocation handling one subset; never
/// shared. The staging file lives in the subset's scratch dir, so an
/// interrupted call is cleaned up by the scratch guard.
struct BundleState {
    staging: PathBuf,
    file: fs::File,
    members: Vec<PendingMember>,
    bytes: u64,
    started_at: Instant,
}

impl BundleState {
    fn open(scratch: &Scratch) -> ArchiveResult<Self> {
        let staging = scratch.staging_path(&format!("bundle-{}.staging", Uuid::new_v4()));
        let file = fs::File::create(&staging)?;
        Ok(Self {
            staging,
            file,
            members: Vec::new(),
            bytes: 0,
            started_at: Instant::now(),
        })
    }

    fn has_member_named(&self, name: &str) -> bool {
        self.members.iter().any(|m| m.file.name == name)
    }

    fn append(&mut self, file: &CandidateFile, payload: &[u8]) -> ArchiveResult<()> {
        if let Err(e) = self.file.write_all(payload) {
            // Roll the staging file back to the last good length.
            let _ = self.file.set_len(self.bytes);
            let _ = self.file.seek(SeekFrom::Start(self.bytes));
            return Err(e.into());
        }
        self.members.push(PendingMember {
            file: file.clone(),
            len: payload.len() as u64,
        });
        self.bytes += payload.len() as u64;
        Ok(())
    }

    fn age(&self) -> Duration {
        self.started_at.elapsed()
    }

    fn discard(self) {
        let _ = fs::remove_file(&self.staging);
    }
}

/// Writer for STORE working subsets.
pub struct ArchiveWriter<'a> {
    config: &'a ArchiveConfig,
    session: &'a dyn ArchiveSession,
    scratch: &'a Scratch,
}

impl<'a> ArchiveWriter<'a> {
    /// Creates a writer over one session lease and one scratch area.
    pub fn new(
        config: &'a ArchiveConfig,
        session: &'a dyn ArchiveSession,
        scratch: &'a Scratch,
    ) -> Self {
        Self {
            config,
            session,
            scratch,
        }
    }

    /// Stores every file of the subset, emitting one outcome per file.
    pub async fn store(
        &self,
        subset: &WorkingSubset,
        sink: &dyn ProgressSink,
    ) -> ArchiveResult<WriterStats> {
        let mut stats = WriterStats::default();

        let mut normals = Vec::new();
        let mut cuts = Vec::new();
        let mut tars = Vec::new();
        for file in &subset.files {
            let strategy = file
                .strategy
                .unwrap_or_else(|| classify(file.size_bytes, self.config));
            match strategy {
                StorageStrategy::Normal => normals.push(file),
                StorageStrategy::Cut => cuts.push(file),
                StorageStrategy::Tar => tars.push(file),
            }
        }
        debug!(
            subset = %subset.id,
            normal = normals.len(),
            cut = cuts.len(),
            tar = tars.len(),
            "storing working subset"
        );

        for file in normals {
            match self.transfer_normal(file).await {
                Ok((reference, bytes)) => {
                    stats.files_stored += 1;
                    stats.bytes_transferred += bytes;
                    sink.report(ProgressOutcome::Stored {
                        checksum: file.checksum.clone(),
                        reference,
                    });
                }
                Err(err) => self.report_store_failure(file, err, sink, &mut stats),
            }
        }

        for file in cuts {
            match self.transfer_cut(file).await {
                Ok((reference, parts, bytes)) => {
                    stats.files_stored += 1;
                    stats.parts_written += parts;
                    stats.bytes_transferred += bytes;
                    sink.report(ProgressOutcome::Stored {
                        checksum: file.checksum.clone(),
                        reference,
                    });
                }
                Err(err) => self.report_store_failure(file, err, sink, &mut stats),
            }
        }

        self.store_bundled(&tars, sink, &mut stats).await;

        Ok(stats)
    }

    fn report_store_failure(
        &self,
        file: &CandidateFile,
        err: ArchiveError,
        sink: &dyn ProgressSink,
        stats: &mut WriterStats,
    ) {
        warn!(checksum = %file.checksum, error = %err, "store failed");
        stats.files_failed += 1;
        sink.report(ProgressOutcome::StoreFailed {
            checksum: file.checksum.clone(),
            cause: err.to_string(),
        });
    }

    fn read_source(&self, file: &CandidateFile) -> ArchiveResult<Vec<u8>> {
        let source = file
            .resolve_source()
            .ok_or_else(|| ArchiveError::UnreachableSource {
                checksum: file.checksum.clone(),
            })?;
        Ok(fs::read(source)?)
    }

    async fn transfer_normal(&self, file: &CandidateFile) -> ArchiveResult<(String, u64)> {
        let data = self.read_source(file)?;
        let bytes = data.len() as u64;
        let path = object_path(&file.dest_node, &file.name);

        self.session.put_object(&path, data).await?;
        debug!(path = %path, bytes, "stored normal file");

        let reference = PhysicalReference::Direct {
            archive: self.config.archive_name.clone(),
            path,
        };
        Ok((reference.encode(), bytes))
    }

    async fn transfer_cut(&self, file: &CandidateFile) -> ArchiveResult<(String, u64, u64)> {
        let source = file
            .resolve_source()
            .ok_or_else(|| ArchiveError::UnreachableSource {
                checksum: file.checksum.clone(),
            })?;
        let mut reader = fs::File::open(source)?;
        let size = reader.metadata()?.len();
        let part_size = self.config.max_file_size;
        let part_count = size.div_ceil(part_size);
        let prefix = object_path(&file.dest_node, &file.name);
        if part_count > u32::MAX as u64 {
            return Err(ArchiveError::TransferFailure {
                path: prefix,
                reason: format!("part count {} exceeds limit", part_count),
            });
        }

        let mut buf = vec![0u8; part_size as usize];
        for idx in 1..=part_count as u32 {
            let n = read_chunk(&mut reader, &mut buf)?;
            self.session
                .put_object(&part_path(&prefix, idx), buf[..n].to_vec())
                .await?;
        }
        debug!(prefix = %prefix, parts = part_count, bytes = size, "stored cut file");

        let reference = PhysicalReference::SplitParts {
            archive: self.config.archive_name.clone(),
            path: prefix,
            part_count: part_count as u32,
        };
        Ok((reference.encode(), part_count, size))
    }

    async fn store_bundled(
        &self,
        files: &[&CandidateFile],
        sink: &dyn ProgressSink,
        stats: &mut WriterStats,
    ) {
        let mut bundle: Option<BundleState> = None;

        for file in files {
            let payload = match self.read_source(file) {
                Ok(payload) => payload,
                Err(err) => {
                    self.report_store_failure(file, err, sink, stats);
                    continue;
                }
            };

            let needs_flush = bundle
                .as_ref()
                .is_some_and(|state| self.should_flush(state, payload.len() as u64));
            if needs_flush {
                if let Some(state) = bundle.take() {
                    self.flush_bundle(state, sink, stats).await;
                }
            }

            if bundle.is_none() {
                match BundleState::open(self.scratch) {
                    Ok(new_state) => bundle = Some(new_state),
                    Err(err) => {
                        self.report_store_failure(file, err, sink, stats);
                        continue;
                    }
                }
            }
            let state = match bundle.as_mut() {
                Some(state) => state,
                None => continue,
            };

            if state.has_member_named(&file.name) {
                self.report_store_failure(
                    file,
                    ArchiveError::DuplicateMember {
                        member: file.name.clone(),
                    },
                    sink,
                    stats,
                );
                continue;
            }
            if let Err(err) = state.append(file, &payload) {
                self.report_store_failure(file, err, sink, stats);
            }
        }

        // Whatever accumulated is flushed unconditionally at subset exhaustion.
        if let Some(state) = bundle.take() {
            self.flush_bundle(state, sink, stats).await;
        }
    }

    fn should_flush(&self, state: &BundleState, incoming: u64) -> bool {
        if state.members.is_empty() {
            return false;
        }
        if state.bytes + incoming > self.config.max_tar_size {
            return true;
        }
        self.is_expired(state.age())
    }

    fn is_expired(&self, age: Duration) -> bool {
        age >= Duration::from_secs(self.config.max_tar_archiving_hours * 3600)
    }

    async fn flush_bundle(
        &self,
        state: BundleState,
        sink: &dyn ProgressSink,
        stats: &mut WriterStats,
    ) {
        if state.members.is_empty() {
            state.discard();
            return;
        }

        match self.transfer_bundle(&state).await {
            Ok((path, bytes)) => {
                stats.bundles_flushed += 1;
                stats.bytes_transferred += bytes;
                debug!(path = %path, members = state.members.len(), "bundle flushed");
                for member in &state.members {
                    stats.files_stored += 1;
                    let reference = PhysicalReference::BundleMember {
                        archive: self.config.archive_name.clone(),
                        path: path.clone(),
                        member_name: member.file.name.clone(),
                    };
                    sink.report(ProgressOutcome::Stored {
                        checksum: member.file.checksum.clone(),
                        reference: reference.encode(),
                    });
                }
            }
            Err(err) => {
                // Member-level partial failure inside one physical transfer
                // is not distinguishable; every member fails with one cause.
                let cause = err.to_string();
                warn!(error = %cause, members = state.members.len(), "bundle transfer failed");
                for member in &state.members {
                    stats.files_failed += 1;
                    sink.report(ProgressOutcome::StoreFailed {
                        checksum: member.file.checksum.clone(),
                        cause: cause.clone(),
                    });
                }
            }
        }

        state.discard();
    }

    async fn transfer_bundle(&self, state: &BundleState) -> ArchiveResult<(String, u64)> {
        let data = fs::read(&state.staging)?;
        let members: Vec<(String, u64)> = state
            .members
            .iter()
            .map(|m| (m.file.name.clone(), m.len))
            .collect();
        let encoded = encode_bundle(&assemble(&members, data))?;
        let bytes = encoded.len() as u64;

        let dest_node = &state.members[0].file.dest_node;
        let path = object_path(dest_node, &format!("bundle-{}.nlb", Uuid::new_v4()));
        self.session.put_object(&path, encoded).await?;
        Ok((path, bytes))
    }
}

fn read_chunk(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
