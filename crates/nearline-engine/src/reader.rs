//! Archive reader: restores one RETRIEVE working subset into a destination
//! directory.
//!
//! Each file's reference is decoded and dispatched: whole objects fetch
//! directly, bundle members extract by name, split files reassemble from
//! their parts in order. Destination files are written through a hidden
//! partial file and renamed into place, so a failed retrieval never leaves
//! a corrupt destination behind. Outcomes are independent per file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use nearline_core::{
    ArchiveError, ArchiveResult, CandidateFile, PhysicalReference, ProgressOutcome, ProgressSink,
    WorkingSubset,
};

use crate::session::ArchiveSession;

/// Statistics for one retrieve execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReaderStats {
    /// Files retrieved successfully.
    pub files_retrieved: u64,
    /// Files that failed to retrieve.
    pub files_failed: u64,
    /// Split-file parts fetched.
    pub parts_fetched: u64,
    /// Total bytes written to the destination directory.
    pub bytes_written: u64,
}

/// Destination file written via a hidden temp path, renamed on commit and
/// removed on drop if never committed.
struct PartialFile {
    tmp: PathBuf,
    dest: PathBuf,
    file: fs::File,
    committed: bool,
    bytes: u64,
}

impl PartialFile {
    fn create(dest: &Path) -> ArchiveResult<Self> {
        let file_name = dest
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("download");
        let tmp = dest.with_file_name(format!(".{}.partial", file_name));
        let file = fs::File::create(&tmp)?;
        Ok(Self {
            tmp,
            dest: dest.to_path_buf(),
            file,
            committed: false,
            bytes: 0,
        })
    }

    fn append(&mut self, data: &[u8]) -> ArchiveResult<()> {
        self.file.write_all(data)?;
        self.bytes += data.len() as u64;
        Ok(())
    }

    fn commit(mut self) -> ArchiveResult<(PathBuf, u64)> {
        fs::rename(&self.tmp, &self.dest)?;
        self.committed = true;
        Ok((self.dest.clone(), self.bytes))
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.tmp);
        }
    }
}

/// Reader for RETRIEVE working subsets.
pub struct ArchiveReader<'a> {
    session: &'a dyn ArchiveSession,
}

impl<'a> ArchiveReader<'a> {
    /// Creates a reader over one session lease.
    pub fn new(session: &'a dyn ArchiveSession) -> Self {
        Self { session }
    }

    /// Retrieves every file of the subset into `dest_dir`, emitting one
    /// outcome per file.
    pub async fn retrieve(
        &self,
        subset: &WorkingSubset,
        dest_dir: &Path,
        sink: &dyn ProgressSink,
    ) -> ArchiveResult<ReaderStats> {
        let mut stats = ReaderStats::default();
        debug!(subset = %subset.id, files = subset.files.len(), dest = %dest_dir.display(), "retrieving working subset");

        for file in &subset.files {
            match self.retrieve_file(file, dest_dir, &mut stats).await {
                Ok((path, bytes)) => {
                    stats.files_retrieved += 1;
                    stats.bytes_written += bytes;
                    sink.report(ProgressOutcome::Retrieved {
                        checksum: file.checksum.clone(),
                        path,
                    });
                }
                Err(err) => {
                    warn!(checksum = %file.checksum, error = %err, "retrieve failed");
                    stats.files_failed += 1;
                    sink.report(ProgressOutcome::RetrieveFailed {
                        checksum: file.checksum.clone(),
                        cause: err.to_string(),
                    });
                }
            }
        }

        Ok(stats)
    }

    async fn retrieve_file(
        &self,
        file: &CandidateFile,
        dest_dir: &Path,
        stats: &mut ReaderStats,
    ) -> ArchiveResult<(PathBuf, u64)> {
        let encoded =
            file.reference
                .as_deref()
                .ok_or_else(|| ArchiveError::MissingReference {
                    checksum: file.checksum.clone(),
                })?;
        let reference = PhysicalReference::decode(encoded)?;
        let dest = dest_dir.join(&file.name);

        match reference {
            PhysicalReference::Direct { path, .. } => {
                let data = self.session.get_object(&path).await?;
                let mut partial = PartialFile::create(&dest)?;
                partial.append(&data)?;
                partial.commit()
            }
            PhysicalReference::BundleMember {
                path, member_name, ..
            } => {
                let data = self.session.get_bundle_member(&path, &member_name).await?;
                let mut partial = PartialFile::create(&dest)?;
                partial.append(&data)?;
                partial.commit()
            }
            PhysicalReference::SplitParts {
                path, part_count, ..
            } => {
                let mut partial = PartialFile::create(&dest)?;
                let parts = self.session.get_parts(&path, part_count).await?;
                for part in parts {
                    partial.append(&part)?;
                    stats.parts_fetched += 1;
                }
                partial.commit()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{assemble, encode_bundle};
    use crate::session::MockArchiveSession;
    use nearline_core::{Operation, RecordingSink};
    use uuid::Uuid;

    fn retrieve_candidate(name: &str, reference: Option<&str>) -> CandidateFile {
        CandidateFile {
            checksum: format!("blake3:{}", name),
            size_bytes: 0,
            content_type: "application/octet-stream".to_string(),
            name: name.to_string(),
            sources: Vec::new(),
            dest_node: "projects/alpha".to_string(),
            strategy: None,
            reference: reference.map(|r| r.to_string()),
        }
    }

    fn subset(files: Vec<CandidateFile>) -> WorkingSubset {
        WorkingSubset {
            id: Uuid::new_v4(),
            dest_node: "projects/alpha".to_string(),
            op: Operation::Retrieve,
            files,
        }
    }

    #[tokio::test]
    async fn test_retrieve_direct() {
        let session = MockArchiveSession::new();
        session
            .put_object("projects/alpha/a.bin", vec![9u8; 128])
            .await
            .unwrap();
        let dest = tempfile::tempdir().unwrap();
        let sink = RecordingSink::new();
        let file = retrieve_candidate("a.bin", Some("nearline://vault/projects/alpha/a.bin"));

        let reader = ArchiveReader::new(&session);
        let stats = reader
            .retrieve(&subset(vec![file]), dest.path(), &sink)
            .await
            .unwrap();

        assert_eq!(stats.files_retrieved, 1);
        assert_eq!(stats.bytes_written, 128);
        assert_eq!(fs::read(dest.path().join("a.bin")).unwrap(), vec![9u8; 128]);
    }

    #[tokio::test]
    async fn test_retrieve_bundle_member() {
        let session = MockArchiveSession::new();
        let mut data = Vec::new();
        data.extend_from_slice(b"aaaa");
        data.extend_from_slice(b"bbbbbb");
        let bundle = assemble(
            &[("a.txt".to_string(), 4), ("b.txt".to_string(), 6)],
            data,
        );
        session
            .put_object("node/bundle-1.nlb", encode_bundle(&bundle).unwrap())
            .await
            .unwrap();

        let dest = tempfile::tempdir().unwrap();
        let sink = RecordingSink::new();
        let file = retrieve_candidate(
            "b.txt",
            Some("nearline://vault/node/bundle-1.nlb?filename=b.txt"),
        );

        let reader = ArchiveReader::new(&session);
        let stats = reader
            .retrieve(&subset(vec![file]), dest.path(), &sink)
            .await
            .unwrap();

        assert_eq!(stats.files_retrieved, 1);
        assert_eq!(fs::read(dest.path().join("b.txt")).unwrap(), b"bbbbbb");
    }

    #[tokio::test]
    async fn test_retrieve_missing_member_isolated() {
        let session = MockArchiveSession::new();
        let bundle = assemble(&[("a.txt".to_string(), 4)], b"aaaa".to_vec());
        session
            .put_object("node/bundle-1.nlb", encode_bundle(&bundle).unwrap())
            .await
            .unwrap();

        let dest = tempfile::tempdir().unwrap();
        let sink = RecordingSink::new();
        let present = retrieve_candidate(
            "a.txt",
            Some("nearline://vault/node/bundle-1.nlb?filename=a.txt"),
        );
        let absent = retrieve_candidate(
            "ghost.txt",
            Some("nearline://vault/node/bundle-1.nlb?filename=ghost.txt"),
        );

        let reader = ArchiveReader::new(&session);
        let stats = reader
            .retrieve(&subset(vec![absent, present]), dest.path(), &sink)
            .await
            .unwrap();

        assert_eq!(stats.files_retrieved, 1);
        assert_eq!(stats.files_failed, 1);
        assert!(dest.path().join("a.txt").is_file());
        assert!(!dest.path().join("ghost.txt").exists());

        let outcomes = sink.outcomes();
        match &outcomes[0] {
            ProgressOutcome::RetrieveFailed { cause, .. } => {
                assert!(cause.contains("not found in bundle"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retrieve_split_parts_in_order() {
        let session = MockArchiveSession::new();
        session
            .put_parts(
                "node/big.iso",
                vec![vec![1u8; 10], vec![2u8; 10], vec![3u8; 5]],
            )
            .await
            .unwrap();

        let dest = tempfile::tempdir().unwrap();
        let sink = RecordingSink::new();
        let file = retrieve_candidate("big.iso", Some("nearline://vault/node/big.iso?parts=3"));

        let reader = ArchiveReader::new(&session);
        let stats = reader
            .retrieve(&subset(vec![file]), dest.path(), &sink)
            .await
            .unwrap();

        assert_eq!(stats.parts_fetched, 3);
        let mut expected = vec![1u8; 10];
        expected.extend_from_slice(&[2u8; 10]);
        expected.extend_from_slice(&[3u8; 5]);
        assert_eq!(fs::read(dest.path().join("big.iso")).unwrap(), expected);
    }

    #[tokio::test]
    async fn test_missing_part_leaves_no_partial_output() {
        let session = MockArchiveSession::new();
        session
            .put_parts("node/big.iso", vec![vec![1u8; 10]])
            .await
            .unwrap();

        let dest = tempfile::tempdir().unwrap();
        let sink = RecordingSink::new();
        let file = retrieve_candidate("big.iso", Some("nearline://vault/node/big.iso?parts=2"));

        let reader = ArchiveReader::new(&session);
        let stats = reader
            .retrieve(&subset(vec![file]), dest.path(), &sink)
            .await
            .unwrap();

        assert_eq!(stats.files_failed, 1);
        assert!(!dest.path().join("big.iso").exists());
        let leftovers: Vec<_> = fs::read_dir(dest.path()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_reference_isolated() {
        let session = MockArchiveSession::new();
        session
            .put_object("projects/alpha/a.bin", vec![1u8; 8])
            .await
            .unwrap();

        let dest = tempfile::tempdir().unwrap();
        let sink = RecordingSink::new();
        let bad = retrieve_candidate("bad.bin", Some("nearline://vault/p?parts=abc"));
        let none = retrieve_candidate("none.bin", None);
        let good = retrieve_candidate("a.bin", Some("nearline://vault/projects/alpha/a.bin"));

        let reader = ArchiveReader::new(&session);
        let stats = reader
            .retrieve(&subset(vec![bad, none, good]), dest.path(), &sink)
            .await
            .unwrap();

        assert_eq!(stats.files_retrieved, 1);
        assert_eq!(stats.files_failed, 2);
        assert_eq!(sink.len(), 3);
    }

}
