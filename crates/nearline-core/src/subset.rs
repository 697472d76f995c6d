//! Working subset builder: groups candidate files into bounded execution
//! batches.
//!
//! A working subset is an ordered collection of candidate files sharing a
//! destination node and an operation, bounded by `max_subset_size`. It is
//! built once, immutable after that, and consumed by exactly one execute
//! call.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::candidate::CandidateFile;
use crate::classify::classify;
use crate::config::ArchiveConfig;
use crate::error::ArchiveError;

/// Operation a subset is prepared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Transfer files into the remote archive.
    Store,
    /// Fetch files back out of the remote archive.
    Retrieve,
    /// Logically remove files from the remote archive.
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Store => write!(f, "Store"),
            Operation::Retrieve => write!(f, "Retrieve"),
            Operation::Delete => write!(f, "Delete"),
        }
    }
}

/// A bounded batch of candidate files for one execute call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingSubset {
    /// Unique id of this subset, also used to name its scratch area.
    pub id: Uuid,
    /// Destination node shared by every file in the subset.
    pub dest_node: String,
    /// Operation this subset was prepared for.
    pub op: Operation,
    /// The files, in stable preparation order.
    pub files: Vec<CandidateFile>,
}

/// A file excluded from all subsets at prepare time, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcludedFile {
    /// The excluded candidate.
    pub file: CandidateFile,
    /// Human-readable exclusion cause.
    pub reason: String,
}

/// Result of a prepare call: the subsets plus every excluded file.
///
/// Together they partition the input set: each input file appears exactly
/// once, either in one subset or in the excluded list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreparedBatch {
    /// The working subsets, grouped per destination node.
    pub subsets: Vec<WorkingSubset>,
    /// Files excluded from all subsets, with reasons.
    pub excluded: Vec<ExcludedFile>,
}

impl PreparedBatch {
    /// Total number of files across all subsets.
    pub fn file_count(&self) -> usize {
        self.subsets.iter().map(|s| s.files.len()).sum()
    }
}

/// Groups candidate files into working subsets per destination node.
pub struct SubsetBuilder<'a> {
    config: &'a ArchiveConfig,
}

impl<'a> SubsetBuilder<'a> {
    /// Creates a builder over the given configuration.
    pub fn new(config: &'a ArchiveConfig) -> Self {
        Self { config }
    }

    /// Groups files into subsets for the given operation.
    ///
    /// For `Store`, files without any reachable source are excluded and
    /// reported; the rest get their archiving strategy assigned. For
    /// `Retrieve` and `Delete` the grouping is by destination node only.
    /// An empty input yields an empty batch.
    pub fn prepare(&self, files: Vec<CandidateFile>, op: Operation) -> PreparedBatch {
        let mut excluded = Vec::new();
        let mut by_node: BTreeMap<String, Vec<CandidateFile>> = BTreeMap::new();

        for mut file in files {
            if op == Operation::Store {
                if file.resolve_source().is_none() {
                    let reason = ArchiveError::UnreachableSource {
                        checksum: file.checksum.clone(),
                    }
                    .to_string();
                    debug!(checksum = %file.checksum, "excluding file with no reachable source");
                    excluded.push(ExcludedFile { file, reason });
                    continue;
                }
                file.strategy = Some(classify(file.size_bytes, self.config));
            }
            by_node.entry(file.dest_node.clone()).or_default().push(file);
        }

        let max = self.config.max_subset_size as usize;
        let mut subsets = Vec::new();
        for (dest_node, node_files) in by_node {
            let mut chunk = Vec::new();
            for file in node_files {
                chunk.push(file);
                if chunk.len() == max {
                    subsets.push(Self::subset(&dest_node, op, std::mem::take(&mut chunk)));
                }
            }
            if !chunk.is_empty() {
                subsets.push(Self::subset(&dest_node, op, chunk));
            }
        }

        debug!(
            subsets = subsets.len(),
            excluded = excluded.len(),
            op = %op,
            "prepared working subsets"
        );
        PreparedBatch { subsets, excluded }
    }

    fn subset(dest_node: &str, op: Operation, files: Vec<CandidateFile>) -> WorkingSubset {
        WorkingSubset {
            id: Uuid::new_v4(),
            dest_node: dest_node.to_string(),
            op,
            files,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::SourceLocation;
    use crate::classify::StorageStrategy;
    use std::io::Write;
    use std::path::PathBuf;

    fn reachable_file(name: &str, node: &str, size: u64, dir: &tempfile::TempDir) -> CandidateFile {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&vec![0u8; size.min(64) as usize]).unwrap();
        CandidateFile {
            checksum: format!("blake3:{}", name),
            size_bytes: size,
            content_type: "application/octet-stream".to_string(),
            name: name.to_string(),
            sources: vec![SourceLocation::Local(path)],
            dest_node: node.to_string(),
            strategy: None,
            reference: None,
        }
    }

    fn unreachable_file(name: &str, node: &str) -> CandidateFile {
        CandidateFile {
            checksum: format!("blake3:{}", name),
            size_bytes: 100,
            content_type: "application/octet-stream".to_string(),
            name: name.to_string(),
            sources: vec![SourceLocation::Local(PathBuf::from("/nonexistent").join(name))],
            dest_node: node.to_string(),
            strategy: None,
            reference: None,
        }
    }

    fn config(max_subset_size: u64) -> ArchiveConfig {
        ArchiveConfig {
            tar_size_threshold: 5000,
            max_file_size: 15000,
            max_subset_size,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_input_yields_empty_batch() {
        let cfg = config(10);
        let batch = SubsetBuilder::new(&cfg).prepare(Vec::new(), Operation::Store);
        assert!(batch.subsets.is_empty());
        assert!(batch.excluded.is_empty());
    }

    #[test]
    fn test_store_excludes_unreachable_sources() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(10);
        let files = vec![
            reachable_file("a.bin", "node", 100, &dir),
            unreachable_file("b.bin", "node"),
            reachable_file("c.bin", "node", 100, &dir),
        ];

        let batch = SubsetBuilder::new(&cfg).prepare(files, Operation::Store);

        assert_eq!(batch.file_count(), 2);
        assert_eq!(batch.excluded.len(), 1);
        assert_eq!(batch.excluded[0].file.name, "b.bin");
        assert!(batch.excluded[0].reason.contains("Unreachable source"));
    }

    #[test]
    fn test_store_assigns_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(10);
        let files = vec![
            reachable_file("small.bin", "node", 100, &dir),
            reachable_file("mid.bin", "node", 10000, &dir),
            reachable_file("big.bin", "node", 20000, &dir),
        ];

        let batch = SubsetBuilder::new(&cfg).prepare(files, Operation::Store);
        let subset = &batch.subsets[0];

        let strategy_of = |name: &str| {
            subset
                .files
                .iter()
                .find(|f| f.name == name)
                .unwrap()
                .strategy
        };
        assert_eq!(strategy_of("small.bin"), Some(StorageStrategy::Tar));
        assert_eq!(strategy_of("mid.bin"), Some(StorageStrategy::Normal));
        assert_eq!(strategy_of("big.bin"), Some(StorageStrategy::Cut));
    }

    #[test]
    fn test_grouping_by_destination_node() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(10);
        let files = vec![
            reachable_file("a.bin", "node/one", 100, &dir),
            reachable_file("b.bin", "node/two", 100, &dir),
            reachable_file("c.bin", "node/one", 100, &dir),
        ];

        let batch = SubsetBuilder::new(&cfg).prepare(files, Operation::Store);

        assert_eq!(batch.subsets.len(), 2);
        let one = batch.subsets.iter().find(|s| s.dest_node == "node/one").unwrap();
        let two = batch.subsets.iter().find(|s| s.dest_node == "node/two").unwrap();
        assert_eq!(one.files.len(), 2);
        assert_eq!(two.files.len(), 1);
    }

    #[test]
    fn test_cardinality_split_emits_multiple_subsets_for_one_node() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(2);
        let files: Vec<_> = (0..5)
            .map(|i| reachable_file(&format!("f{}.bin", i), "node", 100, &dir))
            .collect();

        let batch = SubsetBuilder::new(&cfg).prepare(files, Operation::Store);

        assert_eq!(batch.subsets.len(), 3);
        let sizes: Vec<_> = batch.subsets.iter().map(|s| s.files.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert!(batch.subsets.iter().all(|s| s.dest_node == "node"));
    }

    #[test]
    fn test_partition_property() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(3);
        let mut files = vec![unreachable_file("gone.bin", "node/one")];
        for i in 0..7 {
            let node = if i % 2 == 0 { "node/one" } else { "node/two" };
            files.push(reachable_file(&format!("f{}.bin", i), node, 100, &dir));
        }
        let input_checksums: Vec<String> = files.iter().map(|f| f.checksum.clone()).collect();

        let batch = SubsetBuilder::new(&cfg).prepare(files, Operation::Store);

        let mut seen: Vec<String> = batch
            .subsets
            .iter()
            .flat_map(|s| s.files.iter().map(|f| f.checksum.clone()))
            .chain(batch.excluded.iter().map(|e| e.file.checksum.clone()))
            .collect();
        seen.sort();
        let mut expected = input_checksums;
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_retrieve_skips_reachability_and_strategy() {
        let cfg = config(10);
        let mut file = unreachable_file("a.bin", "node");
        file.reference = Some("nearline://vault/node/a.bin".to_string());

        let batch = SubsetBuilder::new(&cfg).prepare(vec![file], Operation::Retrieve);

        assert!(batch.excluded.is_empty());
        assert_eq!(batch.subsets.len(), 1);
        assert_eq!(batch.subsets[0].op, Operation::Retrieve);
        assert_eq!(batch.subsets[0].files[0].strategy, None);
    }

    #[test]
    fn test_delete_groups_by_node_only() {
        let cfg = config(10);
        let files = vec![
            unreachable_file("a.bin", "node/one"),
            unreachable_file("b.bin", "node/two"),
        ];

        let batch = SubsetBuilder::new(&cfg).prepare(files, Operation::Delete);

        assert_eq!(batch.subsets.len(), 2);
        assert!(batch.excluded.is_empty());
    }

    #[test]
    fn test_subset_ids_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(1);
        let files: Vec<_> = (0..4)
            .map(|i| reachable_file(&format!("f{}.bin", i), "node", 100, &dir))
            .collect();

        let batch = SubsetBuilder::new(&cfg).prepare(files, Operation::Store);

        let mut ids: Vec<_> = batch.subsets.iter().map(|s| s.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }
}
