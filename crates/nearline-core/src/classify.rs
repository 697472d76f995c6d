//! Size-based classification of candidate files into storage strategies.

use serde::{Deserialize, Serialize};

use crate::config::ArchiveConfig;

/// Storage strategy for one candidate file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageStrategy {
    /// Stored as a single physical object.
    Normal,
    /// Split into sequentially-numbered parts no larger than `max_file_size`.
    Cut,
    /// Bundled with other small files into one physical object.
    Tar,
}

impl std::fmt::Display for StorageStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageStrategy::Normal => write!(f, "normal"),
            StorageStrategy::Cut => write!(f, "cut"),
            StorageStrategy::Tar => write!(f, "tar"),
        }
    }
}

/// Classifies a file by size. Pure and deterministic; both boundary values
/// (`tar_size_threshold` and `max_file_size`) classify as `Normal`.
pub fn classify(size_bytes: u64, config: &ArchiveConfig) -> StorageStrategy {
    if size_bytes < config.tar_size_threshold {
        StorageStrategy::Tar
    } else if size_bytes <= config.max_file_size {
        StorageStrategy::Normal
    } else {
        StorageStrategy::Cut
    }
}
