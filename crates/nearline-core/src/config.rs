//! Configuration for the nearline archiving engine.
//!
//! All thresholds are required and positive; `tar_size_threshold` must stay
//! strictly below `max_file_size`. Violations are fatal at startup, never
//! per-file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, ArchiveResult};

/// Configuration for classification thresholds, bundling, and batching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Logical name of the remote archive, embedded in physical references.
    pub archive_name: String,
    /// Minimum accepted file size in bytes.
    pub min_file_size: u64,
    /// Maximum size of a single physical object; larger files are split.
    pub max_file_size: u64,
    /// Files below this size are bundled to amortize session overhead.
    pub tar_size_threshold: u64,
    /// Maximum cumulative payload size of one bundle.
    pub max_tar_size: u64,
    /// Maximum age of a bundle-in-progress before it is flushed.
    pub max_tar_archiving_hours: u64,
    /// Maximum number of files in one working subset.
    pub max_subset_size: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            archive_name: "nearline".to_string(),
            min_file_size: 1,
            max_file_size: 256 * 1024 * 1024,
            tar_size_threshold: 1024 * 1024,
            max_tar_size: 64 * 1024 * 1024,
            max_tar_archiving_hours: 24,
            max_subset_size: 1000,
        }
    }
}

impl ArchiveConfig {
    /// Checks the startup invariants on the configured thresholds.
    ///
    /// Returns `InvalidThresholds` on the first violated invariant.
    pub fn validate(&self) -> ArchiveResult<()> {
        if self.archive_name.is_empty() {
            return Err(ArchiveError::InvalidThresholds {
                reason: "archive_name must not be empty".to_string(),
            });
        }
        for (name, value) in [
            ("min_file_size", self.min_file_size),
            ("max_file_size", self.max_file_size),
            ("tar_size_threshold", self.tar_size_threshold),
            ("max_tar_size", self.max_tar_size),
            ("max_tar_archiving_hours", self.max_tar_archiving_hours),
            ("max_subset_size", self.max_subset_size),
        ] {
            if value == 0 {
                return Err(ArchiveError::InvalidThresholds {
                    reason: format!("{} must be positive", name),
                });
            }
        }
        if self.tar_size_threshold >= self.max_file_size {
            return Err(ArchiveError::InvalidThresholds {
                reason: format!(
                    "tar_size_threshold ({}) must be below max_file_size ({})",
                    self.tar_size_threshold, self.max_file_size
                ),
            });
        }
        if self.min_file_size > self.tar_size_threshold {
            return Err(ArchiveError::InvalidThresholds {
                reason: format!(
                    "min_file_size ({}) must not exceed tar_size_threshold ({})",
                    self.min_file_size, self.tar_size_threshold
                ),
            });
        }
        Ok(())
    }

    /// Loads a configuration from a TOML or JSON file, selected by extension.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => {
                let config: ArchiveConfig = toml::from_str(&contents)?;
                Ok(config)
            }
            "json" => {
                let config: ArchiveConfig = serde_json::from_str(&contents)?;
                Ok(config)
            }
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        }
    }
}
