//! Local scratch workspace for assembling bundles and parts before
//! transfer.
//!
//! The workspace root must be writable; each execute call gets its own
//! scratch subdirectory that is removed on every exit path, so an
//! interrupted call never leaves a half-accumulated bundle behind.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use nearline_core::{ArchiveError, ArchiveResult};

/// A validated scratch workspace root.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Opens (creating if needed) a workspace root and probes writability.
    ///
    /// An unusable root is `WorkspaceUnavailable`, fatal for any subset
    /// that would need scratch space.
    pub fn new(root: impl Into<PathBuf>) -> ArchiveResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| ArchiveError::WorkspaceUnavailable {
            path: root.clone(),
            reason: e.to_string(),
        })?;

        let probe = root.join(format!(".probe-{}", Uuid::new_v4()));
        fs::write(&probe, b"probe").map_err(|e| ArchiveError::WorkspaceUnavailable {
            path: root.clone(),
            reason: format!("not writable: {}", e),
        })?;
        let _ = fs::remove_file(&probe);

        debug!(root = %root.display(), "workspace opened");
        Ok(Self { root })
    }

    /// The workspace root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the scratch directory for one subset execution.
    pub fn scratch(&self, subset_id: Uuid) -> ArchiveResult<Scratch> {
        let dir = self.root.join(format!("subset-{}", subset_id));
        fs::create_dir_all(&dir).map_err(|e| ArchiveError::WorkspaceUnavailable {
            path: dir.clone(),
            reason: e.to_string(),
        })?;
        Ok(Scratch { dir })
    }
}

/// Scratch directory for one execute call, removed on drop.
#[derive(Debug)]
pub struct Scratch {
    dir: PathBuf,
}

impl Scratch {
    /// The scratch directory path.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for a named staging file inside this scratch area.
    pub fn staging_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(dir = %self.dir.display(), error = %e, "failed to clean scratch dir");
            }
        } else {
            debug!(dir = %self.dir.display(), "scratch dir removed");
        }
    }
}
