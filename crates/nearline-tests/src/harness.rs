//! Test Harness - fixtures for exercising the archiving engine end-to-end

use std::path::{Path, PathBuf};

use rand::RngCore;
use tempfile::TempDir;

use nearline_core::{content_checksum, CandidateFile, SourceLocation};

/// Self-cleaning test environment with staged source files and room for a
/// workspace and a retrieval destination.
#[derive(Debug)]
pub struct TestEnv {
    temp_dir: TempDir,
    test_name: String,
}

impl TestEnv {
    /// Creates a fresh environment for the named test.
    pub fn new(test_name: &str) -> Self {
        let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
        Self {
            temp_dir,
            test_name: test_name.to_string(),
        }
    }

    /// Root of the environment's temp directory.
    pub fn tempdir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Name of the test this environment belongs to.
    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    /// Directory for staged source files, created on first use.
    pub fn source_dir(&self) -> PathBuf {
        let dir = self.temp_dir.path().join("sources");
        std::fs::create_dir_all(&dir).expect("failed to create source dir");
        dir
    }

    /// Workspace root for the engine's scratch area.
    pub fn workspace_root(&self) -> PathBuf {
        self.temp_dir.path().join("workspace")
    }

    /// Destination directory for retrievals, created on first use.
    pub fn dest_dir(&self) -> PathBuf {
        let dir = self.temp_dir.path().join("restored");
        std::fs::create_dir_all(&dir).expect("failed to create dest dir");
        dir
    }
}

/// Installs a fmt tracing subscriber honoring `RUST_LOG`, once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Generates a random payload of the given length.
pub fn random_payload(len: usize) -> Vec<u8> {
    let mut payload = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut payload);
    payload
}

/// Writes a payload file into `dir` and builds its store candidate.
pub fn stage_file(dir: &Path, name: &str, dest_node: &str, payload: &[u8]) -> CandidateFile {
    let path = dir.join(name);
    std::fs::write(&path, payload).expect("failed to stage source file");
    CandidateFile {
        checksum: content_checksum(payload),
        size_bytes: payload.len() as u64,
        content_type: "application/octet-stream".to_string(),
        name: name.to_string(),
        sources: vec![SourceLocation::Local(path)],
        dest_node: dest_node.to_string(),
        strategy: None,
        reference: None,
    }
}
