//! Per-file progress reporting.
//!
//! Outcomes are pushed through an explicit sink capability passed into each
//! execute call, synchronously, as they become known. Exactly one outcome is
//! emitted per file per operation; outcomes are never retracted, duplicated,
//! or buffered to the end of the batch.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Per-file result of a store, retrieve, or delete operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressOutcome {
    /// The file was stored; carries the encoded physical reference.
    Stored {
        /// Content checksum of the file.
        checksum: String,
        /// Encoded physical reference suitable for persistence.
        reference: String,
    },
    /// The file could not be stored.
    StoreFailed {
        /// Content checksum of the file.
        checksum: String,
        /// Description of the cause.
        cause: String,
    },
    /// The file was retrieved to the given destination path.
    Retrieved {
        /// Content checksum of the file.
        checksum: String,
        /// Local path the content was written to.
        path: PathBuf,
    },
    /// The file could not be retrieved.
    RetrieveFailed {
        /// Content checksum of the file.
        checksum: String,
        /// Description of the cause.
        cause: String,
    },
    /// The file's physical unit(s) were logically removed.
    Deleted {
        /// Content checksum of the file.
        checksum: String,
    },
    /// The file could not be deleted.
    DeleteFailed {
        /// Content checksum of the file.
        checksum: String,
        /// Description of the cause.
        cause: String,
    },
}

impl ProgressOutcome {
    /// Content checksum of the file this outcome is about.
    pub fn checksum(&self) -> &str {
        match self {
            ProgressOutcome::Stored { checksum, .. }
            | ProgressOutcome::StoreFailed { checksum, .. }
            | ProgressOutcome::Retrieved { checksum, .. }
            | ProgressOutcome::RetrieveFailed { checksum, .. }
            | ProgressOutcome::Deleted { checksum }
            | ProgressOutcome::DeleteFailed { checksum, .. } => checksum,
        }
    }

    /// Whether this outcome reports a failure.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ProgressOutcome::StoreFailed { .. }
                | ProgressOutcome::RetrieveFailed { .. }
                | ProgressOutcome::DeleteFailed { .. }
        )
    }
}

/// Callback capability receiving one outcome per file as execution proceeds.
pub trait ProgressSink: Send + Sync {
    /// Reports one per-file outcome. Called synchronously during execution.
    fn report(&self, outcome: ProgressOutcome);
}

/// Sink that records every outcome in order, for tests and callers that
/// want to inspect results after an execute call.
#[derive(Debug, Default)]
pub struct RecordingSink {
    outcomes: Mutex<Vec<ProgressOutcome>>,
}

impl RecordingSink {
    /// Creates an empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all outcomes recorded so far, in emission order.
    pub fn outcomes(&self) -> Vec<ProgressOutcome> {
        self.outcomes.lock().unwrap().clone()
    }

    /// Number of outcomes recorded so far.
    pub fn len(&self) -> usize {
        self.outcomes.lock().unwrap().len()
    }

    /// Whether no outcomes have been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.outcomes.lock().unwrap().is_empty()
    }

    /// Number of recorded success outcomes.
    pub fn success_count(&self) -> usize {
        self.outcomes
            .lock()
            .unwrap()
            .iter()
            .filter(|o| !o.is_failure())
            .count()
    }

    /// Number of recorded failure outcomes.
    pub fn failure_count(&self) -> usize {
        self.outcomes
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.is_failure())
            .count()
    }
}

impl ProgressSink for RecordingSink {
    fn report(&self, outcome: ProgressOutcome) {
        self.outcomes.lock().unwrap().push(outcome);
    }
}
