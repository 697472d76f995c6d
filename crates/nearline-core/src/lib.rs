#![warn(missing_docs)]

//! Nearline core: candidate model, size classification, physical-reference
//! codec, and working-subset preparation for the tiered archiving engine.
//!
//! This crate holds the pure, session-free half of the engine: deciding how
//! a file will be stored, addressing it afterwards, and batching candidates
//! into bounded working subsets. The execution half lives in
//! `nearline-engine`.

pub mod candidate;
pub mod classify;
pub mod config;
pub mod error;
pub mod progress;
pub mod reference;
pub mod subset;

pub use candidate::{content_checksum, CandidateFile, SourceLocation};
pub use classify::{classify, StorageStrategy};
pub use config::ArchiveConfig;
pub use error::{ArchiveError, ArchiveResult};
pub use progress::{ProgressOutcome, ProgressSink, RecordingSink};
pub use reference::{object_path, part_path, DecodeError, PhysicalReference, REFERENCE_SCHEME};
pub use subset::{ExcludedFile, Operation, PreparedBatch, SubsetBuilder, WorkingSubset};
