#![warn(missing_docs)]

//! Nearline execution engine: remote archive sessions, bundle packing, and
//! the store/retrieve/delete execution paths for working subsets.
//!
//! The pure half of the system (classification, references, subset
//! preparation) lives in `nearline-core`; this crate owns everything that
//! touches the remote archive session or the local scratch workspace.

pub mod bundle;
pub mod engine;
pub mod eraser;
pub mod reader;
pub mod session;
pub mod workspace;
pub mod writer;

pub use bundle::{assemble, decode_bundle, encode_bundle, Bundle, BundleEntry, BundleHeader, BUNDLE_MAGIC};
pub use engine::ArchiveEngine;
pub use eraser::{ArchiveEraser, EraserStats};
pub use reader::{ArchiveReader, ReaderStats};
pub use session::{
    ArchiveSession, BoxFuture, MockArchiveSession, MockSessionPool, MockSessionStats, SessionLease,
    SessionPool,
};
pub use workspace::{Scratch, Workspace};
pub use writer::{ArchiveWriter, WriterStats};
