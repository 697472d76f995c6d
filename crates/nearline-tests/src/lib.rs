//! Nearline Test & Validation Infrastructure
//!
//! This crate provides cross-crate integration tests for the nearline
//! archiving engine: end-to-end store/retrieve/delete scenarios against the
//! mock archive session, property tests over the full write/read path, and
//! a reusable fixture harness.

pub mod harness;

mod proptest_engine;

pub use harness::{init_tracing, random_payload, stage_file, TestEnv};
