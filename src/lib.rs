//! SCRAMBLE — race lifecycle scheduler and wagering settlement service
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod dashboard;
pub mod engine;
pub mod storage;
pub mod types;
