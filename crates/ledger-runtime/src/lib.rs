//! Runtime layer for the claim ledger.
//!
//! Runs the synchronous pipeline off the async executor, streams progress to
//! the caller and writes the finished report.

pub mod orchestrator;

pub use ledger_core as core;
pub use ledger_data as data;
