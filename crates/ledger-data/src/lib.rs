//! Data layer for the claim ledger.
//!
//! Discovers and reads claim spreadsheets, maps their columns onto the
//! canonical schema, classifies and sequences files into fiscal periods, folds
//! periods into the cumulative ledgers and writes the resulting report.

pub mod aggregator;
pub mod analysis;
pub mod classifier;
pub mod normalizer;
pub mod reader;
pub mod report;
pub mod schema;
pub mod seed;
pub mod sequencer;

pub use ledger_core as core;
