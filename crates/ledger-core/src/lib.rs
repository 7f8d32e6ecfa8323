//! Core types for the claim ledger.
//!
//! Canonical claim and ledger models, the error taxonomy, engine
//! configuration, fiscal-calendar helpers and the pure capping rules shared by
//! the data and runtime crates.

pub mod calculations;
pub mod data_processors;
pub mod error;
pub mod formatting;
pub mod models;
pub mod policy;
pub mod settings;
pub mod time_utils;
