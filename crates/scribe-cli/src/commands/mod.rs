//! Command handlers for the `scribe` binary.

pub mod keys;
pub mod ledger;
