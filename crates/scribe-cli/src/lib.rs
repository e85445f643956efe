//! Scribe CLI library components.
//!
//! This library exposes the command handlers for testing purposes.

pub mod commands;
