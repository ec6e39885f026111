//! Weft CLI library surface.
//!
//! Exposes the command implementations so integration tests can drive
//! the same code paths as the `weft` binary in-process.

pub mod commands;
