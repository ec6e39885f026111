//! Weft Core — multi-role workflow orchestration engine.
//!
//! This crate contains the engine proper: the graph executor, plan
//! router, checkpoint store, step registry, skill loader, and the
//! built-in roles. It has no CLI or transport dependency, making it
//! suitable for use in:
//!
//! - CLI tools (via `weft-cli`)
//! - long-running services embedding workflows
//! - tests driving graphs in-process
//!
//! A workflow is a graph of named steps over a shared [`state::WorkflowState`].
//! Steps return deltas, every transition is checkpointed, and runs can
//! suspend at interrupt boundaries and resume with an external patch.

pub mod checkpoint;
pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod messaging;
pub mod models;
pub mod registry;
pub mod roles;
pub mod skills;
pub mod state;

// Convenience re-exports
pub use config::EngineConfig;
pub use db::Database;
pub use error::EngineError;
