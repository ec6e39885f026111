//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and drives the
//! weft-core engine directly.

pub mod inspect;
pub mod run;
pub mod skill;

use std::path::PathBuf;
use std::sync::Arc;

use weft_core::checkpoint::CheckpointStore;
use weft_core::skills::{arithmetic_template, SkillLoader};
use weft_core::{Database, EngineConfig, EngineError};

/// Open the checkpoint store backing every command.
pub fn init_store(db_path: &str) -> Result<CheckpointStore, EngineError> {
    let db = Database::open(db_path)?;
    Ok(CheckpointStore::new(db))
}

/// Resolve the skills directory: CLI flag, then environment, then the
/// per-user default.
pub fn skills_dir(flag: Option<&str>) -> PathBuf {
    flag.map(PathBuf::from)
        .unwrap_or_else(|| EngineConfig::from_env().skills_dir)
}

/// Set up the skill loader with the built-in arithmetic skill, seeding
/// its source file on first use so the executor works out of the box.
pub fn init_skills(dir: &PathBuf) -> Result<Arc<SkillLoader>, EngineError> {
    let path = dir.join("arithmetic.skill");
    if !path.exists() {
        std::fs::create_dir_all(dir).map_err(|e| EngineError::Load {
            name: "arithmetic".to_string(),
            reason: format!("cannot create {}: {}", dir.display(), e),
        })?;
        std::fs::write(&path, arithmetic_template("add")).map_err(|e| EngineError::Load {
            name: "arithmetic".to_string(),
            reason: format!("cannot write {}: {}", path.display(), e),
        })?;
    }

    let loader = Arc::new(SkillLoader::new());
    loader.register("arithmetic", &path)?;
    Ok(loader)
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}
