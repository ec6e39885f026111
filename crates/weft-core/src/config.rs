//! Engine configuration from environment variables.
//!
//! Environment variables:
//! - `WEFT_DB_PATH`: SQLite checkpoint database path. Default: `weft.db`
//! - `WEFT_MAX_TRANSITIONS`: cap on executor transitions per invocation
//!   before a miswired graph is reported as an error. Default: 100
//! - `WEFT_SKILLS_DIR`: directory holding skill source files.
//!   Default: `~/.weft/skills` (falls back to `.weft/skills` when no
//!   home directory is available)

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub db_path: String,
    pub max_transitions: usize,
    pub skills_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: "weft.db".to_string(),
            max_transitions: 100,
            skills_dir: default_skills_dir(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            db_path: std::env::var("WEFT_DB_PATH").unwrap_or(defaults.db_path),
            max_transitions: std::env::var("WEFT_MAX_TRANSITIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_transitions),
            skills_dir: std::env::var("WEFT_SKILLS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.skills_dir),
        }
    }
}

fn default_skills_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".weft").join("skills"))
        .unwrap_or_else(|| PathBuf::from(".weft/skills"))
}
