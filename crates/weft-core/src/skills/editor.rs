//! Skill source editing.
//!
//! Rewrites a registered skill's source file on disk. Pairs with
//! `SkillLoader::reload` for the repair-then-reload flow the executor
//! step uses when a skill misbehaves.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::EngineError;
use crate::skills::SkillLoader;

pub struct SkillEditor {
    loader: Arc<SkillLoader>,
}

impl SkillEditor {
    pub fn new(loader: Arc<SkillLoader>) -> Self {
        Self { loader }
    }

    /// Overwrite the skill's source file. Does not reload; the caller
    /// decides when the new source goes live.
    pub fn update_source(&self, name: &str, new_source: &str) -> Result<PathBuf, EngineError> {
        let path = self.loader.source_of(name)?;
        std::fs::write(&path, new_source).map_err(|e| EngineError::Load {
            name: name.to_string(),
            reason: format!("cannot write {}: {}", path.display(), e),
        })?;
        tracing::info!(skill = name, path = %path.display(), "skill source updated");
        Ok(path)
    }
}
