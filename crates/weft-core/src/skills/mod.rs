//! Skill loading and hot reload.
//!
//! A skill is a hot-reloadable unit of executable logic, distinct from
//! workflow steps. Skill sources are files with YAML frontmatter
//! (name, description) followed by a body of operation definitions:
//!
//! ```text
//! ---
//! name: arithmetic
//! description: Basic integer arithmetic.
//! ---
//! add = a + b
//! sub = a - b
//! ```
//!
//! Consumers hold the skill *name*, never a direct reference to the
//! loaded handle; `get` hands out an `Arc` snapshot. `reload` parses
//! into a temporary slot and swaps it in atomically, so concurrent
//! readers observe either the fully-old or fully-new handle — a failed
//! reload leaves the prior handle intact and reports both version
//! identifiers.

mod editor;

pub use editor::SkillEditor;

use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::error::EngineError;

/// YAML frontmatter parsed from a skill source file.
#[derive(Debug, Deserialize)]
struct SkillFrontmatter {
    name: String,
    #[serde(default)]
    description: String,
}

/// A binary integer operation over operands `a` and `b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl SkillOp {
    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(Self::Add),
            "-" => Some(Self::Sub),
            "*" => Some(Self::Mul),
            "/" => Some(Self::Div),
            "%" => Some(Self::Rem),
            _ => None,
        }
    }

    fn eval(self, a: i64, b: i64) -> Result<i64, EngineError> {
        match self {
            Self::Add => Ok(a.wrapping_add(b)),
            Self::Sub => Ok(a.wrapping_sub(b)),
            Self::Mul => Ok(a.wrapping_mul(b)),
            Self::Div | Self::Rem if b == 0 => {
                Err(EngineError::Internal("division by zero".to_string()))
            }
            Self::Div => Ok(a / b),
            Self::Rem => Ok(a % b),
        }
    }
}

/// The loaded, executable form of a skill.
#[derive(Debug)]
pub struct SkillHandle {
    pub name: String,
    pub description: String,
    ops: HashMap<String, SkillOp>,
}

impl SkillHandle {
    pub fn invoke(&self, op: &str, a: i64, b: i64) -> Result<i64, EngineError> {
        let op = self
            .ops
            .get(op)
            .ok_or_else(|| EngineError::NotFound(format!("operation '{}' in skill '{}'", op, self.name)))?;
        op.eval(a, b)
    }

    pub fn operations(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.ops.keys().map(|k| k.as_str()).collect();
        names.sort();
        names
    }
}

struct SkillUnit {
    source: PathBuf,
    handle: Option<Arc<SkillHandle>>,
    version: u64,
}

/// Registry of skills with atomic swap-or-rollback reload.
pub struct SkillLoader {
    units: RwLock<HashMap<String, SkillUnit>>,
}

impl Default for SkillLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SkillLoader {
    pub fn new() -> Self {
        Self {
            units: RwLock::new(HashMap::new()),
        }
    }

    /// Store a pending unit without loading it.
    pub fn register(&self, name: &str, source: impl Into<PathBuf>) -> Result<(), EngineError> {
        let mut units = self.write()?;
        if units.contains_key(name) {
            return Err(EngineError::DuplicateName(name.to_string()));
        }
        units.insert(
            name.to_string(),
            SkillUnit {
                source: source.into(),
                handle: None,
                version: 0,
            },
        );
        Ok(())
    }

    /// Resolve and parse the source. A parse failure surfaces as
    /// `Load` and leaves the registry state unchanged.
    pub fn load(&self, name: &str) -> Result<Arc<SkillHandle>, EngineError> {
        let source = self.source_of(name)?;
        let handle = Arc::new(parse_skill_file(name, &source)?);

        let mut units = self.write()?;
        let unit = units
            .get_mut(name)
            .ok_or_else(|| EngineError::NotFound(format!("skill '{}'", name)))?;
        unit.handle = Some(handle.clone());
        if unit.version == 0 {
            unit.version = 1;
        }
        tracing::info!(skill = name, version = unit.version, "skill loaded");
        Ok(handle)
    }

    /// The currently loaded handle.
    pub fn get(&self, name: &str) -> Result<Arc<SkillHandle>, EngineError> {
        let units = self.read()?;
        let unit = units
            .get(name)
            .ok_or_else(|| EngineError::NotFound(format!("skill '{}'", name)))?;
        unit.handle
            .clone()
            .ok_or_else(|| EngineError::NotLoaded(name.to_string()))
    }

    pub fn version(&self, name: &str) -> Result<u64, EngineError> {
        let units = self.read()?;
        units
            .get(name)
            .map(|u| u.version)
            .ok_or_else(|| EngineError::NotFound(format!("skill '{}'", name)))
    }

    /// Path of the registered source file.
    pub fn source_of(&self, name: &str) -> Result<PathBuf, EngineError> {
        let units = self.read()?;
        units
            .get(name)
            .map(|u| u.source.clone())
            .ok_or_else(|| EngineError::NotFound(format!("skill '{}'", name)))
    }

    /// Load the source into a temporary slot, then swap it in and bump
    /// the version. On failure the old handle stays loaded and the
    /// error names both the kept and the attempted version.
    pub fn reload(&self, name: &str) -> Result<Arc<SkillHandle>, EngineError> {
        let (source, prior) = {
            let units = self.read()?;
            let unit = units
                .get(name)
                .ok_or_else(|| EngineError::NotFound(format!("skill '{}'", name)))?;
            (unit.source.clone(), unit.version)
        };

        let handle = match parse_skill_file(name, &source) {
            Ok(parsed) => Arc::new(parsed),
            Err(e) => {
                tracing::warn!(skill = name, version = prior, "reload failed, keeping prior handle");
                return Err(EngineError::Reload {
                    name: name.to_string(),
                    prior,
                    attempted: prior + 1,
                    reason: e.to_string(),
                });
            }
        };

        let mut units = self.write()?;
        let unit = units
            .get_mut(name)
            .ok_or_else(|| EngineError::NotFound(format!("skill '{}'", name)))?;
        unit.handle = Some(handle.clone());
        unit.version += 1;
        tracing::info!(skill = name, version = unit.version, "skill reloaded");
        Ok(handle)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .read()
            .map(|units| units.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, SkillUnit>>, EngineError> {
        self.units
            .read()
            .map_err(|e| EngineError::Internal(format!("skill lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, SkillUnit>>, EngineError> {
        self.units
            .write()
            .map_err(|e| EngineError::Internal(format!("skill lock poisoned: {}", e)))
    }
}

/// Known-good source for a single-operation arithmetic skill, used by
/// the executor's repair path and by tests.
pub fn arithmetic_template(op: &str) -> String {
    let body = match op {
        "sub" => "sub = a - b",
        "mul" => "mul = a * b",
        _ => "add = a + b",
    };
    format!(
        "---\nname: arithmetic\ndescription: Basic integer arithmetic.\n---\n{}\n",
        body
    )
}

fn parse_skill_file(name: &str, source: &Path) -> Result<SkillHandle, EngineError> {
    let raw = std::fs::read_to_string(source).map_err(|e| EngineError::Load {
        name: name.to_string(),
        reason: format!("cannot read {}: {}", source.display(), e),
    })?;

    let (frontmatter, body) = extract_frontmatter(&raw).ok_or_else(|| EngineError::Load {
        name: name.to_string(),
        reason: "missing YAML frontmatter".to_string(),
    })?;

    let fm: SkillFrontmatter =
        serde_yaml::from_str(&frontmatter).map_err(|e| EngineError::Load {
            name: name.to_string(),
            reason: format!("invalid frontmatter: {}", e),
        })?;

    let op_line = Regex::new(r"^(\w+)\s*=\s*a\s*([+\-*/%])\s*b$").expect("static regex");
    let mut ops = HashMap::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let caps = op_line.captures(line).ok_or_else(|| EngineError::Load {
            name: name.to_string(),
            reason: format!("unparseable operation line: '{}'", line),
        })?;
        let op = SkillOp::from_symbol(&caps[2]).ok_or_else(|| EngineError::Load {
            name: name.to_string(),
            reason: format!("unsupported operator in '{}'", line),
        })?;
        ops.insert(caps[1].to_string(), op);
    }

    if ops.is_empty() {
        return Err(EngineError::Load {
            name: name.to_string(),
            reason: "skill defines no operations".to_string(),
        });
    }

    Ok(SkillHandle {
        name: fm.name,
        description: fm.description,
        ops,
    })
}

/// Extract YAML frontmatter from between `---` delimiters.
fn extract_frontmatter(contents: &str) -> Option<(String, String)> {
    let mut lines = contents.lines();
    if !matches!(lines.next(), Some(line) if line.trim() == "---") {
        return None;
    }

    let mut frontmatter_lines: Vec<&str> = Vec::new();
    let mut body_start = false;
    let mut body_lines: Vec<&str> = Vec::new();

    for line in lines {
        if !body_start {
            if line.trim() == "---" {
                body_start = true;
            } else {
                frontmatter_lines.push(line);
            }
        } else {
            body_lines.push(line);
        }
    }

    if frontmatter_lines.is_empty() || !body_start {
        return None;
    }

    Some((frontmatter_lines.join("\n"), body_lines.join("\n")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_skill(dir: &tempfile::TempDir, file: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(file);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn load_parses_operations() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_skill(&dir, "arithmetic.skill", &arithmetic_template("add"));

        let loader = SkillLoader::new();
        loader.register("arithmetic", &path).unwrap();
        let handle = loader.load("arithmetic").unwrap();
        assert_eq!(handle.invoke("add", 2, 3).unwrap(), 5);
        assert_eq!(loader.version("arithmetic").unwrap(), 1);
    }

    #[test]
    fn get_before_load_is_not_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_skill(&dir, "a.skill", &arithmetic_template("add"));
        let loader = SkillLoader::new();
        loader.register("arithmetic", &path).unwrap();
        assert!(matches!(
            loader.get("arithmetic"),
            Err(EngineError::NotLoaded(_))
        ));
    }

    #[test]
    fn reload_success_bumps_version_and_swaps() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_skill(&dir, "a.skill", &arithmetic_template("add"));
        let loader = SkillLoader::new();
        loader.register("arithmetic", &path).unwrap();
        loader.load("arithmetic").unwrap();

        std::fs::write(&path, arithmetic_template("sub")).unwrap();
        let handle = loader.reload("arithmetic").unwrap();
        assert_eq!(handle.invoke("sub", 5, 3).unwrap(), 2);
        assert_eq!(loader.version("arithmetic").unwrap(), 2);
    }

    #[test]
    fn failed_reload_keeps_prior_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_skill(&dir, "a.skill", &arithmetic_template("add"));
        let loader = SkillLoader::new();
        loader.register("arithmetic", &path).unwrap();
        loader.load("arithmetic").unwrap();

        std::fs::write(&path, "not a skill at all").unwrap();
        let err = loader.reload("arithmetic").unwrap_err();
        match err {
            EngineError::Reload { prior, attempted, .. } => {
                assert_eq!(prior, 1);
                assert_eq!(attempted, 2);
            }
            other => panic!("expected Reload error, got {:?}", other),
        }

        // Rollback: the old handle still answers.
        let handle = loader.get("arithmetic").unwrap();
        assert_eq!(handle.invoke("add", 2, 3).unwrap(), 5);
        assert_eq!(loader.version("arithmetic").unwrap(), 1);
    }

    #[test]
    fn load_failure_leaves_registry_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_skill(&dir, "bad.skill", "no frontmatter here");
        let loader = SkillLoader::new();
        loader.register("bad", &path).unwrap();
        assert!(matches!(loader.load("bad"), Err(EngineError::Load { .. })));
        assert!(matches!(loader.get("bad"), Err(EngineError::NotLoaded(_))));
        assert_eq!(loader.version("bad").unwrap(), 0);
    }
}
