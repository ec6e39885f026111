//! `weft skill` — skill inspection and hot reload.

use weft_core::EngineError;

use super::{init_skills, print_json, skills_dir};

pub fn list(skills_flag: Option<&str>) -> Result<(), EngineError> {
    let loader = init_skills(&skills_dir(skills_flag))?;
    let mut items = Vec::new();
    for name in loader.names() {
        let version = loader.version(&name)?;
        let source = loader.source_of(&name)?;
        items.push(serde_json::json!({
            "name": name,
            "version": version,
            "source": source.display().to_string(),
        }));
    }
    print_json(&serde_json::json!({ "skills": items }));
    Ok(())
}

pub fn reload(skills_flag: Option<&str>, name: &str) -> Result<(), EngineError> {
    let loader = init_skills(&skills_dir(skills_flag))?;
    // Fresh loader: establish the baseline handle before reloading.
    loader.load(name)?;
    let handle = loader.reload(name)?;
    println!(
        "Reloaded skill '{}' (version {}), operations: {:?}",
        handle.name,
        loader.version(name)?,
        handle.operations()
    );
    Ok(())
}
