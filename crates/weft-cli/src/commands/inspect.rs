//! `weft status` / `weft history` / `weft purge` — checkpoint inspection.

use weft_core::checkpoint::Checkpoint;
use weft_core::EngineError;

use super::{init_store, print_json};

fn checkpoint_json(checkpoint: &Checkpoint) -> serde_json::Value {
    serde_json::json!({
        "thread": checkpoint.thread_id,
        "seq": checkpoint.seq,
        "next_step": checkpoint.next_step,
        "interrupted": checkpoint.interrupted,
        "created_at": checkpoint.created_at.to_rfc3339(),
        "fields": checkpoint.state.field_names().collect::<Vec<_>>(),
    })
}

pub async fn status(db_path: &str, thread: &str) -> Result<(), EngineError> {
    let store = init_store(db_path)?;
    let latest = store.load_latest(thread).await?;
    print_json(&checkpoint_json(&latest));
    Ok(())
}

pub async fn history(db_path: &str, thread: &str) -> Result<(), EngineError> {
    let store = init_store(db_path)?;
    let rows = store.history(thread).await?;
    let items: Vec<serde_json::Value> = rows.iter().map(checkpoint_json).collect();
    print_json(&serde_json::json!({ "thread": thread, "checkpoints": items }));
    Ok(())
}

pub async fn purge(db_path: &str, thread: &str) -> Result<(), EngineError> {
    let store = init_store(db_path)?;
    let removed = store.purge(thread).await?;
    println!("Removed {} checkpoint(s) for thread '{}'.", removed, thread);
    Ok(())
}
