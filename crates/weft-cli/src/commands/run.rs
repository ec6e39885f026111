//! `weft run` / `weft resume` — drive a workflow graph.

use weft_core::graph::{
    build_initial_state, default_registry, orchestrated_graph, review_graph, RunStatus,
    WorkflowGraph,
};
use weft_core::models::ApprovalStatus;
use weft_core::state::{field, StateDelta};
use weft_core::EngineError;

use super::{init_skills, init_store, skills_dir};

fn build_graph(
    db_path: &str,
    skills_flag: Option<&str>,
    orchestrated: bool,
) -> Result<WorkflowGraph, EngineError> {
    let store = init_store(db_path)?;
    let skills = init_skills(&skills_dir(skills_flag))?;
    let registry = default_registry(None, skills)?;
    if orchestrated {
        orchestrated_graph(registry, store)
    } else {
        review_graph(registry, store)
    }
}

fn report(outcome: &weft_core::graph::RunOutcome) {
    match &outcome.status {
        RunStatus::Completed => {
            println!("Thread '{}' completed.", outcome.thread_id);
        }
        RunStatus::Interrupted { next_step } => {
            println!(
                "Thread '{}' suspended before '{}'.",
                outcome.thread_id, next_step
            );
            if let Ok(action) = outcome.state.require_str(field::PENDING_ACTION) {
                if !action.is_empty() {
                    println!("Pending action: {}", action);
                    println!(
                        "Run `weft resume --thread {} --approve` (or --deny) to continue.",
                        outcome.thread_id
                    );
                }
            }
        }
    }
    if let Ok(messages) = outcome.state.messages() {
        for message in messages {
            println!("  [{:?}] {}", message.role, message.content);
        }
    }
}

pub async fn invoke(
    db_path: &str,
    skills_flag: Option<&str>,
    thread: &str,
    orchestrated: bool,
) -> Result<(), EngineError> {
    tracing::info!(thread, orchestrated, "starting workflow run");
    let graph = build_graph(db_path, skills_flag, orchestrated)?;
    let outcome = graph.invoke(thread, build_initial_state()).await?;
    report(&outcome);
    Ok(())
}

pub async fn resume(
    db_path: &str,
    skills_flag: Option<&str>,
    thread: &str,
    approve: bool,
    orchestrated: bool,
) -> Result<(), EngineError> {
    let graph = build_graph(db_path, skills_flag, orchestrated)?;

    let decision = if approve {
        ApprovalStatus::Approved
    } else {
        ApprovalStatus::Denied
    };
    let patch = StateDelta::new().set(field::APPROVAL_STATUS, decision);
    tracing::info!(thread, decision = decision.as_str(), "resuming workflow");

    let outcome = graph.resume(thread, patch).await?;
    report(&outcome);
    Ok(())
}
