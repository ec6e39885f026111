//! End-to-end engine tests: full graph runs over a real SQLite
//! checkpoint store, exercising interrupt/resume, plan routing, and
//! the skill repair path together.

use std::sync::Arc;

use weft_core::checkpoint::CheckpointStore;
use weft_core::graph::{
    build_initial_state, default_registry, orchestrated_graph, review_graph, RunStatus,
};
use weft_core::models::{ApprovalStatus, PlanStepStatus, ReviewStatus, TestStatus};
use weft_core::skills::{arithmetic_template, SkillLoader};
use weft_core::state::{field, StateDelta};
use weft_core::Database;

fn store() -> CheckpointStore {
    CheckpointStore::new(Database::open_in_memory().unwrap())
}

fn skills_from(dir: &tempfile::TempDir, contents: &str) -> Arc<SkillLoader> {
    let path = dir.path().join("arithmetic.skill");
    std::fs::write(&path, contents).unwrap();
    let loader = Arc::new(SkillLoader::new());
    loader.register("arithmetic", &path).unwrap();
    loader
}

#[tokio::test]
async fn review_run_suspends_then_approved_resume_executes() {
    let dir = tempfile::tempdir().unwrap();
    let registry = default_registry(None, skills_from(&dir, &arithmetic_template("add"))).unwrap();
    let graph = review_graph(registry, store()).unwrap();

    let outcome = graph.invoke("t1", build_initial_state()).await.unwrap();
    assert_eq!(
        outcome.status,
        RunStatus::Interrupted {
            next_step: "executor".to_string()
        }
    );
    assert_eq!(
        outcome.state.review_status().unwrap(),
        Some(ReviewStatus::Approved)
    );
    assert_eq!(
        outcome.state.test_status().unwrap(),
        Some(TestStatus::Generated)
    );

    // Approval arrives as a resume patch, never as in-process mutation.
    let patch = StateDelta::new().set(field::APPROVAL_STATUS, ApprovalStatus::Approved);
    let resumed = graph.resume("t1", patch).await.unwrap();
    assert_eq!(resumed.status, RunStatus::Completed);
    assert_eq!(resumed.state.require_i64(field::SKILL_RESULT).unwrap(), 5);
    assert_eq!(
        resumed.state.require_str(field::LAST_EXECUTION).unwrap(),
        "add(2, 3) = 5"
    );
}

#[tokio::test]
async fn denied_resume_completes_without_executing() {
    let dir = tempfile::tempdir().unwrap();
    let registry = default_registry(None, skills_from(&dir, &arithmetic_template("add"))).unwrap();
    let graph = review_graph(registry, store()).unwrap();

    graph.invoke("t1", build_initial_state()).await.unwrap();
    let patch = StateDelta::new().set(field::APPROVAL_STATUS, ApprovalStatus::Denied);
    let resumed = graph.resume("t1", patch).await.unwrap();

    assert_eq!(resumed.status, RunStatus::Completed);
    assert_eq!(
        resumed.state.require_str(field::LAST_EXECUTION).unwrap(),
        "denied"
    );
    // The skill result stays at its initial value.
    assert_eq!(resumed.state.require_i64(field::SKILL_RESULT).unwrap(), 0);
}

#[tokio::test]
async fn checkpoint_history_is_monotonic_and_marks_the_suspension() {
    let dir = tempfile::tempdir().unwrap();
    let registry = default_registry(None, skills_from(&dir, &arithmetic_template("add"))).unwrap();
    let graph = review_graph(registry, store()).unwrap();

    graph.invoke("t1", build_initial_state()).await.unwrap();

    let history = graph.checkpoints().history("t1").await.unwrap();
    assert!(history.len() >= 5, "expected one checkpoint per transition");
    for (i, checkpoint) in history.iter().enumerate() {
        assert_eq!(checkpoint.seq, i as i64 + 1);
    }
    let latest = history.last().unwrap();
    assert!(latest.interrupted);
    assert_eq!(latest.next_step, "executor");
    // Only the suspension row carries the interrupt flag.
    assert!(history[..history.len() - 1].iter().all(|c| !c.interrupted));
}

#[tokio::test]
async fn orchestrated_run_completes_its_plan_with_rework() {
    let dir = tempfile::tempdir().unwrap();
    let registry = default_registry(None, skills_from(&dir, &arithmetic_template("add"))).unwrap();
    let graph = orchestrated_graph(registry, store()).unwrap();

    let outcome = graph.invoke("t1", build_initial_state()).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Completed);

    let plan = outcome.state.plan().unwrap();
    assert_eq!(plan.len(), 3);
    assert!(plan.iter().all(|s| s.status == PlanStepStatus::Completed));

    // The fallback coder needs a rejected first pass, so the rework
    // loop ran the coder twice.
    assert_eq!(outcome.state.iteration_count().unwrap(), 2);
    assert_eq!(
        outcome.state.review_status().unwrap(),
        Some(ReviewStatus::Approved)
    );

    // Plan exhaustion ends the run directly; orchestrated runs never
    // pass an interrupt boundary.
    let history = graph.checkpoints().history("t1").await.unwrap();
    assert!(history.iter().all(|c| !c.interrupted));
}

#[tokio::test]
async fn threads_run_concurrently_without_interference() {
    let dir = tempfile::tempdir().unwrap();
    let registry = default_registry(None, skills_from(&dir, &arithmetic_template("add"))).unwrap();
    let graph = Arc::new(review_graph(registry, store()).unwrap());

    let (a, b) = tokio::join!(
        graph.invoke("alpha", build_initial_state()),
        graph.invoke("beta", build_initial_state()),
    );
    let a = a.unwrap();
    let b = b.unwrap();
    assert!(matches!(a.status, RunStatus::Interrupted { .. }));
    assert!(matches!(b.status, RunStatus::Interrupted { .. }));

    let alpha = graph.checkpoints().history("alpha").await.unwrap();
    let beta = graph.checkpoints().history("beta").await.unwrap();
    assert!(alpha.iter().all(|c| c.thread_id == "alpha"));
    assert!(beta.iter().all(|c| c.thread_id == "beta"));
    assert_eq!(alpha.len(), beta.len());
}

#[tokio::test]
async fn executor_repairs_a_broken_skill_during_resume() {
    let dir = tempfile::tempdir().unwrap();
    // The registered skill parses but lacks the operation the executor
    // invokes, so the first invocation fails and triggers repair.
    let loader = skills_from(&dir, "---\nname: arithmetic\n---\nsub = a - b\n");
    let registry = default_registry(None, loader.clone()).unwrap();
    let graph = review_graph(registry, store()).unwrap();

    graph.invoke("t1", build_initial_state()).await.unwrap();
    let patch = StateDelta::new().set(field::APPROVAL_STATUS, ApprovalStatus::Approved);
    let resumed = graph.resume("t1", patch).await.unwrap();

    assert_eq!(resumed.status, RunStatus::Completed);
    assert_eq!(resumed.state.require_i64(field::SKILL_RESULT).unwrap(), 5);
    assert!(resumed
        .state
        .require_bool(field::SKILL_REPAIR_ATTEMPTED)
        .unwrap());
    // Repair rewrote the source and swapped the reloaded handle in.
    assert_eq!(loader.version("arithmetic").unwrap(), 2);
}

#[tokio::test]
async fn interruption_changes_timing_but_not_the_outcome() {
    use weft_core::graph::{GraphBuilder, END, START};
    use weft_core::roles::step_name;

    let dir = tempfile::tempdir().unwrap();
    let skill = skills_from(&dir, &arithmetic_template("add"));

    // Interrupted run: suspend at the approval gate, approve via patch.
    let registry = default_registry(None, skill.clone()).unwrap();
    let graph = review_graph(registry, store()).unwrap();
    graph.invoke("t1", build_initial_state()).await.unwrap();
    let interrupted = graph
        .resume(
            "t1",
            StateDelta::new().set(field::APPROVAL_STATUS, ApprovalStatus::Approved),
        )
        .await
        .unwrap();

    // Straight-through run: same wiring without the interrupt, with
    // the approval pre-applied to the initial state.
    let registry = default_registry(None, skill).unwrap();
    let straight = GraphBuilder::new(registry)
        .add_edge(START, step_name::CODER)
        .add_edge(step_name::CODER, step_name::REVIEWER)
        .add_conditional_edges(
            step_name::REVIEWER,
            vec![(
                |s: &weft_core::state::WorkflowState| {
                    Ok(s.review_status()? == Some(ReviewStatus::Changes))
                },
                step_name::CODER,
            )],
            Some(step_name::TESTER),
        )
        .add_conditional_edges(
            step_name::TESTER,
            vec![(
                |s: &weft_core::state::WorkflowState| {
                    Ok(s.test_status()? == Some(TestStatus::Failed))
                },
                step_name::CODER,
            )],
            Some(step_name::APPROVER),
        )
        .add_edge(step_name::APPROVER, step_name::EXECUTOR)
        .add_edge(step_name::EXECUTOR, END)
        .build(store())
        .unwrap();

    let mut initial = build_initial_state();
    initial.apply(StateDelta::new().set(field::APPROVAL_STATUS, ApprovalStatus::Approved));
    let direct = straight.invoke("t1", initial).await.unwrap();

    assert_eq!(interrupted.status, RunStatus::Completed);
    assert_eq!(direct.status, RunStatus::Completed);
    assert_eq!(interrupted.state.snapshot(), direct.state.snapshot());
}

#[tokio::test]
async fn crash_recovery_resumes_from_the_latest_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("weft.db");
    let skill = skills_from(&dir, &arithmetic_template("add"));

    // First process: run to the interrupt and drop the graph.
    {
        let db = Database::open(db_path.to_str().unwrap()).unwrap();
        let registry = default_registry(None, skill.clone()).unwrap();
        let graph = review_graph(registry, CheckpointStore::new(db)).unwrap();
        let outcome = graph.invoke("t1", build_initial_state()).await.unwrap();
        assert!(matches!(outcome.status, RunStatus::Interrupted { .. }));
    }

    // Second process: a fresh graph over the same database picks the
    // thread up where it stopped.
    let db = Database::open(db_path.to_str().unwrap()).unwrap();
    let registry = default_registry(None, skill).unwrap();
    let graph = review_graph(registry, CheckpointStore::new(db)).unwrap();
    let patch = StateDelta::new().set(field::APPROVAL_STATUS, ApprovalStatus::Approved);
    let resumed = graph.resume("t1", patch).await.unwrap();

    assert_eq!(resumed.status, RunStatus::Completed);
    assert_eq!(resumed.state.require_i64(field::SKILL_RESULT).unwrap(), 5);
}
