//! Built-in graph presets.
//!
//! Two ways to wire the same roles: a fixed review loop (coder →
//! reviewer → tester → approver → executor, with conditional edges
//! back to the coder) and an orchestrated variant where a planner step
//! emits an execution plan and the plan router drives dispatch.

use std::sync::Arc;

use crate::checkpoint::CheckpointStore;
use crate::error::EngineError;
use crate::graph::{GraphBuilder, WorkflowGraph, END, START};
use crate::models::{
    ApprovalStatus, ChatMessage, OrchestratorStatus, PlanStep, ReviewStatus, TestStatus,
};
use crate::registry::StepRegistry;
use crate::roles::{
    step_name, ApproverStep, CoderStep, OrchestratorStep, ReviewerStep, SkillExecutorStep,
    TesterStep, TextGenerator,
};
use crate::skills::SkillLoader;
use crate::state::{field, StateDelta, WorkflowState};

/// Steps of the fixed review preset, in wiring order.
pub const REVIEW_STEPS: [&str; 5] = [
    step_name::CODER,
    step_name::REVIEWER,
    step_name::TESTER,
    step_name::APPROVER,
    step_name::EXECUTOR,
];

/// Steps the orchestrated preset dispatches: the planner plus the
/// workers its fallback plan schedules.
pub const ORCHESTRATED_STEPS: [&str; 4] = [
    step_name::ORCHESTRATOR,
    step_name::CODER,
    step_name::REVIEWER,
    step_name::TESTER,
];

/// Fresh state for the built-in coding task, with every well-known
/// field present so steps never trip over an absent field mid-run.
pub fn build_initial_state() -> WorkflowState {
    let mut state = WorkflowState::new();
    state.apply(
        StateDelta::new()
            .set(
                field::MESSAGES,
                vec![
                    ChatMessage::system("You are part of a multi-role coding workflow."),
                    ChatMessage::user("Implement add(a, b) in app.rs."),
                ],
            )
            .set(
                field::CODE_FILES,
                std::collections::BTreeMap::<String, String>::new(),
            )
            .set(field::ITERATION_COUNT, 0)
            .set(field::REVIEW_STATUS, ReviewStatus::Changes)
            .set(field::REVIEWER_FEEDBACK, "")
            .set(field::PENDING_ACTION, "")
            .set(field::APPROVAL_STATUS, ApprovalStatus::Pending)
            .set(field::LAST_EXECUTION, "")
            .set(field::SKILL_RESULT, 0)
            .set(field::SKILL_REPAIR_ATTEMPTED, false)
            .set(field::TEST_CODE, "")
            .set(field::TEST_STATUS, TestStatus::Pending)
            .set(field::EXECUTION_PLAN, Vec::<PlanStep>::new())
            .set(field::ORCHESTRATOR_STATUS, OrchestratorStatus::Planning)
            .set(field::REWORK_REQUESTED, false),
    );
    state
}

/// Register every built-in role against one registry. The generator is
/// shared across roles; with `None` each role runs its deterministic
/// fallback.
pub fn default_registry(
    generator: Option<Arc<dyn TextGenerator>>,
    skills: Arc<SkillLoader>,
) -> Result<Arc<StepRegistry>, EngineError> {
    let registry = Arc::new(StepRegistry::new());
    registry.register(
        step_name::CODER,
        Arc::new(CoderStep::new(generator.clone())),
        false,
    )?;
    registry.register(
        step_name::REVIEWER,
        Arc::new(ReviewerStep::new(generator.clone())),
        false,
    )?;
    registry.register(
        step_name::TESTER,
        Arc::new(TesterStep::new(generator.clone())),
        false,
    )?;
    registry.register(
        step_name::ORCHESTRATOR,
        Arc::new(OrchestratorStep::new(generator)),
        false,
    )?;
    registry.register(step_name::APPROVER, Arc::new(ApproverStep::new()), false)?;
    registry.register(
        step_name::EXECUTOR,
        Arc::new(SkillExecutorStep::new(skills)),
        false,
    )?;
    Ok(registry)
}

/// The fixed review loop. The reviewer sends changed code back to the
/// coder; the tester sends failing tests back to the coder; execution
/// suspends before the executor for a human approval decision.
pub fn review_graph(
    registry: Arc<StepRegistry>,
    checkpoints: CheckpointStore,
) -> Result<WorkflowGraph, EngineError> {
    GraphBuilder::new(registry)
        .add_edge(START, step_name::CODER)
        .add_edge(step_name::CODER, step_name::REVIEWER)
        .add_conditional_edges(
            step_name::REVIEWER,
            vec![(
                |s: &WorkflowState| Ok(s.review_status()? == Some(ReviewStatus::Changes)),
                step_name::CODER,
            )],
            Some(step_name::TESTER),
        )
        .add_conditional_edges(
            step_name::TESTER,
            vec![(
                |s: &WorkflowState| Ok(s.test_status()? == Some(TestStatus::Failed)),
                step_name::CODER,
            )],
            Some(step_name::APPROVER),
        )
        .add_edge(step_name::APPROVER, step_name::EXECUTOR)
        .add_edge(step_name::EXECUTOR, END)
        .interrupt_before(&[step_name::EXECUTOR])
        .build(checkpoints)
}

/// The orchestrated variant: a planner step emits the execution plan
/// and the plan router dispatches workers until the plan is exhausted,
/// which ends the run. The approval gate belongs to the fixed review
/// preset; while the router is active no fixed edge is consulted.
pub fn orchestrated_graph(
    registry: Arc<StepRegistry>,
    checkpoints: CheckpointStore,
) -> Result<WorkflowGraph, EngineError> {
    GraphBuilder::new(registry)
        .add_edge(START, step_name::ORCHESTRATOR)
        .with_plan_router()
        .build(checkpoints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::graph::RunStatus;
    use crate::skills::arithmetic_template;

    fn store() -> CheckpointStore {
        CheckpointStore::new(Database::open_in_memory().unwrap())
    }

    fn skills(dir: &tempfile::TempDir) -> Arc<SkillLoader> {
        let path = dir.path().join("arithmetic.skill");
        std::fs::write(&path, arithmetic_template("add")).unwrap();
        let loader = Arc::new(SkillLoader::new());
        loader.register("arithmetic", &path).unwrap();
        loader
    }

    #[test]
    fn default_registry_covers_both_presets() {
        let dir = tempfile::tempdir().unwrap();
        let registry = default_registry(None, skills(&dir)).unwrap();
        for name in REVIEW_STEPS.iter().chain(ORCHESTRATED_STEPS.iter()) {
            assert!(registry.has(name), "step {} not registered", name);
        }
    }

    #[test]
    fn initial_state_carries_every_engine_field() {
        let state = build_initial_state();
        for name in [
            field::MESSAGES,
            field::CODE_FILES,
            field::ITERATION_COUNT,
            field::REVIEW_STATUS,
            field::APPROVAL_STATUS,
            field::TEST_STATUS,
            field::EXECUTION_PLAN,
            field::ORCHESTRATOR_STATUS,
        ] {
            assert!(state.contains(name), "missing field {}", name);
        }
        assert_eq!(state.task().unwrap(), "Implement add(a, b) in app.rs.");
    }

    #[tokio::test]
    async fn review_graph_loops_until_approved_then_suspends() {
        let dir = tempfile::tempdir().unwrap();
        let registry = default_registry(None, skills(&dir)).unwrap();
        let graph = review_graph(registry, store()).unwrap();

        let outcome = graph.invoke("t", build_initial_state()).await.unwrap();

        // First coder pass gets rejected, the second approved, so two
        // iterations land before the approval boundary.
        assert_eq!(
            outcome.status,
            RunStatus::Interrupted {
                next_step: step_name::EXECUTOR.to_string()
            }
        );
        assert_eq!(outcome.state.iteration_count().unwrap(), 2);
        assert_eq!(
            outcome.state.review_status().unwrap(),
            Some(ReviewStatus::Approved)
        );
        assert_eq!(
            outcome.state.test_status().unwrap(),
            Some(TestStatus::Generated)
        );
    }

    #[tokio::test]
    async fn orchestrated_graph_runs_the_plan_to_exhaustion() {
        let dir = tempfile::tempdir().unwrap();
        let registry = default_registry(None, skills(&dir)).unwrap();
        let graph = orchestrated_graph(registry, store()).unwrap();

        let outcome = graph.invoke("t", build_initial_state()).await.unwrap();
        assert_eq!(outcome.status, RunStatus::Completed);

        let plan = outcome.state.plan().unwrap();
        assert!(!plan.is_empty());
        assert!(plan
            .iter()
            .all(|s| s.status == crate::models::PlanStepStatus::Completed));
        assert_eq!(
            outcome.state.review_status().unwrap(),
            Some(ReviewStatus::Approved)
        );
    }
}
