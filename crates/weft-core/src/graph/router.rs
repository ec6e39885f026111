//! Plan-driven routing.
//!
//! The dynamic alternative to fixed edges: the orchestrator step emits
//! an ordered execution plan into state, and the router consults that
//! plan to pick the next step. The router is the only component that
//! mutates plan entries; roles signal outcomes through ordinary state
//! fields.

use crate::error::EngineError;
use crate::models::{OrchestratorStatus, PlanStep, PlanStepStatus};
use crate::state::{field, StateDelta, WorkflowState};

#[derive(Debug, Default)]
pub struct PlanRouter;

impl PlanRouter {
    pub fn new() -> Self {
        Self
    }

    /// The router is active only when state carries an execution plan
    /// and the orchestrator reports `executing`.
    pub fn is_active(&self, state: &WorkflowState) -> Result<bool, EngineError> {
        if !state.contains(field::EXECUTION_PLAN) {
            return Ok(false);
        }
        Ok(state.orchestrator_status()? == Some(OrchestratorStatus::Executing))
    }

    /// Pick the step to dispatch next and mark it `in_progress`.
    ///
    /// Scan order: the first `pending` or `failed` entry wins; an
    /// `in_progress` entry left over from an unfinished dispatch is
    /// re-selected; with no actionable entry the plan is exhausted and
    /// the run transitions to END.
    pub fn select(
        &self,
        state: &mut WorkflowState,
        thread_id: &str,
    ) -> Result<String, EngineError> {
        let mut plan = state.plan()?;
        if plan.is_empty() {
            return Err(EngineError::EmptyPlan {
                thread_id: thread_id.to_string(),
            });
        }

        if let Some(entry) = plan.iter_mut().find(|s| {
            s.status == PlanStepStatus::Pending || s.status == PlanStepStatus::Failed
        }) {
            entry.status = PlanStepStatus::InProgress;
            let step = entry.step.clone();
            write_plan(state, plan);
            tracing::debug!(thread_id, step, "plan router selected step");
            return Ok(step);
        }

        if let Some(entry) = plan.iter().find(|s| s.status == PlanStepStatus::InProgress) {
            tracing::debug!(thread_id, step = entry.step, "re-dispatching in-progress step");
            return Ok(entry.step.clone());
        }

        tracing::info!(thread_id, "execution plan exhausted");
        Ok(crate::graph::END.to_string())
    }

    /// Record a step's completion in the plan.
    ///
    /// When the completing step set the rework flag (a reviewer
    /// requesting changes), its own entry goes back to `pending` and
    /// the nearest preceding `completed` entry — the producer of the
    /// artifact under review — is reset to `pending`, forming a
    /// bounded retry loop. Otherwise the entry is marked `completed`.
    pub fn on_step_complete(
        &self,
        state: &mut WorkflowState,
        step: &str,
    ) -> Result<(), EngineError> {
        let mut plan = state.plan()?;
        let Some(index) = plan
            .iter()
            .position(|s| s.step == step && s.status == PlanStepStatus::InProgress)
        else {
            // Step is not plan-tracked (e.g. the orchestrator itself).
            return Ok(());
        };

        if state.rework_requested()? {
            plan[index].status = PlanStepStatus::Pending;
            if let Some(producer) = plan[..index]
                .iter_mut()
                .rev()
                .find(|s| s.status == PlanStepStatus::Completed)
            {
                tracing::info!(
                    step,
                    producer = producer.step,
                    "rework requested, resetting producer"
                );
                producer.status = PlanStepStatus::Pending;
            }
            write_plan(state, plan);
            state.apply(StateDelta::new().set(field::REWORK_REQUESTED, false));
        } else {
            plan[index].status = PlanStepStatus::Completed;
            write_plan(state, plan);
        }
        Ok(())
    }

    /// Mark a step's plan entry as `failed` after an execution error,
    /// so a later re-invocation of the same thread retries it.
    pub fn on_step_failed(&self, state: &mut WorkflowState, step: &str) -> Result<(), EngineError> {
        let mut plan = state.plan()?;
        if let Some(entry) = plan
            .iter_mut()
            .find(|s| s.step == step && s.status == PlanStepStatus::InProgress)
        {
            entry.status = PlanStepStatus::Failed;
            write_plan(state, plan);
        }
        Ok(())
    }
}

fn write_plan(state: &mut WorkflowState, plan: Vec<PlanStep>) {
    state.apply(StateDelta::new().set(field::EXECUTION_PLAN, plan));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_plan(entries: Vec<PlanStep>) -> WorkflowState {
        let mut state = WorkflowState::new();
        state.apply(
            StateDelta::new()
                .set(field::EXECUTION_PLAN, entries)
                .set(field::ORCHESTRATOR_STATUS, OrchestratorStatus::Executing),
        );
        state
    }

    #[test]
    fn inactive_without_plan_or_executing_status() {
        let router = PlanRouter::new();
        let state = WorkflowState::new();
        assert!(!router.is_active(&state).unwrap());

        let mut planning = state_with_plan(vec![PlanStep::pending("coder", "implement")]);
        planning.apply(
            StateDelta::new().set(field::ORCHESTRATOR_STATUS, OrchestratorStatus::Planning),
        );
        assert!(!router.is_active(&planning).unwrap());
    }

    #[test]
    fn selects_first_pending_and_marks_in_progress() {
        let router = PlanRouter::new();
        let mut state = state_with_plan(vec![
            PlanStep {
                status: PlanStepStatus::Completed,
                ..PlanStep::pending("coder", "implement")
            },
            PlanStep::pending("reviewer", "review"),
        ]);
        let next = router.select(&mut state, "t").unwrap();
        assert_eq!(next, "reviewer");
        let plan = state.plan().unwrap();
        assert_eq!(plan[1].status, PlanStepStatus::InProgress);
    }

    #[test]
    fn failed_entries_are_retried() {
        let router = PlanRouter::new();
        let mut state = state_with_plan(vec![PlanStep {
            status: PlanStepStatus::Failed,
            ..PlanStep::pending("coder", "implement")
        }]);
        assert_eq!(router.select(&mut state, "t").unwrap(), "coder");
    }

    #[test]
    fn empty_plan_is_an_error_not_a_completion() {
        let router = PlanRouter::new();
        let mut state = state_with_plan(vec![]);
        assert!(matches!(
            router.select(&mut state, "t"),
            Err(EngineError::EmptyPlan { .. })
        ));
    }

    #[test]
    fn exhausted_plan_routes_to_end() {
        let router = PlanRouter::new();
        let mut state = state_with_plan(vec![PlanStep {
            status: PlanStepStatus::Completed,
            ..PlanStep::pending("coder", "implement")
        }]);
        assert_eq!(router.select(&mut state, "t").unwrap(), crate::graph::END);
    }

    #[test]
    fn rework_resets_nearest_preceding_completed_producer() {
        let router = PlanRouter::new();
        let mut state = state_with_plan(vec![
            PlanStep {
                status: PlanStepStatus::Completed,
                ..PlanStep::pending("coder", "implement")
            },
            PlanStep {
                status: PlanStepStatus::InProgress,
                ..PlanStep::pending("reviewer", "review")
            },
            PlanStep::pending("tester", "test"),
        ]);
        state.apply(StateDelta::new().set(field::REWORK_REQUESTED, true));

        router.on_step_complete(&mut state, "reviewer").unwrap();

        let plan = state.plan().unwrap();
        assert_eq!(plan[0].status, PlanStepStatus::Pending); // coder reset
        assert_eq!(plan[1].status, PlanStepStatus::Pending); // reviewer re-queued
        assert_eq!(plan[2].status, PlanStepStatus::Pending);
        assert!(!state.rework_requested().unwrap());

        // Producer runs again before the reviewer.
        assert_eq!(router.select(&mut state, "t").unwrap(), "coder");
    }

    #[test]
    fn completion_without_rework_marks_completed() {
        let router = PlanRouter::new();
        let mut state = state_with_plan(vec![PlanStep {
            status: PlanStepStatus::InProgress,
            ..PlanStep::pending("coder", "implement")
        }]);
        router.on_step_complete(&mut state, "coder").unwrap();
        assert_eq!(state.plan().unwrap()[0].status, PlanStepStatus::Completed);
    }
}
