//! Orchestrator role: breaks the task into an ordered execution plan
//! and publishes it for the plan router to drive.

use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;

use crate::error::EngineError;
use crate::models::{ChatMessage, OrchestratorStatus, PlanStep, PlanStepStatus};
use crate::registry::{Step, StepOutcome};
use crate::roles::TextGenerator;
use crate::state::{field, StateDelta, WorkflowState};

pub struct OrchestratorStep {
    generator: Option<Arc<dyn TextGenerator>>,
    available_steps: Vec<String>,
}

impl OrchestratorStep {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>) -> Self {
        Self {
            generator,
            available_steps: vec![
                "coder".to_string(),
                "reviewer".to_string(),
                "tester".to_string(),
            ],
        }
    }

    pub fn with_available_steps(mut self, steps: Vec<String>) -> Self {
        self.available_steps = steps;
        self
    }

    /// Parse plan lines of the form `1. [coder] Write the function`.
    fn parse_plan(response: &str) -> Vec<PlanStep> {
        let line = Regex::new(r"(?m)^\s*\d+\.\s*\[(\w+)\]\s*(.+)$").expect("static regex");
        line.captures_iter(response)
            .map(|caps| PlanStep::pending(caps[1].to_lowercase(), caps[2].trim()))
            .collect()
    }

    fn default_plan(task: &str) -> Vec<PlanStep> {
        vec![
            PlanStep::pending("coder", format!("Implement: {}", task)),
            PlanStep::pending("reviewer", "Review the implementation"),
            PlanStep::pending("tester", "Write and run tests"),
        ]
    }

    fn fallback(&self, state: &WorkflowState) -> Result<StepOutcome, EngineError> {
        let current = state.plan()?;

        if current.is_empty() {
            let task = state.task()?;
            let plan = Self::default_plan(&task);
            return Ok(self.publish(state, plan, "created execution plan"));
        }

        // Replanning pass: report progress, keep the plan as the
        // router left it.
        let done = current
            .iter()
            .filter(|s| s.status == PlanStepStatus::Completed)
            .count();
        let summary = format!("updated plan, {}/{} steps completed", done, current.len());
        Ok(self.publish(state, current, &summary))
    }

    async fn generate(
        &self,
        generator: &dyn TextGenerator,
        state: &WorkflowState,
    ) -> Result<StepOutcome, EngineError> {
        let task = state.task()?;
        let prompt = format!(
            "Break this task into ordered steps for these workers: {}.\n\
             Task: {}\n\n\
             Reply with numbered lines like:\n1. [coder] Write the function\n2. [reviewer] Review the code",
            self.available_steps.join(", "),
            task
        );
        let response = generator.generate(&prompt).await?;

        let mut plan = Self::parse_plan(&response);
        if plan.is_empty() {
            plan = Self::default_plan(&task);
        }
        Ok(self.publish(state, plan, "created execution plan"))
    }

    fn publish(&self, state: &WorkflowState, plan: Vec<PlanStep>, summary: &str) -> StepOutcome {
        let actionable = plan.iter().any(|s| {
            matches!(
                s.status,
                PlanStepStatus::Pending | PlanStepStatus::Failed | PlanStepStatus::InProgress
            )
        });
        // A populated plan is published as executing, never left in
        // planning with steps present.
        let status = if plan.is_empty() || !actionable {
            OrchestratorStatus::Completed
        } else {
            OrchestratorStatus::Executing
        };

        let message = ChatMessage::assistant(format!("Orchestrator: {}.", summary))
            .with_meta("step", serde_json::json!("orchestrator"))
            .with_meta("status", serde_json::json!(status.as_str()))
            .with_meta("plan_steps", serde_json::json!(plan.len()));
        StepOutcome::delta(
            StateDelta::new()
                .set(field::EXECUTION_PLAN, plan)
                .set(field::ORCHESTRATOR_STATUS, status)
                .push_message(state, message),
        )
    }
}

#[async_trait]
impl Step for OrchestratorStep {
    async fn execute(&self, state: &WorkflowState) -> Result<StepOutcome, EngineError> {
        match &self.generator {
            Some(generator) => self.generate(generator.as_ref(), state).await,
            None => self.fallback(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::build_initial_state;

    #[tokio::test]
    async fn empty_plan_becomes_populated_and_executing() {
        let orchestrator = OrchestratorStep::new(None);
        let mut state = build_initial_state();

        let outcome = orchestrator.execute(&state).await.unwrap();
        state.apply(outcome.delta);

        let plan = state.plan().unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].step, "coder");
        assert!(plan.iter().all(|s| s.status == PlanStepStatus::Pending));
        // Never `planning` with steps present.
        assert_eq!(
            state.orchestrator_status().unwrap(),
            Some(OrchestratorStatus::Executing)
        );
    }

    #[tokio::test]
    async fn exhausted_plan_reports_completed() {
        let orchestrator = OrchestratorStep::new(None);
        let mut state = build_initial_state();
        state.apply(StateDelta::new().set(
            field::EXECUTION_PLAN,
            vec![PlanStep {
                status: PlanStepStatus::Completed,
                ..PlanStep::pending("coder", "done already")
            }],
        ));

        let outcome = orchestrator.execute(&state).await.unwrap();
        state.apply(outcome.delta);
        assert_eq!(
            state.orchestrator_status().unwrap(),
            Some(OrchestratorStatus::Completed)
        );
    }

    #[test]
    fn parses_numbered_bracket_lines() {
        let plan = OrchestratorStep::parse_plan(
            "1. [Coder] Write the function\n2. [reviewer] Review the code\nnoise\n3. [tester] Add tests",
        );
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].step, "coder");
        assert_eq!(plan[2].task, "Add tests");
    }
}
