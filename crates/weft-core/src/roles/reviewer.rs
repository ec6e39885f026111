//! Reviewer role: approves code or requests changes. A "changes"
//! verdict raises the rework flag the plan router consumes.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::EngineError;
use crate::models::{ChatMessage, ReviewStatus};
use crate::registry::{Step, StepOutcome};
use crate::roles::{TextGenerator, WORK_FILE};
use crate::state::{field, StateDelta, WorkflowState};

pub struct ReviewerStep {
    generator: Option<Arc<dyn TextGenerator>>,
}

impl ReviewerStep {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>) -> Self {
        Self { generator }
    }

    /// Verdict parsing: an explicit APPROVED wins only when the
    /// response does not also request changes; anything ambiguous is
    /// treated as a change request.
    fn parse_verdict(response: &str) -> ReviewStatus {
        let upper = response.to_uppercase();
        if upper.contains("APPROVED") && !upper.contains("CHANGES_REQUESTED") {
            ReviewStatus::Approved
        } else {
            ReviewStatus::Changes
        }
    }

    fn fallback(&self, state: &WorkflowState) -> Result<StepOutcome, EngineError> {
        let code_files = state.code_files()?;
        let code = code_files.get(WORK_FILE).map(|s| s.as_str()).unwrap_or("");

        let (status, feedback) = if code.contains("a + b") && !code.contains("TODO") {
            (ReviewStatus::Approved, "Reviewer: approved.".to_string())
        } else {
            (
                ReviewStatus::Changes,
                "Reviewer: add() is incorrect; please fix math.".to_string(),
            )
        };

        Ok(self.outcome(state, status, feedback))
    }

    async fn generate(
        &self,
        generator: &dyn TextGenerator,
        state: &WorkflowState,
    ) -> Result<StepOutcome, EngineError> {
        let code_files = state.code_files()?;
        let code = code_files.get(WORK_FILE).map(|s| s.as_str()).unwrap_or("");
        let task = state.task()?;

        let prompt = format!(
            "Review this Rust code against the task.\n\nTask: {}\n\nCode:\n```rust\n{}\n```\n\n\
             Reply APPROVED, or CHANGES_REQUESTED followed by what to fix.",
            task, code
        );
        let response = generator.generate(&prompt).await?;
        let status = Self::parse_verdict(&response);
        Ok(self.outcome(state, status, response))
    }

    fn outcome(
        &self,
        state: &WorkflowState,
        status: ReviewStatus,
        feedback: String,
    ) -> StepOutcome {
        let message = ChatMessage::assistant(feedback.clone())
            .with_meta("step", serde_json::json!("reviewer"))
            .with_meta("status", serde_json::json!(status.as_str()));
        StepOutcome::delta(
            StateDelta::new()
                .set(field::REVIEW_STATUS, status)
                .set(field::REVIEWER_FEEDBACK, feedback)
                .set(field::REWORK_REQUESTED, status == ReviewStatus::Changes)
                .push_message(state, message),
        )
    }
}

#[async_trait]
impl Step for ReviewerStep {
    async fn execute(&self, state: &WorkflowState) -> Result<StepOutcome, EngineError> {
        match &self.generator {
            Some(generator) => self.generate(generator.as_ref(), state).await,
            None => self.fallback(state),
        }
    }
}
