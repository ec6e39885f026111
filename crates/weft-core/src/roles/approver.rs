//! Approval gate and skill executor.
//!
//! The approver records a pending action and relies on the graph's
//! interrupt boundary to pause for a human decision. The executor runs
//! the approved action against a loaded skill, with a one-shot repair
//! path when the skill misbehaves.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::EngineError;
use crate::models::{ApprovalStatus, ChatMessage};
use crate::registry::{Step, StepOutcome};
use crate::roles::WORK_FILE;
use crate::skills::{arithmetic_template, SkillEditor, SkillLoader};
use crate::state::{field, StateDelta, WorkflowState};

const SKILL_NAME: &str = "arithmetic";
const SKILL_OP: &str = "add";

/// Records the action awaiting approval. Graphs interrupt before the
/// executor, so the decision lands in state via a resume patch.
pub struct ApproverStep;

impl ApproverStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ApproverStep {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Step for ApproverStep {
    async fn execute(&self, state: &WorkflowState) -> Result<StepOutcome, EngineError> {
        let status = state.approval_status()?.unwrap_or(ApprovalStatus::Pending);
        let action = format!("execute:{}:add()", WORK_FILE);

        let message = ChatMessage::assistant(format!(
            "Approval requested for executing {}.",
            WORK_FILE
        ))
        .with_meta("step", serde_json::json!("approver"))
        .with_meta("pending_action", serde_json::json!(action));
        Ok(StepOutcome::delta(
            StateDelta::new()
                .set(field::PENDING_ACTION, action)
                .set(field::APPROVAL_STATUS, status)
                .push_message(state, message),
        ))
    }
}

/// Runs the approved action through a skill, repairing the skill
/// source once if the invocation fails.
pub struct SkillExecutorStep {
    loader: Arc<SkillLoader>,
    editor: SkillEditor,
}

impl SkillExecutorStep {
    pub fn new(loader: Arc<SkillLoader>) -> Self {
        let editor = SkillEditor::new(loader.clone());
        Self { loader, editor }
    }

    fn invoke(&self) -> Result<i64, EngineError> {
        let handle = match self.loader.get(SKILL_NAME) {
            Ok(handle) => handle,
            Err(EngineError::NotLoaded(_)) => self.loader.load(SKILL_NAME)?,
            Err(e) => return Err(e),
        };
        handle.invoke(SKILL_OP, 2, 3)
    }

    /// Rewrite the skill source from the known-good template and swap
    /// the reloaded handle in.
    fn repair(&self) -> Result<(), EngineError> {
        self.editor
            .update_source(SKILL_NAME, &arithmetic_template(SKILL_OP))?;
        self.loader.reload(SKILL_NAME)?;
        Ok(())
    }

    fn outcome(&self, state: &WorkflowState, result: i64, repaired: bool) -> StepOutcome {
        let summary = if repaired {
            format!("Executor: skill repaired, add(2, 3) = {}.", result)
        } else {
            format!("Executor: add(2, 3) = {}.", result)
        };
        let message = ChatMessage::assistant(summary)
            .with_meta("step", serde_json::json!("executor"))
            .with_meta("result", serde_json::json!(result));

        let mut delta = StateDelta::new()
            .set(field::LAST_EXECUTION, format!("add(2, 3) = {}", result))
            .set(field::SKILL_RESULT, result)
            .push_message(state, message);
        if repaired {
            delta = delta.set(field::SKILL_REPAIR_ATTEMPTED, true);
        }
        StepOutcome::delta(delta)
    }
}

#[async_trait]
impl Step for SkillExecutorStep {
    async fn execute(&self, state: &WorkflowState) -> Result<StepOutcome, EngineError> {
        match state.approval_status()? {
            Some(ApprovalStatus::Approved) => {}
            Some(ApprovalStatus::Denied) => {
                // An explicit denial skips the action but finishes the
                // run; the thread stays auditable through checkpoints.
                let message = ChatMessage::assistant("Executor: action denied, nothing run.")
                    .with_meta("step", serde_json::json!("executor"))
                    .with_meta("decision", serde_json::json!("denied"));
                return Ok(StepOutcome::delta(
                    StateDelta::new()
                        .set(field::LAST_EXECUTION, "denied")
                        .push_message(state, message),
                ));
            }
            other => {
                return Err(EngineError::Internal(format!(
                    "executor invoked without approval (status: {})",
                    other.map(|s| s.as_str()).unwrap_or("absent")
                )));
            }
        }

        match self.invoke() {
            Ok(result) => Ok(self.outcome(state, result, false)),
            Err(first) => {
                // One repair attempt per thread; a second failure is
                // the caller's problem.
                if state.require_bool(field::SKILL_REPAIR_ATTEMPTED).unwrap_or(false) {
                    return Err(first);
                }
                tracing::warn!(skill = SKILL_NAME, error = %first, "skill invocation failed, repairing");
                self.repair()?;
                let result = self.invoke()?;
                Ok(self.outcome(state, result, true))
            }
        }
    }
}
