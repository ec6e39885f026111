//! Workflow state and deltas.
//!
//! `WorkflowState` is the single shared record flowing through a run:
//! an ordered field map, semantically typed per field. The executor
//! owns it exclusively; steps receive `&WorkflowState` and return a
//! `StateDelta`. Merging is replace-only: a delta fully replaces every
//! field it names, so each transition has an unambiguous, auditable
//! diff.
//!
//! A field required by a step must be present with a valid shape
//! before the step runs; `MissingField` / `FieldType` are distinct
//! error classes, never silent defaults.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::EngineError;
use crate::models::{
    ApprovalStatus, ChatMessage, OrchestratorStatus, PlanStep, ReviewStatus, TestStatus,
};

/// Well-known field names. Steps may introduce additional fields; the
/// engine itself only touches these.
pub mod field {
    pub const MESSAGES: &str = "messages";
    pub const CODE_FILES: &str = "code_files";
    pub const ITERATION_COUNT: &str = "iteration_count";
    pub const REVIEW_STATUS: &str = "review_status";
    pub const REVIEWER_FEEDBACK: &str = "reviewer_feedback";
    pub const PENDING_ACTION: &str = "pending_action";
    pub const APPROVAL_STATUS: &str = "approval_status";
    pub const LAST_EXECUTION: &str = "last_execution";
    pub const SKILL_RESULT: &str = "skill_result";
    pub const SKILL_REPAIR_ATTEMPTED: &str = "skill_repair_attempted";
    pub const TEST_CODE: &str = "test_code";
    pub const TEST_STATUS: &str = "test_status";
    pub const EXECUTION_PLAN: &str = "execution_plan";
    pub const ORCHESTRATOR_STATUS: &str = "orchestrator_status";
    pub const REWORK_REQUESTED: &str = "rework_requested";
}

/// The versioned, mergeable record passed between steps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowState {
    fields: BTreeMap<String, Value>,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    /// Required-field lookup: absence is an error, not a default.
    pub fn require(&self, name: &str) -> Result<&Value, EngineError> {
        self.fields
            .get(name)
            .ok_or_else(|| EngineError::MissingField(name.to_string()))
    }

    pub fn require_str(&self, name: &str) -> Result<&str, EngineError> {
        self.require(name)?.as_str().ok_or(EngineError::FieldType {
            field: name.to_string(),
            expected: "string",
        })
    }

    pub fn require_i64(&self, name: &str) -> Result<i64, EngineError> {
        self.require(name)?.as_i64().ok_or(EngineError::FieldType {
            field: name.to_string(),
            expected: "integer",
        })
    }

    pub fn require_bool(&self, name: &str) -> Result<bool, EngineError> {
        self.require(name)?.as_bool().ok_or(EngineError::FieldType {
            field: name.to_string(),
            expected: "boolean",
        })
    }

    /// Deserialize a required field into a typed value.
    pub fn require_as<T: serde::de::DeserializeOwned>(
        &self,
        name: &str,
    ) -> Result<T, EngineError> {
        serde_json::from_value(self.require(name)?.clone()).map_err(|_| EngineError::FieldType {
            field: name.to_string(),
            expected: std::any::type_name::<T>(),
        })
    }

    /// Optional typed lookup: `Ok(None)` when absent, `FieldType` when
    /// present but malformed.
    pub fn get_as<T: serde::de::DeserializeOwned>(
        &self,
        name: &str,
    ) -> Result<Option<T>, EngineError> {
        match self.fields.get(name) {
            None => Ok(None),
            Some(v) => serde_json::from_value(v.clone())
                .map(Some)
                .map_err(|_| EngineError::FieldType {
                    field: name.to_string(),
                    expected: std::any::type_name::<T>(),
                }),
        }
    }

    // ── Semantic accessors for the engine's well-known fields ──────

    pub fn messages(&self) -> Result<Vec<ChatMessage>, EngineError> {
        self.require_as(field::MESSAGES)
    }

    pub fn code_files(&self) -> Result<BTreeMap<String, String>, EngineError> {
        self.require_as(field::CODE_FILES)
    }

    pub fn iteration_count(&self) -> Result<i64, EngineError> {
        self.require_i64(field::ITERATION_COUNT)
    }

    pub fn review_status(&self) -> Result<Option<ReviewStatus>, EngineError> {
        self.get_as(field::REVIEW_STATUS)
    }

    pub fn approval_status(&self) -> Result<Option<ApprovalStatus>, EngineError> {
        self.get_as(field::APPROVAL_STATUS)
    }

    pub fn test_status(&self) -> Result<Option<TestStatus>, EngineError> {
        self.get_as(field::TEST_STATUS)
    }

    pub fn orchestrator_status(&self) -> Result<Option<OrchestratorStatus>, EngineError> {
        self.get_as(field::ORCHESTRATOR_STATUS)
    }

    pub fn plan(&self) -> Result<Vec<PlanStep>, EngineError> {
        self.require_as(field::EXECUTION_PLAN)
    }

    pub fn rework_requested(&self) -> Result<bool, EngineError> {
        Ok(self.get_as(field::REWORK_REQUESTED)?.unwrap_or(false))
    }

    /// The first user message, i.e. the task the workflow was started
    /// with.
    pub fn task(&self) -> Result<String, EngineError> {
        let messages = self.messages()?;
        Ok(messages
            .iter()
            .find(|m| m.role == crate::models::MessageRole::User)
            .map(|m| m.content.clone())
            .unwrap_or_else(|| "No task specified".to_string()))
    }

    /// Merge a delta into this state. New fields are added, existing
    /// fields are fully replaced.
    pub fn apply(&mut self, delta: StateDelta) {
        for (name, value) in delta.fields {
            self.fields.insert(name, value);
        }
    }

    /// Full JSON snapshot, used in step-failure errors and checkpoints.
    pub fn snapshot(&self) -> String {
        serde_json::to_string(&self.fields).unwrap_or_else(|_| "{}".to_string())
    }

    /// One-line summary for log lines: field names only.
    pub fn summary(&self) -> String {
        self.fields.keys().cloned().collect::<Vec<_>>().join(",")
    }
}

/// Partial state update returned by a step. Never a mutated shared
/// reference: the executor applies it after the step returns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateDelta {
    fields: BTreeMap<String, Value>,
}

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.fields.insert(name.to_string(), value);
        self
    }

    /// Append to the state's message log, carrying the full appended
    /// sequence in the delta (merge stays replace-only).
    pub fn push_message(self, state: &WorkflowState, message: ChatMessage) -> Self {
        let mut log: Vec<ChatMessage> = state
            .get_as(field::MESSAGES)
            .ok()
            .flatten()
            .unwrap_or_default();
        log.push(message);
        self.set(field::MESSAGES, log)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}
