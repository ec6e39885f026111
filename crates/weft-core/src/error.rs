//! Core error type for the Weft engine.
//!
//! `EngineError` is used throughout the core domain (executor, stores,
//! skills, messaging). Every failure that crosses a component boundary
//! is one of these variants; lookup errors surface immediately with no
//! silent fallback.

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A step (or skill) name is already registered and no overwrite
    /// flag was given.
    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    #[error("Unknown step: {0}")]
    UnknownStep(String),

    /// No conditional-edge predicate matched and no default edge exists.
    #[error("No matching edge from step '{step}'")]
    NoMatchingEdge { step: String },

    /// A step raised during execution. Carries the step name and a
    /// serialized snapshot of the state at the failing transition so
    /// the caller can reproduce it.
    #[error("Step '{step}' failed (thread {thread_id}): {reason}")]
    StepExecution {
        thread_id: String,
        step: String,
        reason: String,
        snapshot: String,
    },

    /// The state claims an executing plan with zero steps.
    #[error("Execution plan is empty (thread {thread_id})")]
    EmptyPlan { thread_id: String },

    /// Skill source could not be resolved or parsed.
    #[error("Failed to load skill '{name}': {reason}")]
    Load { name: String, reason: String },

    /// A reload failed and was rolled back; the prior handle is intact.
    #[error("Reload of skill '{name}' failed (kept v{prior}, attempted v{attempted}): {reason}")]
    Reload {
        name: String,
        prior: u64,
        attempted: u64,
        reason: String,
    },

    #[error("Message queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Message queue is empty")]
    QueueEmpty,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Skill '{0}' is registered but not loaded")]
    NotLoaded(String),

    /// A step required a state field that is absent.
    #[error("State field '{0}' is missing")]
    MissingField(String),

    /// A state field is present but has the wrong shape.
    #[error("State field '{field}' has the wrong type: expected {expected}")]
    FieldType {
        field: String,
        expected: &'static str,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// True for errors a caller may retry by re-invoking the same
    /// thread (the engine itself never auto-retries).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::StepExecution { .. } | EngineError::Database(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_failures_are_retryable() {
        let step = EngineError::StepExecution {
            thread_id: "t1".to_string(),
            step: "coder".to_string(),
            reason: "kaput".to_string(),
            snapshot: "{}".to_string(),
        };
        assert!(step.is_retryable());
        assert!(EngineError::Database("locked".to_string()).is_retryable());

        // Wiring and lookup mistakes never are.
        assert!(!EngineError::UnknownStep("ghost".to_string()).is_retryable());
        assert!(!EngineError::MissingField("messages".to_string()).is_retryable());
    }
}
