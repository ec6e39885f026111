//! Tester role: generates tests for the work file, or skips when
//! there is nothing testable.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::EngineError;
use crate::models::{ChatMessage, TestStatus};
use crate::registry::{Step, StepOutcome};
use crate::roles::{extract_code_block, TextGenerator, WORK_FILE};
use crate::state::{field, StateDelta, WorkflowState};

const FALLBACK_TESTS: &str = "#[test]\nfn add_positive_numbers() {\n    assert_eq!(add(2, 3), 5);\n}\n\n#[test]\nfn add_negative_numbers() {\n    assert_eq!(add(-1, -2), -3);\n}\n\n#[test]\nfn add_zero() {\n    assert_eq!(add(0, 5), 5);\n}\n";

pub struct TesterStep {
    generator: Option<Arc<dyn TextGenerator>>,
}

impl TesterStep {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>) -> Self {
        Self { generator }
    }

    fn fallback(&self, state: &WorkflowState) -> Result<StepOutcome, EngineError> {
        let code_files = state.code_files()?;
        let code = code_files.get(WORK_FILE).map(|s| s.as_str()).unwrap_or("");

        let (test_code, status) = if code.contains("fn add") {
            (FALLBACK_TESTS.to_string(), TestStatus::Generated)
        } else {
            ("// No testable code found".to_string(), TestStatus::Skipped)
        };

        Ok(self.outcome(state, test_code, status))
    }

    async fn generate(
        &self,
        generator: &dyn TextGenerator,
        state: &WorkflowState,
    ) -> Result<StepOutcome, EngineError> {
        let code_files = state.code_files()?;
        let code = code_files.get(WORK_FILE).map(|s| s.as_str()).unwrap_or("");
        if code.is_empty() {
            return self.fallback(state);
        }

        let prompt = format!(
            "Write Rust unit tests for this code. Reply with a single fenced code block.\n\n```rust\n{}\n```",
            code
        );
        let response = generator.generate(&prompt).await?;
        let test_code = extract_code_block(&response);
        Ok(self.outcome(state, test_code, TestStatus::Generated))
    }

    fn outcome(&self, state: &WorkflowState, test_code: String, status: TestStatus) -> StepOutcome {
        let message = ChatMessage::assistant(format!("Tester: {} tests.", status.as_str()))
            .with_meta("step", serde_json::json!("tester"))
            .with_meta("status", serde_json::json!(status.as_str()));
        StepOutcome::delta(
            StateDelta::new()
                .set(field::TEST_CODE, test_code)
                .set(field::TEST_STATUS, status)
                .push_message(state, message),
        )
    }
}

#[async_trait]
impl Step for TesterStep {
    async fn execute(&self, state: &WorkflowState) -> Result<StepOutcome, EngineError> {
        match &self.generator {
            Some(generator) => self.generate(generator.as_ref(), state).await,
            None => self.fallback(state),
        }
    }
}
