//! Coder role: writes code from the task, iterates on reviewer
//! feedback.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::EngineError;
use crate::models::ChatMessage;
use crate::registry::{Step, StepOutcome};
use crate::roles::{extract_code_block, TextGenerator, WORK_FILE};
use crate::state::{field, StateDelta, WorkflowState};

pub struct CoderStep {
    generator: Option<Arc<dyn TextGenerator>>,
}

impl CoderStep {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>) -> Self {
        Self { generator }
    }

    fn build_prompt(task: &str, feedback: Option<&str>, existing: Option<&str>) -> String {
        let mut prompt = format!("Write Rust code for this task:\n{}\n", task);
        if let Some(existing) = existing {
            prompt.push_str(&format!("\nCurrent code:\n```rust\n{}\n```\n", existing));
        }
        if let Some(feedback) = feedback {
            prompt.push_str(&format!("\nReviewer feedback to address:\n{}\n", feedback));
        }
        prompt.push_str("\nReply with a single fenced code block.");
        prompt
    }

    fn fallback(&self, state: &WorkflowState) -> Result<StepOutcome, EngineError> {
        let iteration = state.iteration_count()?;
        let mut code_files = state.code_files()?;

        // First pass is deliberately wrong so the review loop has
        // something to reject; the second pass fixes it.
        let (code, summary) = if iteration == 0 {
            (
                "fn add(a: i64, b: i64) -> i64 {\n    // TODO: fix math\n    a - b\n}\n",
                "initial implementation",
            )
        } else {
            (
                "fn add(a: i64, b: i64) -> i64 {\n    a + b\n}\n",
                "fixed math logic",
            )
        };
        code_files.insert(WORK_FILE.to_string(), code.to_string());

        Ok(self.outcome(state, code_files, iteration, summary))
    }

    async fn generate(
        &self,
        generator: &dyn TextGenerator,
        state: &WorkflowState,
    ) -> Result<StepOutcome, EngineError> {
        let iteration = state.iteration_count()?;
        let mut code_files = state.code_files()?;
        let task = state.task()?;

        let feedback = if iteration > 0 {
            state.get_as::<String>(field::REVIEWER_FEEDBACK)?
        } else {
            None
        };
        let prompt = Self::build_prompt(
            &task,
            feedback.as_deref(),
            code_files.get(WORK_FILE).map(|s| s.as_str()),
        );

        let response = generator.generate(&prompt).await?;
        let code = extract_code_block(&response);
        code_files.insert(WORK_FILE.to_string(), code);

        let summary = if iteration > 0 {
            "fixed code per feedback"
        } else {
            "initial implementation"
        };
        Ok(self.outcome(state, code_files, iteration, summary))
    }

    fn outcome(
        &self,
        state: &WorkflowState,
        code_files: BTreeMap<String, String>,
        iteration: i64,
        summary: &str,
    ) -> StepOutcome {
        let message = ChatMessage::assistant(format!("Coder: {}.", summary))
            .with_meta("step", serde_json::json!("coder"))
            .with_meta("summary", serde_json::json!(summary));
        StepOutcome::delta(
            StateDelta::new()
                .set(field::CODE_FILES, code_files)
                .set(field::ITERATION_COUNT, iteration + 1)
                .push_message(state, message),
        )
    }
}

#[async_trait]
impl Step for CoderStep {
    async fn execute(&self, state: &WorkflowState) -> Result<StepOutcome, EngineError> {
        match &self.generator {
            Some(generator) => self.generate(generator.as_ref(), state).await,
            None => self.fallback(state),
        }
    }
}
