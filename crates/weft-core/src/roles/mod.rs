//! Role steps: the units of work wired into workflow graphs.
//!
//! Every role implements the one `Step` capability and comes in two
//! flavors behind the same impl: an optional text generator (the
//! opaque LLM seam) and a deterministic fallback path that produces a
//! valid delta with no generator present. The engine never depends on
//! the generator being there.

mod approver;
mod coder;
mod orchestrator;
mod reviewer;
mod tester;

pub use approver::{ApproverStep, SkillExecutorStep};
pub use coder::CoderStep;
pub use orchestrator::OrchestratorStep;
pub use reviewer::ReviewerStep;
pub use tester::TesterStep;

use async_trait::async_trait;

use crate::error::EngineError;

/// Canonical step names used by the built-in graphs.
pub mod step_name {
    pub const CODER: &str = "coder";
    pub const REVIEWER: &str = "reviewer";
    pub const TESTER: &str = "tester";
    pub const ORCHESTRATOR: &str = "orchestrator";
    pub const APPROVER: &str = "approver";
    pub const EXECUTOR: &str = "executor";
}

/// The one file the built-in coding roles work on.
pub(crate) const WORK_FILE: &str = "app.rs";

/// Opaque text-completion capability. External, possibly failing; the
/// core tolerates its absence entirely.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, EngineError>;
}

/// Extract the first fenced code block from a generator response, or
/// the trimmed response when no fence is present.
pub(crate) fn extract_code_block(response: &str) -> String {
    let fence = regex::Regex::new(r"(?s)```(?:\w+)?\s*\n?(.*?)```").expect("static regex");
    fence
        .captures(response)
        .map(|caps| caps[1].trim().to_string())
        .unwrap_or_else(|| response.trim().to_string())
}
