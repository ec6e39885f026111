//! Graph executor — runs named steps against a shared, versioned state.
//!
//! The executor is a state machine over step names plus the START and
//! END sentinels. Transitions come from fixed edges, conditional edges
//! (predicates evaluated in declaration order, first match wins), or —
//! when a plan router is attached and active — the execution plan in
//! state. Every transition is checkpointed before the engine moves on,
//! so a process can die at any point and resume from the last
//! successfully written checkpoint with no partial-step re-execution.
//!
//! Suspension is a data boundary, not a frozen call stack: arriving at
//! an interrupt-before step writes a checkpoint with the interrupt
//! flag and returns control to the caller; `resume` applies an
//! external patch (e.g. an approval decision) and continues from the
//! stored next step.

mod presets;
mod router;

pub use presets::{
    build_initial_state, default_registry, orchestrated_graph, review_graph, ORCHESTRATED_STEPS,
    REVIEW_STEPS,
};
pub use router::PlanRouter;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::checkpoint::CheckpointStore;
use crate::error::EngineError;
use crate::registry::StepRegistry;
use crate::state::{StateDelta, WorkflowState};

/// Entry sentinel.
pub const START: &str = "__start__";
/// Terminal sentinel.
pub const END: &str = "__end__";

type EdgePredicate = Box<dyn Fn(&WorkflowState) -> Result<bool, EngineError> + Send + Sync>;

struct Branch {
    predicate: EdgePredicate,
    target: String,
}

struct ConditionalEdge {
    branches: Vec<Branch>,
    default: Option<String>,
}

/// How an invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// The graph reached END.
    Completed,
    /// Execution suspended before an interrupt-before step; call
    /// `resume` with an external patch to continue.
    Interrupted { next_step: String },
}

/// Result of `invoke`/`resume`: the final state and how the run ended.
#[derive(Debug)]
pub struct RunOutcome {
    pub thread_id: String,
    pub state: WorkflowState,
    pub status: RunStatus,
}

/// Builder for a [`WorkflowGraph`].
pub struct GraphBuilder {
    registry: Arc<StepRegistry>,
    fixed: HashMap<String, String>,
    conditional: HashMap<String, ConditionalEdge>,
    interrupt_before: HashSet<String>,
    plan_routed: bool,
    max_transitions: usize,
}

impl GraphBuilder {
    pub fn new(registry: Arc<StepRegistry>) -> Self {
        Self {
            registry,
            fixed: HashMap::new(),
            conditional: HashMap::new(),
            interrupt_before: HashSet::new(),
            plan_routed: false,
            max_transitions: crate::config::EngineConfig::default().max_transitions,
        }
    }

    /// Fixed edge `from → to`. `from` may be START, `to` may be END.
    pub fn add_edge(mut self, from: &str, to: &str) -> Self {
        self.fixed.insert(from.to_string(), to.to_string());
        self
    }

    /// Conditional edges out of `from`: predicates are evaluated in
    /// declaration order, first match wins, then the default. With no
    /// match and no default, routing fails with `NoMatchingEdge`.
    pub fn add_conditional_edges<P>(
        mut self,
        from: &str,
        branches: Vec<(P, &str)>,
        default: Option<&str>,
    ) -> Self
    where
        P: Fn(&WorkflowState) -> Result<bool, EngineError> + Send + Sync + 'static,
    {
        let edge = ConditionalEdge {
            branches: branches
                .into_iter()
                .map(|(predicate, target)| Branch {
                    predicate: Box::new(predicate),
                    target: target.to_string(),
                })
                .collect(),
            default: default.map(|d| d.to_string()),
        };
        self.conditional.insert(from.to_string(), edge);
        self
    }

    /// Suspend execution before each named step, awaiting `resume`.
    pub fn interrupt_before(mut self, steps: &[&str]) -> Self {
        for step in steps {
            self.interrupt_before.insert(step.to_string());
        }
        self
    }

    /// Route via the execution plan in state (when present and the
    /// orchestrator reports `executing`) instead of this graph's edges.
    pub fn with_plan_router(mut self) -> Self {
        self.plan_routed = true;
        self
    }

    /// Cap on transitions per invocation; a miswired cyclic graph
    /// fails loudly instead of spinning.
    pub fn max_transitions(mut self, cap: usize) -> Self {
        self.max_transitions = cap;
        self
    }

    pub fn build(self, checkpoints: CheckpointStore) -> Result<WorkflowGraph, EngineError> {
        if !self.fixed.contains_key(START) && !self.conditional.contains_key(START) {
            return Err(EngineError::NoMatchingEdge {
                step: START.to_string(),
            });
        }
        // Every declared target must resolve at build time; a typo'd
        // name fails here, not mid-run.
        for target in self.fixed.values() {
            if target != END && !self.registry.has(target) {
                return Err(EngineError::UnknownStep(target.clone()));
            }
        }
        for edge in self.conditional.values() {
            for target in edge
                .branches
                .iter()
                .map(|b| &b.target)
                .chain(edge.default.iter())
            {
                if target != END && !self.registry.has(target) {
                    return Err(EngineError::UnknownStep(target.clone()));
                }
            }
        }
        for step in &self.interrupt_before {
            if !self.registry.has(step) {
                return Err(EngineError::UnknownStep(step.clone()));
            }
        }
        Ok(WorkflowGraph {
            registry: self.registry,
            fixed: self.fixed,
            conditional: self.conditional,
            interrupt_before: self.interrupt_before,
            plan_routed: self.plan_routed,
            router: PlanRouter::new(),
            checkpoints,
            max_transitions: self.max_transitions,
        })
    }
}

/// The compiled, runnable graph.
pub struct WorkflowGraph {
    registry: Arc<StepRegistry>,
    fixed: HashMap<String, String>,
    conditional: HashMap<String, ConditionalEdge>,
    interrupt_before: HashSet<String>,
    plan_routed: bool,
    router: PlanRouter,
    checkpoints: CheckpointStore,
    max_transitions: usize,
}

impl std::fmt::Debug for WorkflowGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowGraph")
            .field("fixed", &self.fixed)
            .field("interrupt_before", &self.interrupt_before)
            .field("plan_routed", &self.plan_routed)
            .field("max_transitions", &self.max_transitions)
            .finish_non_exhaustive()
    }
}

impl WorkflowGraph {
    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Run the graph from START with a fresh state. One logical thread
    /// of control per thread_id; distinct thread_ids run independently.
    pub async fn invoke(
        &self,
        thread_id: &str,
        initial: WorkflowState,
    ) -> Result<RunOutcome, EngineError> {
        let mut state = initial;
        let first = self.resolve_next(START, &mut state, thread_id)?;
        tracing::info!(thread_id, first_step = first, "workflow invoked");
        self.run_loop(thread_id, state, first, false).await
    }

    /// Continue an interrupted (or failed) run: load the latest
    /// checkpoint, apply the externally supplied patch, clear the
    /// interrupt, and continue from the stored next step.
    pub async fn resume(
        &self,
        thread_id: &str,
        patch: StateDelta,
    ) -> Result<RunOutcome, EngineError> {
        let checkpoint = self.checkpoints.load_latest(thread_id).await?;
        let mut state = checkpoint.state;
        state.apply(patch);
        tracing::info!(
            thread_id,
            next_step = checkpoint.next_step,
            "workflow resumed"
        );
        self.run_loop(thread_id, state, checkpoint.next_step, true)
            .await
    }

    async fn run_loop(
        &self,
        thread_id: &str,
        mut state: WorkflowState,
        mut next: String,
        mut skip_interrupt: bool,
    ) -> Result<RunOutcome, EngineError> {
        let mut transitions = 0usize;

        loop {
            if next == END {
                tracing::info!(thread_id, "workflow completed");
                return Ok(RunOutcome {
                    thread_id: thread_id.to_string(),
                    state,
                    status: RunStatus::Completed,
                });
            }

            if !skip_interrupt && self.interrupt_before.contains(&next) {
                // Suspend: durable checkpoint first, then hand control back.
                self.checkpoints.save(thread_id, &state, &next, true).await?;
                tracing::info!(thread_id, step = next, "suspended before step");
                return Ok(RunOutcome {
                    thread_id: thread_id.to_string(),
                    state,
                    status: RunStatus::Interrupted { next_step: next },
                });
            }
            skip_interrupt = false;

            transitions += 1;
            if transitions > self.max_transitions {
                return Err(EngineError::Internal(format!(
                    "thread '{}' exceeded {} transitions at step '{}' (state: {})",
                    thread_id,
                    self.max_transitions,
                    next,
                    state.summary()
                )));
            }

            let step = self.registry.resolve(&next)?;
            tracing::debug!(thread_id, step = next, "executing step");

            let outcome = match step.execute(&state).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    // Do not advance past a failed step. Record the
                    // failure in the plan (when plan-routed) and leave
                    // a checkpoint pointing back at it so the caller
                    // can retry the same thread.
                    if self.plan_routed && self.router.is_active(&state)? {
                        self.router.on_step_failed(&mut state, &next)?;
                    }
                    self.checkpoints.save(thread_id, &state, &next, false).await?;
                    return Err(EngineError::StepExecution {
                        thread_id: thread_id.to_string(),
                        step: next,
                        reason: e.to_string(),
                        snapshot: state.snapshot(),
                    });
                }
            };

            state.apply(outcome.delta);

            if self.plan_routed && self.router.is_active(&state)? {
                self.router.on_step_complete(&mut state, &next)?;
            }

            let following = match outcome.next_hint {
                Some(hint) => hint,
                None => self.resolve_next(&next, &mut state, thread_id)?,
            };

            // The step counts as done only once this write completes.
            self.checkpoints
                .save(thread_id, &state, &following, false)
                .await?;

            next = following;
        }
    }

    /// Resolve the step after `current`: plan router when attached and
    /// active, otherwise fixed then conditional edges.
    fn resolve_next(
        &self,
        current: &str,
        state: &mut WorkflowState,
        thread_id: &str,
    ) -> Result<String, EngineError> {
        if self.plan_routed && self.router.is_active(state)? {
            return self.router.select(state, thread_id);
        }

        if let Some(target) = self.fixed.get(current) {
            return Ok(target.clone());
        }

        if let Some(edge) = self.conditional.get(current) {
            for branch in &edge.branches {
                if (branch.predicate)(state)? {
                    return Ok(branch.target.clone());
                }
            }
            if let Some(default) = &edge.default {
                return Ok(default.clone());
            }
        }

        Err(EngineError::NoMatchingEdge {
            step: current.to_string(),
        })
    }
}
