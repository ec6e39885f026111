//! Step registry: maps step names to executable units of work.
//!
//! A step is one narrow capability — `execute(&WorkflowState) ->
//! StepOutcome` — implemented by each role. There is no inheritance
//! hierarchy; role-specific behavior is just a different impl of the
//! same trait. The registry is an explicit, caller-constructed object
//! passed into the executor, never hidden ambient state.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::EngineError;
use crate::state::{StateDelta, WorkflowState};

/// Result of a single step execution: a partial state update, plus an
/// optional hint naming the step to run next (overrides edge
/// resolution when present).
#[derive(Debug, Default)]
pub struct StepOutcome {
    pub delta: StateDelta,
    pub next_hint: Option<String>,
}

impl StepOutcome {
    pub fn delta(delta: StateDelta) -> Self {
        Self {
            delta,
            next_hint: None,
        }
    }

    pub fn with_hint(mut self, next: impl Into<String>) -> Self {
        self.next_hint = Some(next.into());
        self
    }
}

/// One named unit of work transforming state.
#[async_trait]
pub trait Step: Send + Sync {
    async fn execute(&self, state: &WorkflowState) -> Result<StepOutcome, EngineError>;
}

/// Adapter for function-shaped steps (tests, small glue steps).
pub struct FnStep<F>(F);

impl<F> FnStep<F>
where
    F: Fn(&WorkflowState) -> Result<StepOutcome, EngineError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: Fn(&WorkflowState) -> Result<StepOutcome, EngineError> + Send + Sync,
{
    async fn execute(&self, state: &WorkflowState) -> Result<StepOutcome, EngineError> {
        (self.0)(state)
    }
}

type StepFactory = Box<dyn Fn() -> Arc<dyn Step> + Send + Sync>;

struct RegistryInner {
    steps: HashMap<String, Arc<dyn Step>>,
    factories: HashMap<String, StepFactory>,
}

/// Registry of steps, supporting eager instances and lazy factories.
pub struct StepRegistry {
    inner: RwLock<RegistryInner>,
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StepRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                steps: HashMap::new(),
                factories: HashMap::new(),
            }),
        }
    }

    /// Register a step instance. Fails with `DuplicateName` when the
    /// name is taken, unless `overwrite` is set.
    pub fn register(
        &self,
        name: &str,
        step: Arc<dyn Step>,
        overwrite: bool,
    ) -> Result<(), EngineError> {
        let mut inner = self.write()?;
        if !overwrite && (inner.steps.contains_key(name) || inner.factories.contains_key(name)) {
            return Err(EngineError::DuplicateName(name.to_string()));
        }
        inner.factories.remove(name);
        inner.steps.insert(name.to_string(), step);
        Ok(())
    }

    /// Register a factory for lazy construction; the step is built on
    /// first `resolve` and cached.
    pub fn register_factory<F>(&self, name: &str, factory: F, overwrite: bool) -> Result<(), EngineError>
    where
        F: Fn() -> Arc<dyn Step> + Send + Sync + 'static,
    {
        let mut inner = self.write()?;
        if !overwrite && (inner.steps.contains_key(name) || inner.factories.contains_key(name)) {
            return Err(EngineError::DuplicateName(name.to_string()));
        }
        inner.steps.remove(name);
        inner.factories.insert(name.to_string(), Box::new(factory));
        Ok(())
    }

    /// Look up a ready-to-invoke step, constructing from a factory on
    /// first use. Unknown names surface immediately.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Step>, EngineError> {
        {
            let inner = self.read()?;
            if let Some(step) = inner.steps.get(name) {
                return Ok(step.clone());
            }
        }
        let mut inner = self.write()?;
        if let Some(step) = inner.steps.get(name) {
            return Ok(step.clone());
        }
        if let Some(factory) = inner.factories.get(name) {
            let step = factory();
            inner.steps.insert(name.to_string(), step.clone());
            return Ok(step);
        }
        Err(EngineError::UnknownStep(name.to_string()))
    }

    pub fn has(&self, name: &str) -> bool {
        self.read()
            .map(|inner| inner.steps.contains_key(name) || inner.factories.contains_key(name))
            .unwrap_or(false)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .read()
            .map(|inner| {
                inner
                    .steps
                    .keys()
                    .chain(inner.factories.keys())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names.dedup();
        names
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, RegistryInner>, EngineError> {
        self.inner
            .read()
            .map_err(|e| EngineError::Internal(format!("registry lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, RegistryInner>, EngineError> {
        self.inner
            .write()
            .map_err(|e| EngineError::Internal(format!("registry lock poisoned: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Arc<dyn Step> {
        Arc::new(FnStep::new(|_state| Ok(StepOutcome::default())))
    }

    #[test]
    fn duplicate_registration_fails_without_overwrite() {
        let registry = StepRegistry::new();
        registry.register("coder", noop(), false).unwrap();
        assert!(matches!(
            registry.register("coder", noop(), false),
            Err(EngineError::DuplicateName(_))
        ));
        registry.register("coder", noop(), true).unwrap();
    }

    #[test]
    fn unknown_step_surfaces_immediately() {
        let registry = StepRegistry::new();
        assert!(matches!(
            registry.resolve("ghost"),
            Err(EngineError::UnknownStep(_))
        ));
    }

    #[test]
    fn factory_constructs_lazily_and_caches() {
        let registry = StepRegistry::new();
        registry.register_factory("lazy", noop, false).unwrap();
        assert!(registry.has("lazy"));
        let first = registry.resolve("lazy").unwrap();
        let second = registry.resolve("lazy").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
