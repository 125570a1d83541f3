use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::context::WorkflowContext;
use crate::error::WorkflowError;

/// Deterministic orchestration code.
///
/// `run` may only reach the outside world through its [`WorkflowContext`]:
/// activities, timers, signals, child workflows, and `now()`. Anything else
/// (tokio timers, spawned tasks, direct I/O) breaks replay.
#[async_trait]
pub trait Workflow: Send + Sync + 'static {
    const NAME: &'static str;

    type Input: Serialize + DeserializeOwned + Send + Sync + 'static;
    type Output: Serialize + DeserializeOwned + Send + 'static;

    async fn run(
        &self,
        ctx: WorkflowContext,
        input: Self::Input,
    ) -> Result<Self::Output, WorkflowError>;
}

/// Start options for a workflow run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkflowOptions {
    /// Safety-net bound on the run's lifetime.
    pub execution_timeout: Option<Duration>,
}

impl WorkflowOptions {
    pub fn with_execution_timeout(timeout: Duration) -> Self {
        Self {
            execution_timeout: Some(timeout),
        }
    }
}

#[async_trait]
pub(crate) trait ErasedWorkflow: Send + Sync {
    async fn run(
        &self,
        ctx: WorkflowContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, WorkflowError>;
}

struct Typed<W>(W);

#[async_trait]
impl<W: Workflow> ErasedWorkflow for Typed<W> {
    async fn run(
        &self,
        ctx: WorkflowContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, WorkflowError> {
        let input: W::Input = serde_json::from_value(input)
            .map_err(|e| WorkflowError::Validation(format!("malformed {} input: {e}", W::NAME)))?;
        let output = self.0.run(ctx, input).await?;
        Ok(serde_json::to_value(output)?)
    }
}

/// Workflow types known to a worker, keyed by name.
#[derive(Default)]
pub struct WorkflowRegistry {
    workflows: HashMap<&'static str, Arc<dyn ErasedWorkflow>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<W: Workflow>(&mut self, workflow: W) {
        self.workflows.insert(W::NAME, Arc::new(Typed(workflow)));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.workflows.contains_key(name)
    }

    pub(crate) fn get(&self, name: &str) -> Result<Arc<dyn ErasedWorkflow>, WorkflowError> {
        self.workflows
            .get(name)
            .cloned()
            .ok_or_else(|| WorkflowError::UnknownWorkflowType(name.to_string()))
    }
}

impl std::fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.workflows.keys().collect();
        names.sort();
        f.debug_struct("WorkflowRegistry")
            .field("workflows", &names)
            .finish()
    }
}
