//! Per-execution configuration and the context handed to every step

use crate::core::{error::PipelineError, pipeline::Pipeline, state::State};
use crate::execution::{
    engine::{ExecutionEngine, ExecutionScope},
    events::{ExecutionEvent, Phase, ProgressEvent},
    CancellationToken,
};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Read-only record attached to an execution. Steps read it; merges never touch it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Job title of the requesting user, used to tailor assistant answers
    #[serde(default)]
    pub user_title: Option<String>,

    #[serde(default)]
    pub user_id: Option<String>,

    /// Conversation thread, used for checkpoint continuation
    #[serde(default)]
    pub thread_id: Option<String>,

    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_title(mut self, title: impl Into<String>) -> Self {
        self.user_title = Some(title.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }
}

/// What a running step can see of its execution
#[derive(Clone)]
pub struct StepContext {
    engine: ExecutionEngine,
    scope: Arc<ExecutionScope>,
    step: String,
}

impl StepContext {
    pub(crate) fn new(engine: ExecutionEngine, scope: Arc<ExecutionScope>, step: &str) -> Self {
        Self {
            engine,
            scope,
            step: step.to_string(),
        }
    }

    /// Context for one branch of a parallel step: same execution, branch name
    pub(crate) fn for_branch(&self, branch: &str) -> Self {
        Self {
            engine: self.engine.clone(),
            scope: self.scope.clone(),
            step: branch.to_string(),
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.scope.config
    }

    pub fn step_name(&self) -> &str {
        &self.step
    }

    pub fn execution_id(&self) -> Uuid {
        self.scope.execution_id
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.scope.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.scope.cancel.is_cancelled()
    }

    /// Engine-wide default concurrency bound for fan-out steps
    pub fn fan_out_limit(&self) -> Option<usize> {
        self.engine.options().fan_out_limit
    }

    /// Emit `{action, phase}` on the progress channel
    pub fn progress(&self, action: &str, phase: Phase) {
        self.emit_progress(ProgressEvent::new(action, phase));
    }

    pub fn emit_progress(&self, event: ProgressEvent) {
        self.emit(ExecutionEvent::Progress {
            execution_id: self.scope.execution_id,
            event,
        });
    }

    pub(crate) fn emit(&self, event: ExecutionEvent) {
        self.scope.emitter.emit(event);
    }

    /// Run `pipeline` as a nested execution.
    ///
    /// The nested run gets its own execution id but shares this execution's
    /// configuration, cancellation token, deadline and event handlers.
    pub fn run_pipeline<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        input: State,
    ) -> BoxFuture<'a, Result<State, PipelineError>> {
        Box::pin(async move {
            let scope = Arc::new(self.scope.child());
            self.engine.run_scoped(pipeline, input, scope).await
        })
    }
}
