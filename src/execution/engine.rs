//! Main execution engine - drives one execution through a pipeline graph

use crate::core::{
    config::EngineConfig,
    context::{RunConfig, StepContext},
    error::{PipelineError, StepError},
    pipeline::{Pipeline, END},
    schema::Strictness,
    state::State,
    ExecutionStatus,
};
use crate::execution::{
    events::{EventEmitter, EventHandler, ExecutionEvent},
    CancellationToken,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Engine-wide execution options
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Treatment of caller fields outside a pipeline's schema
    pub strictness: Strictness,

    /// Default concurrency bound for fan-out steps that set none
    pub fan_out_limit: Option<usize>,

    /// Default advisory deadline for executions that set none
    pub timeout: Option<Duration>,
}

impl EngineOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            strictness: config.strictness,
            fan_out_limit: config.fan_out_limit,
            timeout: config.timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Per-run options supplied by the caller of [`ExecutionEngine::execute`]
#[derive(Clone, Default)]
pub struct RunContext {
    pub config: RunConfig,
    pub cancel: CancellationToken,
    pub timeout: Option<Duration>,
    pub execution_id: Option<Uuid>,
    handlers: Vec<EventHandler>,
}

impl RunContext {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_execution_id(mut self, execution_id: Uuid) -> Self {
        self.execution_id = Some(execution_id);
        self
    }

    /// Add an event handler scoped to this run
    pub fn with_event_handler(mut self, handler: EventHandler) -> Self {
        self.handlers.push(handler);
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    at: Instant,
    budget: Duration,
}

/// Everything an execution shares with its steps and sub-executions
pub(crate) struct ExecutionScope {
    pub(crate) execution_id: Uuid,
    pub(crate) config: Arc<RunConfig>,
    pub(crate) cancel: CancellationToken,
    pub(crate) deadline: Option<Deadline>,
    pub(crate) emitter: EventEmitter,
}

impl ExecutionScope {
    pub(crate) fn child(&self) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            config: self.config.clone(),
            cancel: self.cancel.clone(),
            deadline: self.deadline,
            emitter: self.emitter.clone(),
        }
    }

    /// Observation point for cancellation and the advisory deadline
    fn checkpoint(&self, before: &str) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled {
                before: before.to_string(),
            });
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline.at {
                return Err(PipelineError::Timeout(deadline.budget));
            }
        }
        Ok(())
    }
}

/// Main pipeline execution engine.
///
/// Cheap to clone; clones share options and event handlers.
#[derive(Clone, Default)]
pub struct ExecutionEngine {
    options: Arc<EngineOptions>,
    handlers: Arc<Vec<EventHandler>>,
}

impl ExecutionEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options: Arc::new(options),
            handlers: Arc::new(Vec::new()),
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Add an event handler that observes every execution of this engine
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.handlers).push(Arc::new(handler));
    }

    /// Execute `pipeline` on `input` and return its output view
    pub async fn execute(
        &self,
        pipeline: &Pipeline,
        input: State,
        run: RunContext,
    ) -> Result<State, PipelineError> {
        let deadline = run
            .timeout
            .or(self.options.timeout)
            .map(|budget| Deadline {
                at: Instant::now() + budget,
                budget,
            });

        let mut handlers: Vec<EventHandler> = self.handlers.iter().cloned().collect();
        handlers.extend(run.handlers);

        let scope = Arc::new(ExecutionScope {
            execution_id: run.execution_id.unwrap_or_else(Uuid::new_v4),
            config: Arc::new(run.config),
            cancel: run.cancel,
            deadline,
            emitter: EventEmitter::new(handlers),
        });

        self.run_scoped(pipeline, input, scope).await
    }

    pub(crate) async fn run_scoped(
        &self,
        pipeline: &Pipeline,
        input: State,
        scope: Arc<ExecutionScope>,
    ) -> Result<State, PipelineError> {
        let execution_id = scope.execution_id;
        info!("Starting pipeline execution: {} ({})", pipeline.name(), execution_id);
        scope.emitter.emit(ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name: pipeline.name().to_string(),
        });

        let result = self.drive(pipeline, input, &scope).await;

        let status = match &result {
            Ok(_) => ExecutionStatus::Completed,
            Err(PipelineError::Cancelled { .. }) => ExecutionStatus::Cancelled,
            Err(PipelineError::Timeout(_)) => ExecutionStatus::TimedOut,
            Err(_) => ExecutionStatus::Failed,
        };
        match &result {
            Ok(_) => info!("Pipeline execution finished: {} - {:?}", pipeline.name(), status),
            Err(e) => warn!("Pipeline execution finished: {} - {:?}: {}", pipeline.name(), status, e),
        }
        scope.emitter.emit(ExecutionEvent::PipelineCompleted {
            execution_id,
            pipeline_name: pipeline.name().to_string(),
            status,
        });

        result
    }

    async fn drive(
        &self,
        pipeline: &Pipeline,
        input: State,
        scope: &Arc<ExecutionScope>,
    ) -> Result<State, PipelineError> {
        let schema = pipeline.schema();
        let mut state = schema.admit_input(input, self.options.strictness)?;
        let mut current = pipeline.entry().to_string();

        while current != END {
            scope.checkpoint(&current)?;

            let node = pipeline.node(&current).ok_or_else(|| PipelineError::Routing {
                step: pipeline.name().to_string(),
                selected: current.clone(),
                candidates: pipeline.step_names().to_vec(),
            })?;

            debug!("Running step '{}' of {}", current, pipeline.name());
            scope.emitter.emit(ExecutionEvent::StepStarted {
                execution_id: scope.execution_id,
                step: current.clone(),
            });

            let ctx = StepContext::new(self.clone(), scope.clone(), &current);
            let outcome = match node.step.run(&state, &ctx).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!("Step '{}' failed: {}", current, err);
                    scope.emitter.emit(ExecutionEvent::StepFailed {
                        execution_id: scope.execution_id,
                        step: current.clone(),
                        error: err.to_string(),
                    });
                    return Err(match err {
                        StepError::Pipeline(inner) => *inner,
                        cause => PipelineError::StepFailure {
                            step: current,
                            cause,
                        },
                    });
                }
            };

            state = schema.merge(state, outcome.update)?;
            let next = pipeline.resolve_next(&current, &state, outcome.goto.as_deref())?;

            scope.emitter.emit(ExecutionEvent::StepCompleted {
                execution_id: scope.execution_id,
                step: current.clone(),
                next_step: next.clone(),
            });
            current = next;
        }

        Ok(schema.project_output(&state))
    }
}
