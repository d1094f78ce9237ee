//! Step abstraction: a unit of work that reads the state and returns an update

use crate::core::{
    context::StepContext,
    error::{StepError, ToolError},
    pipeline::END,
    state::{State, StateUpdate},
};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

/// Result of a successful step run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutcome {
    /// Partial update merged into the working state
    pub update: StateUpdate,

    /// Control directive naming the next step. When absent the engine
    /// follows the step's outgoing edge.
    pub goto: Option<String>,
}

impl StepOutcome {
    pub fn update(update: StateUpdate) -> Self {
        Self { update, goto: None }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn goto(target: impl Into<String>, update: StateUpdate) -> Self {
        Self {
            update,
            goto: Some(target.into()),
        }
    }

    /// Directive to terminate the execution
    pub fn end(update: StateUpdate) -> Self {
        Self::goto(END, update)
    }
}

impl From<StateUpdate> for StepOutcome {
    fn from(update: StateUpdate) -> Self {
        Self::update(update)
    }
}

/// A step in a pipeline.
///
/// Steps must not assume exclusive access to anything but their own
/// locals: the same step value serves every concurrent execution of the
/// pipeline that owns it.
#[async_trait]
pub trait Step: Send + Sync {
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError>;
}

#[async_trait]
impl<S: Step + ?Sized> Step for Arc<S> {
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        (**self).run(state, ctx).await
    }
}

/// Step backed by a synchronous closure
pub struct FnStep<F>(F);

/// Wrap a pure function as a step
pub fn from_fn<F>(f: F) -> FnStep<F>
where
    F: Fn(&State, &StepContext) -> Result<StepOutcome, StepError> + Send + Sync,
{
    FnStep(f)
}

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: Fn(&State, &StepContext) -> Result<StepOutcome, StepError> + Send + Sync,
{
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        (self.0)(state, ctx)
    }
}

/// Step backed by an async closure. The closure receives owned copies of
/// the state and context, so the returned future can be `'static`.
pub struct AsyncFnStep<F>(F);

pub fn from_async_fn<F, Fut>(f: F) -> AsyncFnStep<F>
where
    F: Fn(State, StepContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StepOutcome, StepError>> + Send + 'static,
{
    AsyncFnStep(f)
}

#[async_trait]
impl<F, Fut> Step for AsyncFnStep<F>
where
    F: Fn(State, StepContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StepOutcome, StepError>> + Send + 'static,
{
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        (self.0)(state.clone(), ctx.clone()).await
    }
}

type RenderFn = Arc<dyn Fn(&ToolError) -> String + Send + Sync>;

/// Absorbs collaborator failures of the wrapped step into an ordinary
/// state value, so the execution continues along the step's edge.
///
/// Only [`StepError::Tool`] is absorbed. State and nested pipeline errors
/// still abort the execution.
pub struct Fallback<S> {
    inner: S,
    field: String,
    render: RenderFn,
}

impl<S: Step> Fallback<S> {
    pub fn new<F>(inner: S, field: impl Into<String>, render: F) -> Self
    where
        F: Fn(&ToolError) -> String + Send + Sync + 'static,
    {
        Self {
            inner,
            field: field.into(),
            render: Arc::new(render),
        }
    }
}

#[async_trait]
impl<S: Step> Step for Fallback<S> {
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        match self.inner.run(state, ctx).await {
            Err(StepError::Tool(err)) => {
                warn!(
                    "Step '{}' fell back after collaborator failure: {}",
                    ctx.step_name(),
                    err
                );
                let explanation = (self.render)(&err);
                Ok(StepOutcome::update(
                    StateUpdate::new().set(self.field.clone(), explanation),
                ))
            }
            other => other,
        }
    }
}

/// Combinators available on every step
pub trait StepExt: Step + Sized {
    /// Write a human-readable explanation into `field` when a collaborator fails
    fn with_fallback<F>(self, field: impl Into<String>, render: F) -> Fallback<Self>
    where
        F: Fn(&ToolError) -> String + Send + Sync + 'static,
    {
        Fallback::new(self, field, render)
    }
}

impl<S: Step + Sized> StepExt for S {}
