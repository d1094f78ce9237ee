//! Parallel branches: independent steps over the same state, joined before the next step

use crate::core::{
    context::StepContext,
    error::{PipelineError, StepError},
    state::{State, StateUpdate},
    step::{Step, StepOutcome},
};
use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::debug;

/// Step that runs named branch steps concurrently on the same input state.
///
/// The join continues along the parallel step's own edge once every branch
/// has finished. Branch updates are applied in declaration order. The first
/// failing branch drops the others and fails the execution under the
/// branch's name; branches cannot redirect.
#[derive(Default)]
pub struct Parallel {
    branches: Vec<(String, Box<dyn Step>)>,
}

impl Parallel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn branch(mut self, name: impl Into<String>, step: impl Step + 'static) -> Self {
        self.branches.push((name.into(), Box::new(step)));
        self
    }

    pub fn branch_names(&self) -> Vec<&str> {
        self.branches.iter().map(|(name, _)| name.as_str()).collect()
    }
}

async fn run_branch(
    name: &str,
    step: &dyn Step,
    state: &State,
    ctx: &StepContext,
) -> Result<StateUpdate, StepError> {
    let branch_ctx = ctx.for_branch(name);
    debug!("Running branch '{}' of '{}'", name, ctx.step_name());

    let result = match step.run(state, &branch_ctx).await {
        Ok(StepOutcome {
            goto: Some(target), ..
        }) => Err(StepError::InvalidState(format!(
            "a parallel branch cannot redirect to '{}'",
            target
        ))),
        Ok(outcome) => Ok(outcome.update),
        Err(err) => Err(err),
    };

    result.map_err(|err| match err {
        StepError::Pipeline(inner) => StepError::Pipeline(inner),
        cause => StepError::Pipeline(Box::new(PipelineError::StepFailure {
            step: name.to_string(),
            cause,
        })),
    })
}

#[async_trait]
impl Step for Parallel {
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let runs = self
            .branches
            .iter()
            .map(|(name, step)| run_branch(name, step.as_ref(), state, ctx));

        let cancel = ctx.cancel_token().clone();
        let updates = tokio::select! {
            joined = try_join_all(runs) => joined?,
            _ = cancel.cancelled() => {
                return Err(StepError::Pipeline(Box::new(PipelineError::Cancelled {
                    before: ctx.step_name().to_string(),
                })));
            }
        };

        let joined: StateUpdate = updates
            .into_iter()
            .flat_map(StateUpdate::into_entries)
            .collect();
        Ok(StepOutcome::update(joined))
    }
}
