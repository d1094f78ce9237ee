//! Fan-out/fan-in: one sub-execution per element of a list field

use crate::core::{
    context::StepContext,
    error::{PipelineError, StepError},
    pipeline::Pipeline,
    state::{State, StateUpdate},
    step::{Step, StepOutcome},
};
use crate::execution::events::ExecutionEvent;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Step that runs a sub-pipeline once per element of `items_field`.
///
/// Each sub-execution is seeded with the shared fields plus one element in
/// `item_field`. Collected outputs are concatenated into the parent's
/// accumulator fields in input order, whatever the completion order. A member
/// that leaves a collected field unset contributes `null`, so scalar outputs
/// of member `i` stay at position `i`.
/// The first failing sub-execution aborts the rest and its error is
/// surfaced unchanged; partial results are discarded.
pub struct FanOut {
    pipeline: Arc<Pipeline>,
    items_field: String,
    item_field: String,
    shared: Vec<String>,
    collect: Vec<(String, String)>,
    limit: Option<usize>,
}

impl FanOut {
    pub fn new(
        pipeline: Arc<Pipeline>,
        items_field: impl Into<String>,
        item_field: impl Into<String>,
    ) -> Self {
        Self {
            pipeline,
            items_field: items_field.into(),
            item_field: item_field.into(),
            shared: Vec::new(),
            collect: Vec::new(),
            limit: None,
        }
    }

    /// Copy a parent field into every sub-execution's input
    pub fn share(mut self, field: impl Into<String>) -> Self {
        self.shared.push(field.into());
        self
    }

    /// Gather sub-output field `from` into parent accumulator `into`
    pub fn collect(mut self, from: impl Into<String>, into: impl Into<String>) -> Self {
        self.collect.push((from.into(), into.into()));
        self
    }

    /// Bound the number of concurrently running sub-executions
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit.max(1));
        self
    }

    fn seed(&self, state: &State, item: Value) -> State {
        let mut seed = State::new();
        for field in &self.shared {
            if let Some(value) = state.get(field) {
                seed.insert(field.clone(), value.clone());
            }
        }
        seed.insert(self.item_field.clone(), item);
        seed
    }

    fn gather(&self, outputs: Vec<State>) -> StateUpdate {
        let mut update = StateUpdate::new();
        for (from, into) in &self.collect {
            let mut accumulated = Vec::new();
            for output in &outputs {
                match output.get(from) {
                    Some(Value::Array(items)) => accumulated.extend(items.iter().cloned()),
                    Some(value) => accumulated.push(value.clone()),
                    None => accumulated.push(Value::Null),
                }
            }
            update = update.set(into.clone(), Value::Array(accumulated));
        }
        update
    }
}

#[async_trait]
impl Step for FanOut {
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let items = state.get_list(&self.items_field).to_vec();
        let total = items.len();

        ctx.emit(ExecutionEvent::FanOutStarted {
            execution_id: ctx.execution_id(),
            step: ctx.step_name().to_string(),
            items: total,
        });

        if total == 0 {
            debug!("Fan-out '{}' has no items", ctx.step_name());
            return Ok(StepOutcome::update(self.gather(Vec::new())));
        }

        let limit = self.limit.or(ctx.fan_out_limit());
        let semaphore = limit.map(|n| Arc::new(Semaphore::new(n.max(1))));
        debug!(
            "Fan-out '{}' launching {} sub-executions (limit {:?})",
            ctx.step_name(),
            total,
            limit
        );

        let mut tasks = JoinSet::new();
        for (index, item) in items.into_iter().enumerate() {
            let seed = self.seed(state, item);
            let pipeline = self.pipeline.clone();
            let ctx = ctx.clone();
            let semaphore = semaphore.clone();

            tasks.spawn(async move {
                let _permit = match semaphore {
                    Some(semaphore) => match semaphore.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => {
                            return (
                                index,
                                Err(PipelineError::Cancelled {
                                    before: pipeline.entry().to_string(),
                                }),
                            )
                        }
                    },
                    None => None,
                };
                let result = ctx.run_pipeline(&pipeline, seed).await;
                (index, result)
            });
        }

        let mut results: Vec<Option<State>> = vec![None; total];
        let cancel = ctx.cancel_token().clone();
        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((index, Ok(output)))) => results[index] = Some(output),
                    Some(Ok((index, Err(err)))) => {
                        warn!("Fan-out '{}' member {} failed: {}", ctx.step_name(), index, err);
                        tasks.abort_all();
                        return Err(StepError::Pipeline(Box::new(err)));
                    }
                    Some(Err(join_err)) => {
                        tasks.abort_all();
                        return Err(StepError::InvalidState(format!(
                            "fan-out member did not complete: {}",
                            join_err
                        )));
                    }
                },
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    return Err(StepError::Pipeline(Box::new(PipelineError::Cancelled {
                        before: ctx.step_name().to_string(),
                    })));
                }
            }
        }

        let outputs: Vec<State> = results.into_iter().flatten().collect();
        Ok(StepOutcome::update(self.gather(outputs)))
    }
}
