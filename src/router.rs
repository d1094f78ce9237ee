//! Top-level router: dispatch on the `action` field to exactly one pipeline

use crate::core::{
    context::StepContext,
    error::{BuildError, PipelineError, StepError},
    pipeline::{Pipeline, END},
    schema::{FieldSpec, StateSchema},
    state::{State, StateUpdate},
    step::{Step, StepOutcome},
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Name of the classifier step at the router's entry
pub const DISPATCH_STEP: &str = "dispatch";

type PrepareFn = Arc<dyn Fn(&State) -> Result<State, StepError> + Send + Sync>;
type FinishFn = Arc<dyn Fn(&State, State) -> StateUpdate + Send + Sync>;

/// One dispatch target
#[derive(Clone)]
pub struct Route {
    action: String,
    pipeline: Arc<Pipeline>,
    prepare: Option<PrepareFn>,
    finish: Option<FinishFn>,
}

impl Route {
    /// By default the target receives the router fields its own schema names,
    /// and every output field the router's schema also names is copied back.
    pub fn new(action: impl Into<String>, pipeline: Arc<Pipeline>) -> Self {
        Self {
            action: action.into(),
            pipeline,
            prepare: None,
            finish: None,
        }
    }

    /// Narrow the router state to the target's input contract
    pub fn prepare<F>(mut self, f: F) -> Self
    where
        F: Fn(&State) -> Result<State, StepError> + Send + Sync + 'static,
    {
        self.prepare = Some(Arc::new(f));
        self
    }

    /// Map the target's output back into a router update
    pub fn finish<F>(mut self, f: F) -> Self
    where
        F: Fn(&State, State) -> StateUpdate + Send + Sync + 'static,
    {
        self.finish = Some(Arc::new(f));
        self
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    fn target_input(&self, state: &State) -> Result<State, StepError> {
        match &self.prepare {
            Some(prepare) => prepare(state),
            None => {
                let schema = self.pipeline.schema();
                let mut input = State::new();
                for (key, value) in state.iter().filter(|(k, _)| schema.contains(k)) {
                    input.insert(key.to_string(), value.clone());
                }
                Ok(input)
            }
        }
    }
}

/// Builder for a router pipeline
pub struct Router {
    name: String,
    schema: StateSchema,
    routes: Vec<Route>,
}

impl Router {
    /// `schema` is extended with a required `action` field
    pub fn new(name: impl Into<String>, schema: StateSchema) -> Self {
        Self {
            name: name.into(),
            schema: schema.field(FieldSpec::text("action").required()),
            routes: Vec::new(),
        }
    }

    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    pub fn actions(&self) -> Vec<&str> {
        self.routes.iter().map(Route::action).collect()
    }

    /// Build `dispatch ⇒ {action…}`, each action step delegating to its pipeline and then ending
    pub fn build(self) -> Result<Pipeline, BuildError> {
        let actions: Vec<String> = self.routes.iter().map(|r| r.action.clone()).collect();
        let targets: Vec<&str> = actions.iter().map(String::as_str).collect();

        let schema_snapshot = self.schema.clone();
        let mut builder = Pipeline::builder(self.name, self.schema)
            .add_step(
                DISPATCH_STEP,
                Dispatch {
                    actions: actions.clone(),
                },
            )
            .add_directive(DISPATCH_STEP, &targets)
            .set_entry(DISPATCH_STEP);

        for route in self.routes {
            let action = route.action.clone();
            let schema = schema_snapshot.clone();
            builder = builder
                .add_step(action.clone(), Delegate { route, schema })
                .add_edge(action, END);
        }

        builder.build()
    }
}

struct Dispatch {
    actions: Vec<String>,
}

#[async_trait]
impl Step for Dispatch {
    async fn run(&self, state: &State, _ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let action = state.get_str("action").unwrap_or_default();
        if self.actions.iter().any(|a| a == action) {
            debug!("Dispatching action '{}'", action);
            Ok(StepOutcome::goto(action, StateUpdate::new()))
        } else {
            info!("Rejecting unknown action '{}'", action);
            Err(PipelineError::UnknownAction {
                action: action.to_string(),
                known: self.actions.clone(),
            }
            .into())
        }
    }
}

/// Runs the route's pipeline as a nested execution
struct Delegate {
    route: Route,
    schema: StateSchema,
}

#[async_trait]
impl Step for Delegate {
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let input = self.route.target_input(state)?;
        let output = ctx.run_pipeline(&self.route.pipeline, input).await?;
        let update = match &self.route.finish {
            Some(finish) => finish(state, output),
            None => output
                .iter()
                .filter(|(k, _)| self.schema.contains(k))
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        };
        Ok(StepOutcome::update(update))
    }
}
