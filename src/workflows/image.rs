//! Image generation: `route_request` ⇒ {`generate_image`, `optimize_prompt`}

use crate::core::{
    BuildError, FieldKind, FieldSpec, Pipeline, State, StateSchema, StateUpdate, Step,
    StepContext, StepError, StepOutcome, END,
};
use crate::execution::Phase;
use crate::model::ModelClient;
use crate::services::{Deps, ImageGenerator};
use crate::workflows::{prompts, require_str};
use async_trait::async_trait;
use std::sync::Arc;

pub const NAME: &str = "image_generation";

pub const GENERATE: &str = "generate_image";
pub const OPTIMIZE: &str = "optimize_prompt";

pub fn schema() -> StateSchema {
    StateSchema::new()
        .field(FieldSpec::text("prompt").required())
        .field(FieldSpec::text("mode").default_value(GENERATE))
        .field(FieldSpec::new("count", FieldKind::Number).default_value(1))
        .field(FieldSpec::text("size").default_value("1024x1024"))
        .field(FieldSpec::text("prompt_extend").output())
        .field(FieldSpec::list("urls").output())
}

pub fn build(deps: &Deps) -> Result<Pipeline, BuildError> {
    Pipeline::builder(NAME, schema())
        .add_step("route_request", RouteRequest)
        .add_step(
            GENERATE,
            GenerateImage {
                images: deps.images.clone(),
            },
        )
        .add_step(
            OPTIMIZE,
            OptimizePrompt {
                model: deps.model.clone(),
            },
        )
        .add_directive("route_request", &[GENERATE, OPTIMIZE])
        .add_edge(GENERATE, END)
        .add_edge(OPTIMIZE, END)
        .build()
}

/// `generate_image` generates; every other mode optimizes the prompt
struct RouteRequest;

#[async_trait]
impl Step for RouteRequest {
    async fn run(&self, state: &State, _ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let target = match state.get_str("mode") {
            Some(GENERATE) | None => GENERATE,
            Some(_) => OPTIMIZE,
        };
        Ok(StepOutcome::goto(target, StateUpdate::new()))
    }
}

struct GenerateImage {
    images: Arc<dyn ImageGenerator>,
}

#[async_trait]
impl Step for GenerateImage {
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let prompt = require_str(state, "prompt")?;
        let count = state
            .get("count")
            .and_then(|v| v.as_u64())
            .unwrap_or(1)
            .clamp(1, 4) as u32;
        let size = state.get_str("size").unwrap_or("1024x1024");

        ctx.progress("Generating image", Phase::Start);
        let urls = self.images.generate(prompt, count, size).await?;
        ctx.progress("Generating image", Phase::End);

        Ok(StateUpdate::new().set("urls", urls).into())
    }
}

struct OptimizePrompt {
    model: Arc<dyn ModelClient>,
}

#[async_trait]
impl Step for OptimizePrompt {
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let prompt = require_str(state, "prompt")?;
        ctx.progress("Optimizing prompt", Phase::Start);
        let extended = self.model.complete(prompts::PROMPT_OPTIMIZER, prompt).await?;
        ctx.progress("Optimizing prompt", Phase::End);
        Ok(StateUpdate::new().set("prompt_extend", extended).into())
    }
}
