//! Job posting drafts: `select_system_content` ⇒ {generate, optimize} → `markdown_recruitment_information`
//!
//! A caller with an existing posting in `recruitment_info` gets it optimized
//! along `user_require`; otherwise a new posting is generated from it. Both
//! paths produce `json_data`, which the shared tail renders as markdown.

use crate::core::{
    BuildError, FieldSpec, Pipeline, State, StateSchema, StateUpdate, Step, StepContext,
    StepError, StepOutcome, END,
};
use crate::model::ModelClient;
use crate::services::Deps;
use crate::workflows::{prompts, require_str, strip_json_fence};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub const NAME: &str = "recruitment";

pub const SELECT: &str = "select_system_content";
pub const GENERATE: &str = "generate_recruitment_information";
pub const OPTIMIZE: &str = "optimize_recruitment_information";
pub const MARKDOWN: &str = "markdown_recruitment_information";

pub fn schema() -> StateSchema {
    StateSchema::new()
        .field(FieldSpec::text("user_require").required())
        .field(FieldSpec::text("recruitment_info").optional())
        .field(FieldSpec::text("system_content"))
        .field(FieldSpec::text("json_data").output())
        .field(FieldSpec::text("markdown_data").output())
}

fn has_posting(state: &State) -> bool {
    state
        .get_str("recruitment_info")
        .is_some_and(|info| !info.trim().is_empty())
}

pub fn build(deps: &Deps) -> Result<Pipeline, BuildError> {
    Pipeline::builder(NAME, schema())
        .add_step(SELECT, SelectSystemContent)
        .add_step(
            GENERATE,
            Generate {
                model: deps.model.clone(),
            },
        )
        .add_step(
            OPTIMIZE,
            Optimize {
                model: deps.model.clone(),
            },
        )
        .add_step(
            MARKDOWN,
            Markdown {
                model: deps.model.clone(),
            },
        )
        .add_conditional_edge(
            SELECT,
            |state: &State| {
                if has_posting(state) {
                    OPTIMIZE.to_string()
                } else {
                    GENERATE.to_string()
                }
            },
            &[GENERATE, OPTIMIZE],
        )
        .add_edge(GENERATE, MARKDOWN)
        .add_edge(OPTIMIZE, MARKDOWN)
        .add_edge(MARKDOWN, END)
        .build()
}

struct SelectSystemContent;

#[async_trait]
impl Step for SelectSystemContent {
    async fn run(&self, state: &State, _ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let system = if has_posting(state) {
            prompts::recruitment_optimization()
        } else {
            prompts::recruitment_generation()
        };
        Ok(StateUpdate::new().set("system_content", system).into())
    }
}

struct Generate {
    model: Arc<dyn ModelClient>,
}

#[async_trait]
impl Step for Generate {
    async fn run(&self, state: &State, _ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let request = require_str(state, "user_require")?;
        let posting = self
            .model
            .complete(&prompts::recruitment_generation(), request)
            .await?;
        Ok(StateUpdate::new()
            .set("json_data", strip_json_fence(&posting))
            .into())
    }
}

struct Optimize {
    model: Arc<dyn ModelClient>,
}

#[async_trait]
impl Step for Optimize {
    async fn run(&self, state: &State, _ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let request = require_str(state, "user_require")?;
        let posting = state.get_str("recruitment_info").unwrap_or_default();
        let system = state
            .get_str("system_content")
            .map(str::to_string)
            .unwrap_or_else(prompts::recruitment_optimization);

        debug!("Optimizing a posting of {} bytes", posting.len());
        let optimized = self
            .model
            .complete(
                &system,
                &prompts::recruitment_optimization_request(posting, request),
            )
            .await?;
        Ok(StateUpdate::new()
            .set("json_data", strip_json_fence(&optimized))
            .into())
    }
}

struct Markdown {
    model: Arc<dyn ModelClient>,
}

#[async_trait]
impl Step for Markdown {
    async fn run(&self, state: &State, _ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let posting = state.get_str("json_data").unwrap_or_default();
        let markdown = self.model.complete(prompts::RECRUITMENT_MARKDOWN, posting).await?;
        Ok(StateUpdate::new().set("markdown_data", markdown).into())
    }
}
