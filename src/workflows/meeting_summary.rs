//! Meeting minutes from a recording: `transcription` → `summary`

use crate::core::{
    BuildError, FieldSpec, Pipeline, State, StateSchema, StateUpdate, Step, StepContext,
    StepError, StepExt, StepOutcome, END,
};
use crate::execution::Phase;
use crate::model::ModelClient;
use crate::services::{Deps, Transcriber};
use crate::workflows::{prompts, require_str};
use async_trait::async_trait;
use std::sync::Arc;

pub const NAME: &str = "meeting_summary";

pub fn schema() -> StateSchema {
    StateSchema::new()
        .field(FieldSpec::text("url").required())
        .field(FieldSpec::text("text"))
        .field(FieldSpec::text("final_summary").output())
}

pub fn build(deps: &Deps) -> Result<Pipeline, BuildError> {
    let transcription = Transcription {
        transcriber: deps.transcriber.clone(),
    }
    .with_fallback("text", |err| format!("No transcript is available: {}", err));

    Pipeline::builder(NAME, schema())
        .add_step("transcription", transcription)
        .add_step(
            "summary",
            Summary {
                model: deps.model.clone(),
            },
        )
        .add_edge("transcription", "summary")
        .add_edge("summary", END)
        .build()
}

struct Transcription {
    transcriber: Arc<dyn Transcriber>,
}

#[async_trait]
impl Step for Transcription {
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let url = require_str(state, "url")?;
        ctx.progress("Transcribing audio", Phase::Start);
        let text = self.transcriber.transcribe(url).await?;
        ctx.progress("Transcribing audio", Phase::End);
        Ok(StateUpdate::new().set("text", text).into())
    }
}

struct Summary {
    model: Arc<dyn ModelClient>,
}

#[async_trait]
impl Step for Summary {
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let text = state.get_str("text").unwrap_or_default();
        ctx.progress("Writing minutes", Phase::Start);
        let summary = self.model.complete(prompts::MEETING_SUMMARY, text).await?;
        ctx.progress("Writing minutes", Phase::End);
        Ok(StateUpdate::new().set("final_summary", summary).into())
    }
}
