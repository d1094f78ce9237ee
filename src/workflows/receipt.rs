//! Receipt recognition.
//!
//! `categorize` chooses the receipt type and either continues to `extract`
//! or ends with an "unsupported" answer. `extract` reads the fields as JSON
//! and `finalize_output` renders them as text when `should_convert` is set.

use crate::core::config::ReceiptCategory;
use crate::core::{
    BuildError, FieldKind, FieldSpec, Message, Pipeline, State, StateSchema, StateUpdate, Step,
    StepContext, StepError, StepOutcome, ToolError, END,
};
use crate::execution::Phase;
use crate::model::{ModelClient, ModelRequest};
use crate::services::Deps;
use crate::workflows::{parse_json_reply, prompts, require_str};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

pub const NAME: &str = "receipt_extraction";

pub const UNSUPPORTED_RECEIPT: &str = "Unsupported receipt type";

pub fn schema() -> StateSchema {
    StateSchema::new()
        .field(FieldSpec::text("receipt_image").required())
        .field(FieldSpec::new("should_convert", FieldKind::Bool).default_value(true))
        .field(FieldSpec::text("running_category"))
        .field(FieldSpec::new("json_output", FieldKind::Object).output())
        .field(FieldSpec::text("text_output").output())
}

pub fn build(deps: &Deps, categories: &[ReceiptCategory]) -> Result<Pipeline, BuildError> {
    let categories: Arc<[ReceiptCategory]> = categories.into();

    Pipeline::builder(NAME, schema())
        .add_step(
            "categorize",
            Categorize {
                model: deps.vision_model.clone(),
                categories: categories.clone(),
            },
        )
        .add_step(
            "extract",
            Extract {
                model: deps.vision_model.clone(),
                categories: categories.clone(),
            },
        )
        .add_step(
            "finalize_output",
            Finalize {
                model: deps.model.clone(),
                categories,
            },
        )
        .add_directive("categorize", &["extract", END])
        .add_conditional_edge(
            "extract",
            |state: &State| {
                if state.get_bool("should_convert").unwrap_or(true) {
                    "finalize_output".to_string()
                } else {
                    END.to_string()
                }
            },
            &["finalize_output", END],
        )
        .add_edge("finalize_output", END)
        .build()
}

fn image_request(system: String, image: &str) -> ModelRequest {
    ModelRequest::new()
        .system(system)
        .message(Message::user("").with_image(image))
        .temperature(0.0)
}

fn category<'a>(categories: &'a [ReceiptCategory], state: &State) -> Result<&'a ReceiptCategory, StepError> {
    let name = require_str(state, "running_category")?;
    categories
        .iter()
        .find(|c| c.name == name)
        .ok_or_else(|| StepError::InvalidState(format!("unknown receipt category '{}'", name)))
}

struct Categorize {
    model: Arc<dyn ModelClient>,
    categories: Arc<[ReceiptCategory]>,
}

#[async_trait]
impl Step for Categorize {
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let image = require_str(state, "receipt_image")?;

        ctx.progress("Identifying receipt type", Phase::Start);
        let request = image_request(prompts::receipt_categorizer(&self.categories), image);
        let reply = self.model.invoke(request).await?.into_text();
        ctx.progress("Identifying receipt type", Phase::End);

        let answer = reply.trim();
        if self.categories.iter().any(|c| c.name == answer) {
            Ok(StepOutcome::goto(
                "extract",
                StateUpdate::new().set("running_category", answer),
            ))
        } else {
            info!("Receipt classified as '{}', not a supported type", answer);
            Ok(StepOutcome::end(
                StateUpdate::new().set("text_output", UNSUPPORTED_RECEIPT),
            ))
        }
    }
}

struct Extract {
    model: Arc<dyn ModelClient>,
    categories: Arc<[ReceiptCategory]>,
}

#[async_trait]
impl Step for Extract {
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let image = require_str(state, "receipt_image")?;
        let category = category(&self.categories, state)?;

        ctx.progress("Extracting receipt fields", Phase::Start);
        let request = image_request(prompts::receipt_extractor(category), image).json_output();
        let reply = self.model.invoke(request).await?.into_text();
        let fields = parse_json_reply(&reply)?;
        if !fields.is_object() {
            return Err(ToolError::MalformedOutput(
                "receipt extraction did not return a JSON object".to_string(),
            )
            .into());
        }
        ctx.progress("Extracting receipt fields", Phase::End);

        Ok(StateUpdate::new().set("json_output", fields).into())
    }
}

struct Finalize {
    model: Arc<dyn ModelClient>,
    categories: Arc<[ReceiptCategory]>,
}

#[async_trait]
impl Step for Finalize {
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let category = category(&self.categories, state)?;
        let fields = state.get("json_output").cloned().unwrap_or(Value::Null);

        ctx.progress("Summarizing receipt", Phase::Start);
        let text = self
            .model
            .complete(&prompts::receipt_finalizer(category), &fields.to_string())
            .await?;
        ctx.progress("Summarizing receipt", Phase::End);

        Ok(StateUpdate::new().set("text_output", text).into())
    }
}
