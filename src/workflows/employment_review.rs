//! Employment contract review: `load` → `evaluate` → `generate_report`
//!
//! Progress is reported with `{"action": {type, state}}` records.

use crate::core::{
    BuildError, FieldSpec, Pipeline, State, StateSchema, StateUpdate, Step, StepContext,
    StepError, StepExt, StepOutcome, END,
};
use crate::execution::{Phase, ProgressEvent};
use crate::model::ModelClient;
use crate::services::{Deps, DocumentLoader, ObjectStore};
use crate::workflows::{prompts, require_str, strip_json_fence};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

pub const NAME: &str = "employment_contract_review";

pub fn schema() -> StateSchema {
    StateSchema::new()
        .field(FieldSpec::text("contract_file_path").required())
        .field(FieldSpec::list("review_dimensions").default_value(prompts::default_review_dimensions()))
        .field(FieldSpec::text("contract_content"))
        .field(FieldSpec::text("review_result").output())
        .field(FieldSpec::text("report").output())
        .field(FieldSpec::text("report_url").output())
}

pub fn build(deps: &Deps) -> Result<Pipeline, BuildError> {
    let load = Load {
        documents: deps.documents.clone(),
    }
    .with_fallback("contract_content", |err| {
        format!("The contract file could not be processed: {}", err)
    });

    Pipeline::builder(NAME, schema())
        .add_step("load", load)
        .add_step(
            "evaluate",
            Evaluate {
                model: deps.model.clone(),
            },
        )
        .add_step(
            "generate_report",
            GenerateReport {
                model: deps.model.clone(),
                storage: deps.storage.clone(),
            },
        )
        .add_edge("load", "evaluate")
        .add_edge("evaluate", "generate_report")
        .add_edge("generate_report", END)
        .build()
}

fn mark(ctx: &StepContext, phase: Phase) {
    ctx.emit_progress(ProgressEvent::typed(ctx.step_name(), phase));
}

struct Load {
    documents: Arc<dyn DocumentLoader>,
}

#[async_trait]
impl Step for Load {
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let path = require_str(state, "contract_file_path")?;
        mark(ctx, Phase::Start);
        let content = self.documents.load_text(path).await?;
        mark(ctx, Phase::End);
        Ok(StateUpdate::new().set("contract_content", content).into())
    }
}

struct Evaluate {
    model: Arc<dyn ModelClient>,
}

#[async_trait]
impl Step for Evaluate {
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let dimensions: Vec<String> = state
            .get_list("review_dimensions")
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
        let content = state.get_str("contract_content").unwrap_or_default();

        mark(ctx, Phase::Start);
        let reply = self
            .model
            .complete(&prompts::employment_evaluation(&dimensions), content)
            .await?;
        mark(ctx, Phase::End);

        Ok(StateUpdate::new()
            .set("review_result", strip_json_fence(&reply))
            .into())
    }
}

struct GenerateReport {
    model: Arc<dyn ModelClient>,
    storage: Arc<dyn ObjectStore>,
}

#[async_trait]
impl Step for GenerateReport {
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let review = state.get_str("review_result").unwrap_or_default();

        mark(ctx, Phase::Start);
        let report = self.model.complete(prompts::EMPLOYMENT_REPORT, review).await?;

        let key = format!("reports/{}.md", ctx.execution_id());
        let mut update = StateUpdate::new();
        match self
            .storage
            .put(&key, report.clone().into_bytes(), "text/markdown")
            .await
        {
            Ok(url) => update = update.set("report_url", url),
            Err(e) => warn!("Report was not stored: {}", e),
        }
        mark(ctx, Phase::End);

        Ok(update.set("report", report).into())
    }
}
