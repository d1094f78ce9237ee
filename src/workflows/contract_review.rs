//! Contract risk review: `load_contract` → `analyze_risk`

use crate::core::{
    BuildError, FieldSpec, Pipeline, State, StateSchema, StateUpdate, Step, StepContext,
    StepError, StepExt, StepOutcome, END,
};
use crate::execution::Phase;
use crate::model::ModelClient;
use crate::services::{Deps, DocumentLoader};
use crate::workflows::{prompts, require_str};
use async_trait::async_trait;
use std::sync::Arc;

pub const NAME: &str = "contract_review";

pub fn schema() -> StateSchema {
    StateSchema::new()
        .field(FieldSpec::text("contract_file_path").required())
        .field(FieldSpec::text("analysis_angle").default_value(prompts::DEFAULT_ANALYSIS_ANGLE))
        .field(FieldSpec::text("contract_content"))
        .field(FieldSpec::text("risk_analysis_result").output())
}

pub fn build(deps: &Deps) -> Result<Pipeline, BuildError> {
    let load = LoadContract {
        documents: deps.documents.clone(),
    }
    .with_fallback("contract_content", |err| {
        format!("The contract file could not be processed: {}", err)
    });

    Pipeline::builder(NAME, schema())
        .add_step("load_contract", load)
        .add_step(
            "analyze_risk",
            AnalyzeRisk {
                model: deps.model.clone(),
            },
        )
        .add_edge("load_contract", "analyze_risk")
        .add_edge("analyze_risk", END)
        .build()
}

pub(crate) struct LoadContract {
    pub(crate) documents: Arc<dyn DocumentLoader>,
}

#[async_trait]
impl Step for LoadContract {
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let path = require_str(state, "contract_file_path")?;
        ctx.progress("Reading contract", Phase::Start);
        let content = self.documents.load_text(path).await?;
        ctx.progress("Reading contract", Phase::End);
        Ok(StateUpdate::new().set("contract_content", content).into())
    }
}

struct AnalyzeRisk {
    model: Arc<dyn ModelClient>,
}

#[async_trait]
impl Step for AnalyzeRisk {
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let content = state.get_str("contract_content").unwrap_or_default();
        let angle = state
            .get_str("analysis_angle")
            .unwrap_or(prompts::DEFAULT_ANALYSIS_ANGLE);

        ctx.progress("Analyzing contract", Phase::Start);
        let analysis = self
            .model
            .complete(
                prompts::CONTRACT_RISK,
                &prompts::contract_risk_request(angle, content),
            )
            .await?;
        ctx.progress("Analyzing contract", Phase::End);

        Ok(StateUpdate::new().set("risk_analysis_result", analysis).into())
    }
}
