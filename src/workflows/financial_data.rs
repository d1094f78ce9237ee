//! Financial data question answering: `query_data` → `answer`

use crate::core::{
    BuildError, FieldKind, FieldSpec, Pipeline, State, StateSchema, StateUpdate, Step,
    StepContext, StepError, StepOutcome, ToolError, END,
};
use crate::execution::Phase;
use crate::model::ModelClient;
use crate::services::{DataSource, Deps};
use crate::workflows::{prompts, require_str};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

pub const NAME: &str = "financial_data_query";

pub const DATASET: &str = "financial";

pub const NO_DATA: &str = "Sorry, no matching financial data was found.";

pub const QUERY_FAILED: &str = "Sorry, the financial data could not be queried. Please try again later.";

pub fn schema() -> StateSchema {
    StateSchema::new()
        .field(FieldSpec::text("query").required())
        .field(FieldSpec::new("query_result", FieldKind::Any))
        .field(FieldSpec::text("final_output").output())
}

pub fn build(deps: &Deps) -> Result<Pipeline, BuildError> {
    Pipeline::builder(NAME, schema())
        .add_step(
            "query_data",
            QueryData {
                data: deps.data.clone(),
            },
        )
        .add_step(
            "answer",
            Answer {
                model: deps.model.clone(),
            },
        )
        .add_edge("query_data", "answer")
        .add_edge("answer", END)
        .build()
}

struct QueryData {
    data: Arc<dyn DataSource>,
}

#[async_trait]
impl Step for QueryData {
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let query = require_str(state, "query")?;

        ctx.progress("Querying financial data", Phase::Start);
        let result = match self.data.query(DATASET, json!({"question": query})).await {
            Ok(rows) if rows.is_empty() => Value::from(NO_DATA),
            Ok(rows) => Value::Array(rows),
            // The data service explains rejected questions itself
            Err(ToolError::InvalidArguments(msg)) => Value::from(msg),
            Err(e) => {
                warn!("Financial data query failed: {}", e);
                Value::from(QUERY_FAILED)
            }
        };
        ctx.progress("Querying financial data", Phase::End);

        Ok(StateUpdate::new().set("query_result", result).into())
    }
}

struct Answer {
    model: Arc<dyn ModelClient>,
}

#[async_trait]
impl Step for Answer {
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let result = match state.get("query_result") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => NO_DATA.to_string(),
        };
        let system = prompts::financial_data_answer(ctx.config().user_title.as_deref());
        let answer = self.model.complete(&system, &result).await?;
        Ok(StateUpdate::new().set("final_output", answer).into())
    }
}
