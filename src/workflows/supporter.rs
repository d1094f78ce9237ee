//! The `customer_supporter` router: one route per business action

use crate::core::{
    BuildError, FieldKind, FieldSpec, Message, Pipeline, Role, State, StateSchema, StateUpdate,
    StepError,
};
use crate::router::{Route, Router};
use serde_json::Value;
use std::sync::Arc;

pub const NAME: &str = "customer_supporter";

pub const RECEIPT_AGENT: &str = "receipt_agent";
pub const IMAGE_AGENT: &str = "image_agent";
pub const FINANCIAL_DATA_AGENT: &str = "financial_data_agent";
pub const MEETING_AGENT: &str = "meeting_agent";

pub const NO_IMAGE: &str = "Sorry, no image could be generated for this request.";

/// Previously built target pipelines
pub struct Routes {
    pub assistants: Vec<Arc<Pipeline>>,
    pub receipt: Arc<Pipeline>,
    pub image: Arc<Pipeline>,
    pub financial_data: Arc<Pipeline>,
    pub meeting: Arc<Pipeline>,
}

pub fn schema() -> StateSchema {
    StateSchema::new()
        .field(FieldSpec::messages().output())
        .field(FieldSpec::text("receipt_image").optional())
        .field(FieldSpec::new("receipt_json", FieldKind::Object).output())
}

fn last_user_text(state: &State) -> Result<String, StepError> {
    state
        .messages()
        .into_iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content)
        .ok_or_else(|| StepError::InvalidState("no user message to route".to_string()))
}

fn last_message(state: &State) -> Result<Message, StepError> {
    state
        .last_message()
        .ok_or_else(|| StepError::InvalidState("no message to route".to_string()))
}

fn answer(text: impl Into<String>) -> StateUpdate {
    StateUpdate::new().message(Message::assistant(text))
}

/// Assistants see only the newest message and contribute only their final answer
fn assistant_route(pipeline: Arc<Pipeline>) -> Route {
    let action = pipeline.name().to_string();
    Route::new(action, pipeline)
        .prepare(|state| {
            let message = last_message(state)?;
            Ok(State::new().with("messages", vec![message.to_value()]))
        })
        .finish(|_, output| match output.last_message() {
            Some(message) => answer(message.content),
            None => StateUpdate::new(),
        })
}

pub fn build(routes: Routes) -> Result<Pipeline, BuildError> {
    let mut router = Router::new(NAME, schema());
    for pipeline in routes.assistants {
        router = router.route(assistant_route(pipeline));
    }

    router
        .route(
            Route::new(RECEIPT_AGENT, routes.receipt)
                .prepare(|state| {
                    let image = state.get_str("receipt_image").ok_or_else(|| {
                        StepError::InvalidState("receipt_agent needs a receipt_image".to_string())
                    })?;
                    Ok(State::new()
                        .with("receipt_image", image)
                        .with("should_convert", true))
                })
                .finish(|_, output| {
                    let text = output.get_str("text_output").unwrap_or_default().to_string();
                    let update = answer(text);
                    match output.get("json_output") {
                        Some(fields) => update.set("receipt_json", fields.clone()),
                        None => update,
                    }
                }),
        )
        .route(
            Route::new(IMAGE_AGENT, routes.image)
                .prepare(|state| Ok(State::new().with("prompt", last_user_text(state)?)))
                .finish(|_, output| {
                    let url = output
                        .get_list("urls")
                        .first()
                        .and_then(Value::as_str)
                        .unwrap_or(NO_IMAGE)
                        .to_string();
                    answer(url)
                }),
        )
        .route(
            Route::new(FINANCIAL_DATA_AGENT, routes.financial_data)
                .prepare(|state| Ok(State::new().with("query", last_user_text(state)?)))
                .finish(|_, output| {
                    answer(output.get_str("final_output").unwrap_or_default())
                }),
        )
        .route(
            Route::new(MEETING_AGENT, routes.meeting)
                .prepare(|state| {
                    let url = last_user_text(state)?.trim().to_string();
                    Ok(State::new().with("url", url))
                })
                .finish(|_, output| {
                    answer(output.get_str("final_summary").unwrap_or_default())
                }),
        )
        .build()
}
