//! Test: Sequential Chain - steps run in edge order and the output is projected

use crate::helpers::*;
use bizflow::core::{from_fn, FieldKind, FieldSpec, Pipeline, State, StateSchema, StateUpdate, END};
use bizflow::RunContext;
use serde_json::json;

fn load_and_summarize() -> Pipeline {
    let schema = StateSchema::new()
        .field(FieldSpec::text("source").required())
        .field(FieldSpec::list("items"))
        .field(FieldSpec::text("summary").output());

    Pipeline::builder("load_and_summarize", schema)
        .add_step(
            "load",
            from_fn(|_, _| Ok(StateUpdate::new().set("items", json!([1, 2, 3])).into())),
        )
        .add_step(
            "summarize",
            from_fn(|state, _| {
                let len = state.get_list("items").len();
                Ok(StateUpdate::new().set("summary", format!("len={}", len)).into())
            }),
        )
        .add_edge("load", "summarize")
        .add_edge("summarize", END)
        .build()
        .unwrap()
}

/// Test that a two-step chain yields only its declared outputs
#[tokio::test]
async fn test_load_then_summarize() {
    let output = run(&load_and_summarize(), State::new().with("source", "inbox"))
        .await
        .unwrap();

    assert_eq!(output.to_json(), json!({"summary": "len=3"}));
}

#[tokio::test]
async fn test_steps_run_in_edge_order() {
    let (result, events) = run_recording(
        &load_and_summarize(),
        State::new().with("source", "inbox"),
        RunContext::default(),
    )
    .await;

    assert!(result.is_ok());
    assert_eq!(steps_started(&events), vec!["load", "summarize"]);
}

#[tokio::test]
async fn test_missing_required_input_runs_nothing() {
    let (result, events) =
        run_recording(&load_and_summarize(), State::new(), RunContext::default()).await;

    let err = result.unwrap_err();
    assert!(err.to_string().contains("source"));
    assert!(steps_started(&events).is_empty());
}

#[tokio::test]
async fn test_entry_need_not_be_first_step() {
    let schema = StateSchema::new().field(FieldSpec::new("trail", FieldKind::List).append().output());
    let pipeline = Pipeline::builder("reordered", schema)
        .add_step(
            "second",
            from_fn(|_, _| Ok(StateUpdate::new().set("trail", "second").into())),
        )
        .add_step(
            "first",
            from_fn(|_, _| Ok(StateUpdate::new().set("trail", "first").into())),
        )
        .add_edge("first", "second")
        .add_edge("second", END)
        .set_entry("first")
        .build()
        .unwrap();

    let output = run(&pipeline, State::new()).await.unwrap();
    assert_eq!(output.get("trail"), Some(&json!(["first", "second"])));
}
