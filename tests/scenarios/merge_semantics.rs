//! Test: Merge Semantics - replacement, append-only accumulation and kind checks

use crate::helpers::*;
use bizflow::core::{
    from_fn, FieldKind, FieldSpec, Message, Pipeline, PipelineError, State, StateSchema,
    StateUpdate, END,
};
use rand::Rng;
use serde_json::{json, Value};

fn schema() -> StateSchema {
    StateSchema::new()
        .field(FieldSpec::text("title").optional().output())
        .field(FieldSpec::new("score", FieldKind::Number).optional().output())
        .field(FieldSpec::accumulator("notes").output())
        .field(FieldSpec::messages().optional().output())
}

fn random_score(rng: &mut impl Rng) -> Value {
    if rng.random_bool(0.2) {
        Value::Null
    } else {
        json!(rng.random_range(0..1000))
    }
}

/// Applying the same replacement update twice equals applying it once
#[test]
fn test_replacement_merge_is_idempotent() {
    let schema = schema();
    let mut rng = rand::rng();

    for _ in 0..200 {
        let start = State::new().with("score", rng.random_range(0..100));
        let update = StateUpdate::new().set("score", rng.random_range(0..100));

        let once = schema.merge(start.clone(), update.clone()).unwrap();
        let twice = schema.merge(once.clone(), update).unwrap();
        assert_eq!(once, twice);
    }
}

#[test]
fn test_replacement_last_writer_wins() {
    let schema = schema();
    let mut rng = rand::rng();

    for _ in 0..100 {
        let first = random_score(&mut rng);
        let second = json!(rng.random_range(0..1000));
        let update = StateUpdate::new().set("score", first).set("score", second.clone());
        let state = schema.merge(State::new(), update).unwrap();
        assert_eq!(state.get("score"), Some(&second));
    }
}

#[test]
fn test_append_concatenates_in_order() {
    let schema = schema();
    let state = schema
        .merge(State::new(), StateUpdate::new().set("notes", json!(["a"])))
        .unwrap();
    let state = schema
        .merge(state, StateUpdate::new().set("notes", json!(["b"])))
        .unwrap();

    assert_eq!(state.get("notes"), Some(&json!(["a", "b"])));
}

#[test]
fn test_append_accepts_single_value_and_ignores_null() {
    let schema = schema();
    let state = schema
        .merge(State::new(), StateUpdate::new().set("notes", "only"))
        .unwrap();
    let state = schema
        .merge(state, StateUpdate::new().set("notes", Value::Null))
        .unwrap();

    assert_eq!(state.get("notes"), Some(&json!(["only"])));
}

/// A step may append several messages in one update
#[tokio::test]
async fn test_messages_accumulate_across_steps() {
    let pipeline = Pipeline::builder("chat", schema())
        .add_step(
            "ask",
            from_fn(|_, _| Ok(StateUpdate::new().message(Message::assistant("first")).into())),
        )
        .add_step(
            "answer",
            from_fn(|_, _| {
                Ok(StateUpdate::new()
                    .message(Message::tool("call-1", "result"))
                    .message(Message::assistant("second"))
                    .into())
            }),
        )
        .add_edge("ask", "answer")
        .add_edge("answer", END)
        .build()
        .unwrap();

    let input = State::new().with("messages", vec![Message::user("hi").to_value()]);
    let output = run(&pipeline, input).await.unwrap();

    let contents: Vec<String> = output.messages().into_iter().map(|m| m.content).collect();
    assert_eq!(contents, vec!["hi", "first", "result", "second"]);
}

#[tokio::test]
async fn test_update_of_wrong_kind_is_schema_violation() {
    let pipeline = Pipeline::builder("bad_kind", schema())
        .add_step(
            "write",
            from_fn(|_, _| Ok(StateUpdate::new().set("score", "high").into())),
        )
        .add_edge("write", END)
        .build()
        .unwrap();

    let err = run(&pipeline, State::new()).await.unwrap_err();
    assert!(matches!(err, PipelineError::SchemaViolation(msg) if msg.contains("score")));
}

#[tokio::test]
async fn test_update_outside_schema_is_schema_violation() {
    let pipeline = Pipeline::builder("bad_field", schema())
        .add_step(
            "write",
            from_fn(|_, _| Ok(StateUpdate::new().set("unknown", 1).into())),
        )
        .add_edge("write", END)
        .build()
        .unwrap();

    let err = run(&pipeline, State::new()).await.unwrap_err();
    assert!(matches!(err, PipelineError::SchemaViolation(msg) if msg.contains("unknown")));
}

#[tokio::test]
async fn test_unset_outputs_are_omitted() {
    let pipeline = Pipeline::builder("partial", schema())
        .add_step(
            "write",
            from_fn(|_, _| Ok(StateUpdate::new().set("title", "done").into())),
        )
        .add_edge("write", END)
        .build()
        .unwrap();

    let output = run(&pipeline, State::new()).await.unwrap();
    assert_eq!(output.to_json(), json!({"title": "done"}));
}
