//! Test: Fan-Out - order preservation, empty input, fail-fast and bounded concurrency

use crate::helpers::*;
use bizflow::core::{
    from_async_fn, from_fn, FieldKind, FieldSpec, Pipeline, PipelineError, State, StateSchema,
    StateUpdate, StepError, StepOutcome, ToolError, END,
};
use bizflow::execution::FanOut;
use bizflow::{CancellationToken, RunContext};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const ITEMS: usize = 5;

fn member_schema() -> StateSchema {
    StateSchema::new()
        .field(FieldSpec::new("item", FieldKind::Any).required())
        .field(FieldSpec::text("prefix").optional())
        .field(FieldSpec::text("label").output())
}

/// Member pipeline whose item `i` sleeps `(ITEMS - i) * 15ms`, so later items finish first
fn reversed_member() -> Arc<Pipeline> {
    let step = from_async_fn(|state: State, _ctx| async move {
        let i = state.get("item").and_then(Value::as_u64).unwrap_or(0) as usize;
        tokio::time::sleep(Duration::from_millis(((ITEMS - i) * 15) as u64)).await;
        let prefix = state.get_str("prefix").unwrap_or("item");
        Ok::<StepOutcome, StepError>(StateUpdate::new().set("label", format!("{}-{}", prefix, i)).into())
    });
    Arc::new(
        Pipeline::builder("member", member_schema())
            .add_step("label", step)
            .add_edge("label", END)
            .build()
            .unwrap(),
    )
}

fn parent(fan_out: FanOut) -> Pipeline {
    let schema = StateSchema::new()
        .field(FieldSpec::list("items").required())
        .field(FieldSpec::text("prefix").optional())
        .field(FieldSpec::accumulator("labels").output())
        .field(FieldSpec::text("after").output());

    Pipeline::builder("parent", schema)
        .add_step("each", fan_out)
        .add_step(
            "after",
            from_fn(|state, _| {
                let count = state.get_list("labels").len();
                Ok(StateUpdate::new().set("after", format!("{} labels", count)).into())
            }),
        )
        .add_edge("each", "after")
        .add_edge("after", END)
        .build()
        .unwrap()
}

fn items(n: usize) -> Value {
    Value::Array((0..n).map(|i| json!(i)).collect())
}

/// Test that collected outputs follow input order, not completion order
#[tokio::test]
async fn test_order_preserved_under_reversed_completion() {
    let fan_out = FanOut::new(reversed_member(), "items", "item")
        .share("prefix")
        .collect("label", "labels");

    let output = run(
        &parent(fan_out),
        State::new().with("items", items(ITEMS)).with("prefix", "r"),
    )
    .await
    .unwrap();

    assert_eq!(
        output.get("labels"),
        Some(&json!(["r-0", "r-1", "r-2", "r-3", "r-4"]))
    );
}

fn counting_member(counter: Arc<AtomicUsize>) -> Arc<Pipeline> {
    let step = from_fn(move |state, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        let i = state.get("item").and_then(Value::as_u64).unwrap_or(0);
        Ok(StateUpdate::new().set("label", format!("x{}", i)).into())
    });
    Arc::new(
        Pipeline::builder("member", member_schema())
            .add_step("label", step)
            .add_edge("label", END)
            .build()
            .unwrap(),
    )
}

#[tokio::test]
async fn test_empty_fan_out_continues_with_empty_collection() {
    let launched = Arc::new(AtomicUsize::new(0));
    let fan_out = FanOut::new(counting_member(launched.clone()), "items", "item")
        .collect("label", "labels");

    let output = run(&parent(fan_out), State::new().with("items", json!([])))
        .await
        .unwrap();

    assert_eq!(output.get("labels"), Some(&json!([])));
    assert_eq!(output.get_str("after"), Some("0 labels"));
    assert_eq!(launched.load(Ordering::SeqCst), 0);
}

/// A member that sets nothing still occupies its position
#[tokio::test]
async fn test_member_without_output_keeps_its_position() {
    let step = from_fn(|state, _| {
        let i = state.get("item").and_then(Value::as_u64).unwrap_or(0);
        if i == 1 {
            return Ok(StepOutcome::empty());
        }
        Ok(StateUpdate::new().set("label", format!("x{}", i)).into())
    });
    let member = Arc::new(
        Pipeline::builder("member", member_schema())
            .add_step("label", step)
            .add_edge("label", END)
            .build()
            .unwrap(),
    );
    let fan_out = FanOut::new(member, "items", "item").collect("label", "labels");

    let output = run(&parent(fan_out), State::new().with("items", items(3)))
        .await
        .unwrap();

    assert_eq!(output.get("labels"), Some(&json!(["x0", null, "x2"])));
    assert_eq!(output.get_str("after"), Some("3 labels"));
}

/// The first failing member aborts the others and surfaces its own error
#[tokio::test]
async fn test_fail_fast_surfaces_member_error() {
    let step = from_async_fn(|state: State, _ctx| async move {
        if state.get("item") == Some(&json!(2)) {
            return Err(StepError::Tool(ToolError::Network("resume host down".into())));
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(StepOutcome::update(StateUpdate::new().set("label", "slow")))
    });
    let member = Arc::new(
        Pipeline::builder("member", member_schema())
            .add_step("label", step)
            .add_edge("label", END)
            .build()
            .unwrap(),
    );
    let fan_out = FanOut::new(member, "items", "item").collect("label", "labels");

    let started = Instant::now();
    let err = run(&parent(fan_out), State::new().with("items", items(4)))
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(2), "slow members were not aborted");
    let cause = expect_step_failure(err, "label");
    assert!(matches!(cause, StepError::Tool(ToolError::Network(_))));
}

/// Siblings that already finished do not rescue a later failure
#[tokio::test]
async fn test_fail_fast_after_siblings_completed() {
    let finished = Arc::new(AtomicUsize::new(0));
    let done = finished.clone();
    let step = from_async_fn(move |state: State, _ctx| {
        let done = done.clone();
        async move {
            if state.get("item") == Some(&json!(2)) {
                tokio::time::sleep(Duration::from_millis(40)).await;
                return Err(StepError::Tool(ToolError::status(502, "scoring service")));
            }
            done.fetch_add(1, Ordering::SeqCst);
            Ok(StepOutcome::update(StateUpdate::new().set("label", "fast")))
        }
    });
    let member = Arc::new(
        Pipeline::builder("member", member_schema())
            .add_step("label", step)
            .add_edge("label", END)
            .build()
            .unwrap(),
    );
    let fan_out = FanOut::new(member, "items", "item").collect("label", "labels");

    let (result, events) = run_recording(
        &parent(fan_out),
        State::new().with("items", items(3)),
        RunContext::default(),
    )
    .await;

    assert_eq!(finished.load(Ordering::SeqCst), 2);
    let cause = expect_step_failure(result.unwrap_err(), "label");
    assert!(matches!(cause, StepError::Tool(ToolError::Status { status: 502, .. })));
    assert_eq!(steps_started(&events), vec!["each"]);
}

#[tokio::test]
async fn test_limit_bounds_concurrency() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let (running_in, peak_in) = (running.clone(), peak.clone());
    let step = from_async_fn(move |_state: State, _ctx| {
        let running = running_in.clone();
        let peak = peak_in.clone();
        async move {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            running.fetch_sub(1, Ordering::SeqCst);
            Ok::<_, StepError>(StepOutcome::update(StateUpdate::new().set("label", "done")))
        }
    });
    let member = Arc::new(
        Pipeline::builder("member", member_schema())
            .add_step("label", step)
            .add_edge("label", END)
            .build()
            .unwrap(),
    );
    let fan_out = FanOut::new(member, "items", "item")
        .collect("label", "labels")
        .limit(2);

    let output = run(&parent(fan_out), State::new().with("items", items(6)))
        .await
        .unwrap();

    assert_eq!(output.get_list("labels").len(), 6);
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_cancel_during_fan_out() {
    let step = from_async_fn(|_state: State, _ctx| async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok::<_, StepError>(StepOutcome::update(StateUpdate::new().set("label", "late")))
    });
    let member = Arc::new(
        Pipeline::builder("member", member_schema())
            .add_step("label", step)
            .add_edge("label", END)
            .build()
            .unwrap(),
    );
    let fan_out = FanOut::new(member, "items", "item").collect("label", "labels");

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let (result, _) = run_recording(
        &parent(fan_out),
        State::new().with("items", items(3)),
        RunContext::default().with_cancel(cancel),
    )
    .await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(matches!(result, Err(PipelineError::Cancelled { .. })));
}
