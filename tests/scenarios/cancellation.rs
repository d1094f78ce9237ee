//! Test: Cancellation and Deadlines - observed between steps and across nested runs

use crate::helpers::*;
use bizflow::core::{
    from_async_fn, from_fn, ExecutionStatus, FieldSpec, Pipeline, PipelineError, RunConfig, State,
    StateSchema, StateUpdate, StepError, StepOutcome, END,
};
use bizflow::{ExecutionEvent, RunContext};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn schema() -> StateSchema {
    StateSchema::new()
        .field(FieldSpec::text("seen").output())
        .field(FieldSpec::text("title").output())
}

fn final_status(events: &[ExecutionEvent]) -> Option<ExecutionStatus> {
    match events.last() {
        Some(ExecutionEvent::PipelineCompleted { status, .. }) => Some(*status),
        _ => None,
    }
}

#[tokio::test]
async fn test_cancel_is_observed_before_next_step() {
    let second_ran = Arc::new(AtomicBool::new(false));
    let flag = second_ran.clone();

    let pipeline = Pipeline::builder("cancel_midway", schema())
        .add_step(
            "first",
            from_fn(|_, ctx| {
                ctx.cancel_token().cancel();
                Ok(StateUpdate::new().set("seen", "first").into())
            }),
        )
        .add_step(
            "second",
            from_fn(move |_, _| {
                flag.store(true, Ordering::SeqCst);
                Ok(StepOutcome::empty())
            }),
        )
        .add_edge("first", "second")
        .add_edge("second", END)
        .build()
        .unwrap();

    let (result, events) = run_recording(&pipeline, State::new(), RunContext::default()).await;

    assert!(matches!(result, Err(PipelineError::Cancelled { before }) if before == "second"));
    assert!(!second_ran.load(Ordering::SeqCst));
    assert_eq!(final_status(&events), Some(ExecutionStatus::Cancelled));
}

/// The deadline is advisory: the running step finishes, the next one does not start
#[tokio::test]
async fn test_deadline_is_checked_between_steps() {
    let pipeline = Pipeline::builder("slow", schema())
        .add_step(
            "slow",
            from_async_fn(|_state: State, _ctx| async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<StepOutcome, StepError>(StateUpdate::new().set("seen", "slow").into())
            }),
        )
        .add_step("after", from_fn(|_, _| Ok(StepOutcome::empty())))
        .add_edge("slow", "after")
        .add_edge("after", END)
        .build()
        .unwrap();

    let (result, events) = run_recording(
        &pipeline,
        State::new(),
        RunContext::default().with_timeout(Duration::from_millis(10)),
    )
    .await;

    assert!(matches!(result, Err(PipelineError::Timeout(budget)) if budget == Duration::from_millis(10)));
    assert_eq!(steps_started(&events), vec!["slow"]);
    assert_eq!(final_status(&events), Some(ExecutionStatus::TimedOut));
}

#[tokio::test]
async fn test_nested_run_shares_cancellation_and_config() {
    let child = Arc::new(
        Pipeline::builder("child", schema())
            .add_step(
                "child_first",
                from_fn(|_, ctx| {
                    let title = ctx.config().user_title.clone().unwrap_or_default();
                    ctx.cancel_token().cancel();
                    Ok(StateUpdate::new().set("title", title).into())
                }),
            )
            .add_step("child_second", from_fn(|_, _| Ok(StepOutcome::empty())))
            .add_edge("child_first", "child_second")
            .add_edge("child_second", END)
            .build()
            .unwrap(),
    );

    let nested = child.clone();
    let parent = Pipeline::builder("parent", schema())
        .add_step(
            "delegate",
            from_async_fn(move |state: State, ctx| {
                let child = nested.clone();
                async move {
                    let output = ctx.run_pipeline(&child, state).await?;
                    let title = output.get_str("title").unwrap_or_default().to_string();
                    Ok::<StepOutcome, StepError>(StateUpdate::new().set("title", title).into())
                }
            }),
        )
        .add_step("after", from_fn(|_, _| Ok(StepOutcome::empty())))
        .add_edge("delegate", "after")
        .add_edge("after", END)
        .build()
        .unwrap();

    let run = RunContext::new(RunConfig::new().with_user_title("Accountant"));
    let (result, events) = run_recording(&parent, State::new(), run).await;

    assert!(matches!(result, Err(PipelineError::Cancelled { before }) if before == "child_second"));
    assert_eq!(steps_started(&events), vec!["delegate"]);

    let child_started = events.iter().any(|e| {
        matches!(e, ExecutionEvent::StepStarted { step, .. } if step == "child_first")
    });
    assert!(child_started);
}

#[tokio::test]
async fn test_nested_run_sees_parent_config() {
    let child = Arc::new(
        Pipeline::builder("child", schema())
            .add_step(
                "read_title",
                from_fn(|_, ctx| {
                    let title = ctx.config().user_title.clone().unwrap_or_default();
                    Ok(StateUpdate::new().set("title", title).into())
                }),
            )
            .add_edge("read_title", END)
            .build()
            .unwrap(),
    );

    let nested = child.clone();
    let parent = Pipeline::builder("parent", schema())
        .add_step(
            "delegate",
            from_async_fn(move |state: State, ctx| {
                let child = nested.clone();
                async move {
                    let output = ctx.run_pipeline(&child, state).await?;
                    let title = output.get_str("title").unwrap_or_default().to_string();
                    Ok::<StepOutcome, StepError>(StateUpdate::new().set("title", title).into())
                }
            }),
        )
        .add_edge("delegate", END)
        .build()
        .unwrap();

    let run = RunContext::new(RunConfig::new().with_user_title("Accountant"));
    let (result, _) = run_recording(&parent, State::new(), run).await;

    assert_eq!(result.unwrap().get_str("title"), Some("Accountant"));
}
