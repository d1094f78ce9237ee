//! Test: Router Dispatch - exactly one pipeline per known action, unknown actions rejected

use crate::helpers::*;
use bizflow::core::{
    from_fn, FieldSpec, Pipeline, PipelineError, State, StateSchema, StateUpdate, StepError,
    Strictness, END,
};
use bizflow::{EngineOptions, ExecutionEngine, Route, Router, RunContext};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const ACTIONS: [&str; 3] = ["alpha", "beta", "gamma"];

struct Spies {
    counters: Vec<Arc<AtomicUsize>>,
    router: Pipeline,
}

impl Spies {
    fn counts(&self) -> Vec<usize> {
        self.counters.iter().map(|c| c.load(Ordering::SeqCst)).collect()
    }
}

fn spy(name: &'static str, counter: Arc<AtomicUsize>) -> Arc<Pipeline> {
    let schema = StateSchema::new().field(FieldSpec::text("answer").output());
    Arc::new(
        Pipeline::builder(name, schema)
            .add_step(
                "answer",
                from_fn(move |_, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(StateUpdate::new().set("answer", format!("from {}", name)).into())
                }),
            )
            .add_edge("answer", END)
            .build()
            .unwrap(),
    )
}

fn spies() -> Spies {
    let counters: Vec<Arc<AtomicUsize>> = ACTIONS.iter().map(|_| Arc::default()).collect();
    let schema = StateSchema::new().field(FieldSpec::text("answer").output());
    let router = ACTIONS
        .iter()
        .zip(&counters)
        .fold(Router::new("root", schema), |router, (action, counter)| {
            router.route(Route::new(*action, spy(*action, counter.clone())))
        })
        .build()
        .unwrap();
    Spies { counters, router }
}

#[tokio::test]
async fn test_each_action_dispatches_exactly_once() {
    for (i, action) in ACTIONS.iter().enumerate() {
        let spies = spies();
        let output = run(&spies.router, State::new().with("action", *action))
            .await
            .unwrap();

        assert_eq!(output.get_str("answer"), Some(format!("from {}", action).as_str()));
        let mut expected = vec![0; ACTIONS.len()];
        expected[i] = 1;
        assert_eq!(spies.counts(), expected, "action {}", action);
    }
}

#[tokio::test]
async fn test_unknown_action_runs_no_pipeline() {
    let spies = spies();
    let err = run(&spies.router, State::new().with("action", "weather_agent"))
        .await
        .unwrap_err();

    assert_eq!(err.user_message(), "unsupported request");
    match err {
        PipelineError::UnknownAction { action, known } => {
            assert_eq!(action, "weather_agent");
            assert_eq!(known, ACTIONS.to_vec());
        }
        other => panic!("expected unknown action, got {}", other),
    }
    assert_eq!(spies.counts(), vec![0, 0, 0]);
}

#[tokio::test]
async fn test_missing_action_is_schema_violation() {
    let spies = spies();
    let err = run(&spies.router, State::new()).await.unwrap_err();

    assert!(matches!(err, PipelineError::SchemaViolation(msg) if msg.contains("action")));
    assert_eq!(spies.counts(), vec![0, 0, 0]);
}

#[tokio::test]
async fn test_prepare_failure_names_action_step() {
    let counter = Arc::new(AtomicUsize::new(0));
    let schema = StateSchema::new().field(FieldSpec::text("answer").output());
    let router = Router::new("root", schema)
        .route(
            Route::new("alpha", spy("alpha", counter.clone()))
                .prepare(|_| Err(StepError::InvalidState("attachment missing".into()))),
        )
        .build()
        .unwrap();

    let err = run(&router, State::new().with("action", "alpha")).await.unwrap_err();

    let cause = expect_step_failure(err, "alpha");
    assert!(matches!(cause, StepError::InvalidState(_)));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_finish_maps_target_output() {
    let counter = Arc::new(AtomicUsize::new(0));
    let schema = StateSchema::new().field(FieldSpec::text("reply").output());
    let router = Router::new("root", schema)
        .route(
            Route::new("alpha", spy("alpha", counter)).finish(|_, output| {
                let answer = output.get_str("answer").unwrap_or_default().to_uppercase();
                StateUpdate::new().set("reply", answer)
            }),
        )
        .build()
        .unwrap();

    let output = run(&router, State::new().with("action", "alpha")).await.unwrap();
    assert_eq!(output.to_json(), serde_json::json!({"reply": "FROM ALPHA"}));
}

fn strict_engine() -> ExecutionEngine {
    ExecutionEngine::new(EngineOptions {
        strictness: Strictness::Strict,
        ..Default::default()
    })
}

/// The default route hands the target only what its schema names
#[tokio::test]
async fn test_default_route_under_strict_engine() {
    let spies = spies();
    let output = strict_engine()
        .execute(&spies.router, State::new().with("action", "beta"), RunContext::default())
        .await
        .unwrap();

    assert_eq!(output.get_str("answer"), Some("from beta"));
    assert_eq!(spies.counts(), vec![0, 1, 0]);
}

#[tokio::test]
async fn test_strict_engine_rejects_unknown_router_input() {
    let spies = spies();
    let err = strict_engine()
        .execute(
            &spies.router,
            State::new().with("action", "alpha").with("colour", "blue"),
            RunContext::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::SchemaViolation(msg) if msg.contains("colour")));
    assert_eq!(spies.counts(), vec![0, 0, 0]);
}
