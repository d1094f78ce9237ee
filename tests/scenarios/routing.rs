//! Test: Routing - conditional edges, directives and acyclicity

use crate::helpers::*;
use bizflow::core::{
    from_fn, BuildError, FieldKind, FieldSpec, Pipeline, PipelineError, State, StateSchema,
    StateUpdate, StepOutcome, END,
};
use rand::Rng;

fn schema() -> StateSchema {
    StateSchema::new()
        .field(FieldSpec::new("n", FieldKind::Number).required())
        .field(FieldSpec::text("path").output())
}

fn mark(path: &'static str) -> impl bizflow::Step {
    from_fn(move |_, _| Ok(StateUpdate::new().set("path", path).into()))
}

fn branching(route: fn(&State) -> String) -> Pipeline {
    Pipeline::builder("branching", schema())
        .add_step("check", from_fn(|_, _| Ok(StepOutcome::empty())))
        .add_step("even", mark("even"))
        .add_step("odd", mark("odd"))
        .add_conditional_edge("check", route, &["even", "odd"])
        .add_edge("even", END)
        .add_edge("odd", END)
        .build()
        .unwrap()
}

fn parity(state: &State) -> String {
    match state.get("n").and_then(|v| v.as_i64()) {
        Some(n) if n % 2 == 0 => "even".to_string(),
        _ => "odd".to_string(),
    }
}

#[tokio::test]
async fn test_conditional_edge_follows_route() {
    let pipeline = branching(parity);
    let mut rng = rand::rng();

    for _ in 0..50 {
        let n: i64 = rng.random_range(-1000..1000);
        let output = run(&pipeline, State::new().with("n", n)).await.unwrap();
        let expected = if n % 2 == 0 { "even" } else { "odd" };
        assert_eq!(output.get_str("path"), Some(expected), "n = {}", n);
    }
}

/// A route outside its candidate set fails for every sampled state
#[tokio::test]
async fn test_route_outside_candidates_is_routing_error() {
    let pipeline = branching(|state| {
        let n = state.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
        format!("step_{}", n)
    });
    let mut rng = rand::rng();

    for _ in 0..50 {
        let n: i64 = rng.random_range(0..10_000);
        let err = run(&pipeline, State::new().with("n", n)).await.unwrap_err();
        match err {
            PipelineError::Routing {
                step,
                selected,
                candidates,
            } => {
                assert_eq!(step, "check");
                assert_eq!(selected, format!("step_{}", n));
                assert_eq!(candidates, vec!["even", "odd"]);
            }
            other => panic!("expected routing error, got {}", other),
        }
    }
}

#[test]
fn test_cycle_through_conditional_edge_rejected() {
    let result = Pipeline::builder("looping", schema())
        .add_step("draft", from_fn(|_, _| Ok(StepOutcome::empty())))
        .add_step("review", from_fn(|_, _| Ok(StepOutcome::empty())))
        .add_edge("draft", "review")
        .add_conditional_edge("review", |_: &State| END.to_string(), &["draft", END])
        .build();

    assert!(matches!(result, Err(BuildError::Cycle(_))));
}

#[test]
fn test_cycle_through_directive_rejected() {
    let result = Pipeline::builder("looping", schema())
        .add_step("agent", from_fn(|_, _| Ok(StepOutcome::end(StateUpdate::new()))))
        .add_step("tools", from_fn(|_, _| Ok(StepOutcome::empty())))
        .add_directive("agent", &["tools", END])
        .add_edge("tools", "agent")
        .build();

    assert!(matches!(result, Err(BuildError::Cycle(_))));
}

#[tokio::test]
async fn test_directive_step_without_directive_is_routing_error() {
    let pipeline = Pipeline::builder("silent", schema())
        .add_step("decide", from_fn(|_, _| Ok(StepOutcome::empty())))
        .add_step("next", mark("next"))
        .add_directive("decide", &["next", END])
        .add_edge("next", END)
        .build()
        .unwrap();

    let err = run(&pipeline, State::new().with("n", 1)).await.unwrap_err();
    assert!(matches!(err, PipelineError::Routing { step, .. } if step == "decide"));
}

#[tokio::test]
async fn test_directive_to_end_skips_remaining_steps() {
    let pipeline = Pipeline::builder("early_exit", schema())
        .add_step(
            "decide",
            from_fn(|_, _| Ok(StepOutcome::end(StateUpdate::new().set("path", "stopped")))),
        )
        .add_step("next", mark("next"))
        .add_directive("decide", &["next", END])
        .add_edge("next", END)
        .build()
        .unwrap();

    let output = run(&pipeline, State::new().with("n", 1)).await.unwrap();
    assert_eq!(output.get_str("path"), Some("stopped"));
}
