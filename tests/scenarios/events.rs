//! Test: Progress Events - step-level records in emission order

use crate::helpers::*;
use bizflow::core::{Role, State};
use bizflow::execution::ExecutionEvent;
use bizflow::model::ModelReply;
use bizflow::workflows::{contract_review, employment_review, prompts, resume};
use bizflow::RunContext;
use serde_json::{json, Value};
use std::sync::Arc;

fn action(action: &str, phase: &str) -> Value {
    json!({"action": action, "phase": phase})
}

fn typed(kind: &str, state: &str) -> Value {
    json!({"action": {"type": kind, "state": state}})
}

#[tokio::test]
async fn test_contract_review_progress() {
    let stubs = Stubs {
        documents: Arc::new(StubDocuments::default().with("contract.pdf", "Party A pays in 30 days.")),
        model: StubModel::texts(&["Payment terms favour Party B."]),
        ..Default::default()
    };
    let pipeline = contract_review::build(&stubs.deps()).unwrap();

    let (result, events) = run_recording(
        &pipeline,
        State::new().with("contract_file_path", "contract.pdf"),
        RunContext::default(),
    )
    .await;

    assert!(result.is_ok());
    assert_eq!(
        progress_records(&events),
        vec![
            action("Reading contract", "start"),
            action("Reading contract", "end"),
            action("Analyzing contract", "start"),
            action("Analyzing contract", "end"),
        ]
    );
}

/// A step absorbed by its fallback reports its start but not its end
#[tokio::test]
async fn test_fallback_step_reports_start_only() {
    let stubs = Stubs {
        model: StubModel::texts(&["Nothing to review."]),
        ..Default::default()
    };
    let pipeline = contract_review::build(&stubs.deps()).unwrap();

    let (result, events) = run_recording(
        &pipeline,
        State::new().with("contract_file_path", "missing.pdf"),
        RunContext::default(),
    )
    .await;

    assert!(result.is_ok());
    assert_eq!(
        progress_records(&events),
        vec![
            action("Reading contract", "start"),
            action("Analyzing contract", "start"),
            action("Analyzing contract", "end"),
        ]
    );
}

#[tokio::test]
async fn test_employment_review_typed_progress() {
    let stubs = Stubs {
        documents: Arc::new(StubDocuments::default().with("labor.pdf", "Probation: 8 months.")),
        model: StubModel::texts(&["[]", "# Report"]),
        ..Default::default()
    };
    let pipeline = employment_review::build(&stubs.deps()).unwrap();

    let (result, events) = run_recording(
        &pipeline,
        State::new().with("contract_file_path", "labor.pdf"),
        RunContext::default(),
    )
    .await;

    assert!(result.is_ok());
    assert_eq!(
        progress_records(&events),
        vec![
            typed("load", "start"),
            typed("load", "end"),
            typed("evaluate", "start"),
            typed("evaluate", "end"),
            typed("generate_report", "start"),
            typed("generate_report", "end"),
        ]
    );
}

fn resume_model() -> Arc<StubModel> {
    StubModel::with_fn(|request| {
        let system = request
            .messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        if system == prompts::RESUME_EXTRACTION {
            Ok(ModelReply::text(r#"{"name": "candidate"}"#))
        } else {
            Ok(ModelReply::text(r#"{"resume_rating": 70}"#))
        }
    })
}

#[tokio::test]
async fn test_resume_screening_typed_progress() {
    let stubs = Stubs {
        documents: Arc::new(
            StubDocuments::default()
                .with("a.pdf", "Resume A")
                .with("b.pdf", "Resume B"),
        ),
        model: resume_model(),
        ..Default::default()
    };
    let pipeline = resume::build(&stubs.deps()).unwrap();

    let (result, events) = run_recording(
        &pipeline,
        State::new()
            .with("recruitment_info", "Rust engineer")
            .with("resume_urls", "a.pdf, b.pdf"),
        RunContext::default(),
    )
    .await;

    assert!(result.is_ok());
    assert_eq!(
        progress_records(&events),
        vec![
            typed("process_input_data", "start"),
            typed("process_input_data", "end"),
            typed("resume_score", "start"),
            typed("resume_score", "end"),
            typed("merge_processing_results", "start"),
            typed("merge_processing_results", "end"),
        ]
    );

    let fan_out = events.iter().find_map(|event| match event {
        ExecutionEvent::FanOutStarted { step, items, .. } => Some((step.clone(), *items)),
        _ => None,
    });
    assert_eq!(fan_out, Some((resume::SCREEN_RESUME.to_string(), 2)));
}

#[tokio::test]
async fn test_step_events_bracket_each_step() {
    let stubs = Stubs {
        documents: Arc::new(StubDocuments::default().with("contract.pdf", "text")),
        model: StubModel::texts(&["fine"]),
        ..Default::default()
    };
    let pipeline = contract_review::build(&stubs.deps()).unwrap();

    let (_, events) = run_recording(
        &pipeline,
        State::new().with("contract_file_path", "contract.pdf"),
        RunContext::default(),
    )
    .await;

    let transitions: Vec<(String, String)> = events
        .iter()
        .filter_map(|event| match event {
            ExecutionEvent::StepCompleted { step, next_step, .. } => {
                Some((step.clone(), next_step.clone()))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![
            ("load_contract".to_string(), "analyze_risk".to_string()),
            ("analyze_risk".to_string(), bizflow::END.to_string()),
        ]
    );
    assert!(matches!(events.first(), Some(ExecutionEvent::PipelineStarted { .. })));
    assert!(matches!(events.last(), Some(ExecutionEvent::PipelineCompleted { .. })));
}
