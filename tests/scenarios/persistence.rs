//! Test: Persistence - execution history and thread checkpoints on every backend

use crate::helpers::*;
use bizflow::core::config::AppConfig;
use bizflow::core::{ExecutionStatus, Message, PipelineError, State};
use bizflow::persistence::{ExecutionRecord, InMemoryPersistence, PersistenceBackend};
use bizflow::workflows::Catalog;
use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

fn record(pipeline: &str, thread: Option<&str>, minutes_ago: i64) -> ExecutionRecord {
    let mut record =
        ExecutionRecord::start(Uuid::new_v4(), pipeline).with_thread(thread.map(str::to_string));
    record.started_at = Utc::now() - Duration::minutes(minutes_ago);
    record
}

fn answered(text: &str) -> Result<State, PipelineError> {
    Ok(State::new().with(
        "messages",
        vec![Message::user("question").to_value(), Message::assistant(text).to_value()],
    ))
}

/// Behaviour every backend must share
async fn exercise(store: &dyn PersistenceBackend) {
    let first = record("customer_supporter", Some("thread-1"), 30)
        .with_action("hr_agent")
        .finish(&answered("first answer"));
    let second = record("customer_supporter", Some("thread-1"), 20)
        .with_action("hr_agent")
        .finish(&answered("second answer"));
    let failed = record("customer_supporter", Some("thread-1"), 10)
        .finish(&Err(PipelineError::StepFailure {
            step: "hr_agent".to_string(),
            cause: bizflow::core::StepError::InvalidState("no message".to_string()),
        }));
    let other = record("contract_review", None, 5).finish(&Ok(
        State::new().with("risk_analysis_result", "low risk"),
    ));

    for r in [&first, &second, &failed, &other] {
        store.save_execution(r).await.unwrap();
    }

    let loaded = store.load_execution(second.execution_id).await.unwrap().unwrap();
    assert_eq!(loaded.status, ExecutionStatus::Completed);
    assert_eq!(loaded.action.as_deref(), Some("hr_agent"));
    assert_eq!(loaded.thread_id.as_deref(), Some("thread-1"));
    assert!(loaded.duration().is_some());
    assert!(store.load_execution(Uuid::new_v4()).await.unwrap().is_none());

    let thread: Vec<Uuid> = store
        .list_thread("thread-1")
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.execution_id)
        .collect();
    assert_eq!(thread, vec![failed.execution_id, second.execution_id, first.execution_id]);

    let checkpoint = store.latest_for_thread("thread-1").await.unwrap().unwrap();
    assert_eq!(checkpoint.execution_id, second.execution_id);
    assert_eq!(checkpoint.messages()[1].content, "second answer");
    assert!(store.latest_for_thread("thread-2").await.unwrap().is_none());

    let recent: Vec<Uuid> = store
        .recent(2)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.execution_id)
        .collect();
    assert_eq!(recent, vec![other.execution_id, failed.execution_id]);

    assert_eq!(store.list_executions("contract_review").await.unwrap().len(), 1);
    assert_eq!(
        store.list_executions("contract_review").await.unwrap()[0].output,
        Some(json!({"risk_analysis_result": "low risk"}))
    );
    assert_eq!(
        store.list_pipelines().await.unwrap(),
        vec!["contract_review", "customer_supporter"]
    );

    let stored_failure = store.load_execution(failed.execution_id).await.unwrap().unwrap();
    assert_eq!(stored_failure.status, ExecutionStatus::Failed);
    assert!(stored_failure.error.unwrap().contains("hr_agent"));
    assert!(stored_failure.output.is_none());
}

#[tokio::test]
async fn test_in_memory_backend() {
    exercise(&InMemoryPersistence::new()).await;
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn test_sqlite_backend() {
    let dir = tempfile::tempdir().unwrap();
    let store = bizflow::persistence::SqliteExecutionStore::new(dir.path().join("history.db"))
        .await
        .unwrap();
    exercise(&store).await;
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn test_sqlite_history_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.db");
    let saved = record("meeting_summary", Some("t"), 0).finish(&Ok(State::new()));

    {
        let store = bizflow::persistence::SqliteExecutionStore::new(&path).await.unwrap();
        store.save_execution(&saved).await.unwrap();
    }

    let reopened = bizflow::persistence::SqliteExecutionStore::new(&path).await.unwrap();
    let loaded = reopened.load_execution(saved.execution_id).await.unwrap().unwrap();
    assert_eq!(loaded.pipeline_name, "meeting_summary");
}

/// A follow-up request continues from the thread's checkpoint
#[tokio::test]
async fn test_thread_continues_from_checkpoint() {
    let stubs = Stubs {
        model: StubModel::texts(&["You have ten days.", "Yes, unused days carry over."]),
        ..Default::default()
    };
    let catalog = Catalog::build(&AppConfig::default(), &stubs.deps()).unwrap();
    let router = catalog.supporter().unwrap().clone();
    let store = InMemoryPersistence::new();

    let mut previous: Option<ExecutionRecord> = None;
    for (minutes_ago, question) in [(1, "How many leave days?"), (0, "Do they carry over?")] {
        let mut messages = match store.latest_for_thread("thread-9").await.unwrap() {
            Some(checkpoint) => checkpoint.messages(),
            None => Vec::new(),
        };
        messages.push(Message::user(question));
        let input = State::new().with("action", "hr_agent").with(
            "messages",
            messages.iter().map(Message::to_value).collect::<Vec<_>>(),
        );

        let result = run(&router, input).await;
        let saved = record(router.name(), Some("thread-9"), minutes_ago)
            .with_action("hr_agent")
            .finish(&result);
        store.save_execution(&saved).await.unwrap();
        previous = Some(saved);
    }

    let last = previous.unwrap().messages();
    let contents: Vec<&str> = last.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(
        contents,
        vec![
            "How many leave days?",
            "You have ten days.",
            "Do they carry over?",
            "Yes, unused days carry over.",
        ]
    );
}
