//! Persistence layer for execution history and thread checkpoints

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteExecutionStore;

pub use crate::core::ExecutionStatus;
use crate::core::{Message, PipelineError, State};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// One finished (or abandoned) execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: Uuid,

    /// Conversation thread, when the caller supplied one
    pub thread_id: Option<String>,

    pub pipeline_name: String,

    /// Router action, for router executions
    pub action: Option<String>,

    pub status: ExecutionStatus,

    pub started_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Output view of the final state
    pub output: Option<Value>,

    pub error: Option<String>,
}

impl ExecutionRecord {
    pub fn start(execution_id: Uuid, pipeline_name: impl Into<String>) -> Self {
        Self {
            execution_id,
            thread_id: None,
            pipeline_name: pipeline_name.into(),
            action: None,
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            output: None,
            error: None,
        }
    }

    pub fn with_thread(mut self, thread_id: Option<String>) -> Self {
        self.thread_id = thread_id;
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Record the outcome of the execution
    pub fn finish(mut self, result: &Result<State, PipelineError>) -> Self {
        self.completed_at = Some(Utc::now());
        match result {
            Ok(output) => {
                self.status = ExecutionStatus::Completed;
                self.output = Some(output.to_json());
            }
            Err(e) => {
                self.status = match e {
                    PipelineError::Cancelled { .. } => ExecutionStatus::Cancelled,
                    PipelineError::Timeout(_) => ExecutionStatus::TimedOut,
                    _ => ExecutionStatus::Failed,
                };
                self.error = Some(e.to_string());
            }
        }
        self
    }

    /// Conversation carried in the recorded output, oldest first
    pub fn messages(&self) -> Vec<Message> {
        self.output
            .clone()
            .and_then(State::from_json)
            .map(|state| state.messages())
            .unwrap_or_default()
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|end| end - self.started_at)
    }
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Insert or replace an execution record
    async fn save_execution(&self, record: &ExecutionRecord) -> Result<()>;

    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionRecord>>;

    /// Executions of one pipeline, newest first
    async fn list_executions(&self, pipeline_name: &str) -> Result<Vec<ExecutionRecord>>;

    /// Executions of one conversation thread, newest first
    async fn list_thread(&self, thread_id: &str) -> Result<Vec<ExecutionRecord>>;

    /// Newest executions across all pipelines
    async fn recent(&self, limit: usize) -> Result<Vec<ExecutionRecord>>;

    /// The newest completed execution of a thread: its checkpoint
    async fn latest_for_thread(&self, thread_id: &str) -> Result<Option<ExecutionRecord>>;

    /// Names of all pipelines with recorded executions
    async fn list_pipelines(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemoryPersistence {
    executions: RwLock<HashMap<Uuid, ExecutionRecord>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    async fn select<F>(&self, keep: F) -> Vec<ExecutionRecord>
    where
        F: Fn(&ExecutionRecord) -> bool,
    {
        let executions = self.executions.read().await;
        let mut records: Vec<ExecutionRecord> =
            executions.values().filter(|r| keep(r)).cloned().collect();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        records
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_execution(&self, record: &ExecutionRecord) -> Result<()> {
        let mut executions = self.executions.write().await;
        executions.insert(record.execution_id, record.clone());
        Ok(())
    }

    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionRecord>> {
        let executions = self.executions.read().await;
        Ok(executions.get(&execution_id).cloned())
    }

    async fn list_executions(&self, pipeline_name: &str) -> Result<Vec<ExecutionRecord>> {
        Ok(self.select(|r| r.pipeline_name == pipeline_name).await)
    }

    async fn list_thread(&self, thread_id: &str) -> Result<Vec<ExecutionRecord>> {
        Ok(self
            .select(|r| r.thread_id.as_deref() == Some(thread_id))
            .await)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ExecutionRecord>> {
        let mut records = self.select(|_| true).await;
        records.truncate(limit);
        Ok(records)
    }

    async fn latest_for_thread(&self, thread_id: &str) -> Result<Option<ExecutionRecord>> {
        Ok(self
            .select(|r| {
                r.thread_id.as_deref() == Some(thread_id) && r.status == ExecutionStatus::Completed
            })
            .await
            .into_iter()
            .next())
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let executions = self.executions.read().await;
        let mut names: Vec<String> = executions
            .values()
            .map(|r| r.pipeline_name.clone())
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}
