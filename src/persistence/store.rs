//! SQLite-based persistence store

use crate::core::ExecutionStatus;
use crate::persistence::{ExecutionRecord, PersistenceBackend};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const COLUMNS: &str =
    "id, thread_id, pipeline_name, action, status, started_at, completed_at, output, error";

/// SQLite execution store
pub struct SqliteExecutionStore {
    pool: SqlitePool,
}

impl SqliteExecutionStore {
    /// Open (creating if needed) the database at `db_path`
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Default location under the user's local data directory
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bizflow")
            .join("executions.db")
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let db_path = Self::default_path();
        if let Some(dir) = db_path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Self::new(db_path).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS executions (
                id TEXT PRIMARY KEY,
                thread_id TEXT,
                pipeline_name TEXT NOT NULL,
                action TEXT,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                output TEXT,
                error TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_pipeline_name ON executions(pipeline_name);
            CREATE INDEX IF NOT EXISTS idx_thread_id ON executions(thread_id);
            CREATE INDEX IF NOT EXISTS idx_started_at ON executions(started_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to initialize database schema")?;

        Ok(())
    }

    /// Convert DateTime<Utc> to NaiveDateTime for SQLite
    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    /// Convert NaiveDateTime to DateTime<Utc>
    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn record_from_row(row: &SqliteRow) -> Result<ExecutionRecord> {
        let output = row
            .get::<Option<String>, _>("output")
            .map(|text| serde_json::from_str(&text))
            .transpose()
            .context("Stored execution output is not JSON")?;

        Ok(ExecutionRecord {
            execution_id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            thread_id: row.get("thread_id"),
            pipeline_name: row.get("pipeline_name"),
            action: row.get("action"),
            status: ExecutionStatus::parse(&row.get::<String, _>("status")),
            started_at: Self::from_naive(row.get("started_at")),
            completed_at: row
                .get::<Option<NaiveDateTime>, _>("completed_at")
                .map(Self::from_naive),
            output,
            error: row.get("error"),
        })
    }

    fn records(rows: &[SqliteRow]) -> Result<Vec<ExecutionRecord>> {
        rows.iter().map(Self::record_from_row).collect()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for SqliteExecutionStore {
    async fn save_execution(&self, record: &ExecutionRecord) -> Result<()> {
        let output = record
            .output
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO executions
            (id, thread_id, pipeline_name, action, status, started_at, completed_at, output, error)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(record.execution_id.to_string())
        .bind(&record.thread_id)
        .bind(&record.pipeline_name)
        .bind(&record.action)
        .bind(record.status.as_str())
        .bind(Self::to_naive(record.started_at))
        .bind(record.completed_at.map(Self::to_naive))
        .bind(output)
        .bind(&record.error)
        .execute(&self.pool)
        .await
        .context("Failed to save execution")?;

        Ok(())
    }

    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionRecord>> {
        let row = sqlx::query(&format!("SELECT {} FROM executions WHERE id = ?1", COLUMNS))
            .bind(execution_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load execution")?;

        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn list_executions(&self, pipeline_name: &str) -> Result<Vec<ExecutionRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM executions WHERE pipeline_name = ?1 ORDER BY started_at DESC",
            COLUMNS
        ))
        .bind(pipeline_name)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list executions")?;

        Self::records(&rows)
    }

    async fn list_thread(&self, thread_id: &str) -> Result<Vec<ExecutionRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM executions WHERE thread_id = ?1 ORDER BY started_at DESC",
            COLUMNS
        ))
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list thread executions")?;

        Self::records(&rows)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ExecutionRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM executions ORDER BY started_at DESC LIMIT ?1",
            COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list recent executions")?;

        Self::records(&rows)
    }

    async fn latest_for_thread(&self, thread_id: &str) -> Result<Option<ExecutionRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM executions WHERE thread_id = ?1 AND status = ?2 \
             ORDER BY started_at DESC LIMIT 1",
            COLUMNS
        ))
        .bind(thread_id)
        .bind(ExecutionStatus::Completed.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load thread checkpoint")?;

        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT pipeline_name
            FROM executions
            ORDER BY pipeline_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list pipelines")?;

        Ok(rows.iter().map(|row| row.get("pipeline_name")).collect())
    }
}
