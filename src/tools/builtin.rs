//! Compiled tool implementations

use crate::core::{Pipeline, State, StepContext, StepError, ToolError};
use crate::model::ToolSpec;
use crate::services::{DataSource, Retriever};
use crate::tools::{str_arg, Tool, ToolKind};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Policy question answered from a retrieval collection
pub struct PolicySearch {
    kind: ToolKind,
    retriever: Arc<dyn Retriever>,
    collection: String,
    limit: usize,
}

impl PolicySearch {
    pub fn new(kind: ToolKind, retriever: Arc<dyn Retriever>, collection: String, limit: usize) -> Self {
        Self {
            kind,
            retriever,
            collection,
            limit: limit.max(1),
        }
    }

    fn topic(&self) -> &'static str {
        match self.kind {
            ToolKind::FinancePolicySearch => "finance",
            _ => "HR",
        }
    }
}

#[async_trait]
impl Tool for PolicySearch {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.kind.name().to_string(),
            description: format!(
                "Search company {} policies. Use for any question about {} rules and procedures.",
                self.topic(),
                self.topic()
            ),
            parameters: json!({
                "type": "object",
                "properties": {"query": {"type": "string", "description": "The policy question"}},
                "required": ["query"]
            }),
        }
    }

    async fn invoke(&self, args: &Value, _ctx: &StepContext) -> Result<String, StepError> {
        let query = str_arg(args, "query")?;
        let documents = self.retriever.search(&self.collection, query, self.limit).await?;
        debug!("{} returned {} passages", self.kind.name(), documents.len());

        if documents.is_empty() {
            return Ok(format!("Sorry, no {} policy matched the question.", self.topic()));
        }

        let cite = self.kind == ToolKind::FinancePolicySearch;
        let passages: Vec<String> = documents
            .iter()
            .map(|doc| {
                if cite {
                    format!("{}\n[source: {}]", doc.content, doc.id)
                } else {
                    doc.content.clone()
                }
            })
            .collect();
        Ok(passages.join("\n\n"))
    }
}

/// Employee directory lookups against the data service
pub struct EmployeeLookup {
    kind: ToolKind,
    data: Arc<dyn DataSource>,
    dataset: String,
}

impl EmployeeLookup {
    pub fn new(kind: ToolKind, data: Arc<dyn DataSource>, dataset: String) -> Self {
        Self { kind, data, dataset }
    }
}

fn render_rows(rows: &[Value]) -> String {
    rows.iter()
        .map(|row| match row {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl Tool for EmployeeLookup {
    fn spec(&self) -> ToolSpec {
        let (description, parameters) = match self.kind {
            ToolKind::PositionLookup => (
                "Look up the position of an employee by name",
                json!({
                    "type": "object",
                    "properties": {"name": {"type": "string"}},
                    "required": ["name"]
                }),
            ),
            ToolKind::DepartmentHeadLookup => (
                "Look up who heads a department",
                json!({
                    "type": "object",
                    "properties": {"department": {"type": "string"}},
                    "required": ["department"]
                }),
            ),
            _ => (
                "List employees with invalid attendance records",
                json!({"type": "object", "properties": {}}),
            ),
        };
        ToolSpec {
            name: self.kind.name().to_string(),
            description: description.to_string(),
            parameters,
        }
    }

    async fn invoke(&self, args: &Value, ctx: &StepContext) -> Result<String, StepError> {
        let (params, subject) = match self.kind {
            ToolKind::PositionLookup => {
                let name = str_arg(args, "name")?;
                (json!({"name": name}), format!("the position of {}", name))
            }
            ToolKind::DepartmentHeadLookup => {
                let department = str_arg(args, "department")?;
                (
                    json!({"department": department}),
                    format!("the head of {}", department),
                )
            }
            _ => (
                json!({"user_id": ctx.config().user_id}),
                "invalid attendance records".to_string(),
            ),
        };

        let rows = self.data.query(&self.dataset, params).await?;
        if rows.is_empty() {
            Ok(format!("Sorry, no information found for {}.", subject))
        } else {
            Ok(format!("Found {}: {}", subject, render_rows(&rows)))
        }
    }
}

/// Runs the contract review pipeline as a tool
pub struct ReviewContractTool {
    pipeline: Arc<Pipeline>,
}

impl ReviewContractTool {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl Tool for ReviewContractTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: ToolKind::ReviewContract.name().to_string(),
            description: "Review a contract file (PDF URL) for legal risks".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "contract_file_path": {"type": "string", "description": "URL of the contract PDF"},
                    "analysis_angle": {"type": "string", "description": "Perspective of the review, e.g. buyer or seller"}
                },
                "required": ["contract_file_path"]
            }),
        }
    }

    async fn invoke(&self, args: &Value, ctx: &StepContext) -> Result<String, StepError> {
        let path = str_arg(args, "contract_file_path")?;
        let mut input = State::new().with("contract_file_path", path);
        if let Some(angle) = args.get("analysis_angle").and_then(Value::as_str) {
            input = input.with("analysis_angle", angle);
        }

        let output = ctx.run_pipeline(&self.pipeline, input).await?;
        output
            .get_str("risk_analysis_result")
            .map(str::to_string)
            .ok_or_else(|| {
                ToolError::MalformedOutput("contract review produced no result".to_string()).into()
            })
    }
}
