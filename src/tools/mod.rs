//! Tools offered to assistant models
//!
//! Tools are a closed set of compiled kinds. Configuration selects them by
//! name; nothing is synthesized at runtime.

pub mod builtin;

use crate::core::config::ToolConfig;
use crate::core::{BuildError, StepContext, StepError, ToolError};
use crate::model::ToolSpec;
use crate::services::Deps;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub use builtin::{EmployeeLookup, PolicySearch, ReviewContractTool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    HrPolicySearch,
    FinancePolicySearch,
    PositionLookup,
    DepartmentHeadLookup,
    InvalidAttendanceLookup,
    ReviewContract,
}

impl ToolKind {
    pub const ALL: [ToolKind; 6] = [
        ToolKind::HrPolicySearch,
        ToolKind::FinancePolicySearch,
        ToolKind::PositionLookup,
        ToolKind::DepartmentHeadLookup,
        ToolKind::InvalidAttendanceLookup,
        ToolKind::ReviewContract,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::HrPolicySearch => "hr_policy_search",
            ToolKind::FinancePolicySearch => "finance_policy_search",
            ToolKind::PositionLookup => "position_lookup",
            ToolKind::DepartmentHeadLookup => "department_head_lookup",
            ToolKind::InvalidAttendanceLookup => "invalid_attendance_lookup",
            ToolKind::ReviewContract => "review_contract",
        }
    }

    /// Retrieval collection or data set used when the config names none
    pub fn default_source(&self) -> &'static str {
        match self {
            ToolKind::HrPolicySearch => "hr_policies",
            ToolKind::FinancePolicySearch => "finance_policies",
            ToolKind::PositionLookup => "employee_positions",
            ToolKind::DepartmentHeadLookup => "department_heads",
            ToolKind::InvalidAttendanceLookup => "invalid_attendance",
            ToolKind::ReviewContract => "contract_review",
        }
    }
}

/// A callable tool.
///
/// Collaborator failures are returned as `StepError::Tool`; callers may turn
/// them into a tool message for the model. Other errors abort the execution.
#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;

    async fn invoke(&self, args: &Value, ctx: &StepContext) -> Result<String, StepError>;
}

/// Tools selected for one assistant
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Instantiate the configured tool kinds against `deps`
    pub fn from_config(configs: &[ToolConfig], deps: &Deps) -> Result<Self, BuildError> {
        let mut registry = Self::new();
        for config in configs {
            let source = config
                .source
                .clone()
                .unwrap_or_else(|| config.kind.default_source().to_string());
            let tool: Arc<dyn Tool> = match config.kind {
                ToolKind::HrPolicySearch | ToolKind::FinancePolicySearch => Arc::new(PolicySearch::new(
                    config.kind,
                    deps.retriever.clone(),
                    source,
                    config.limit.unwrap_or(3),
                )),
                ToolKind::PositionLookup
                | ToolKind::DepartmentHeadLookup
                | ToolKind::InvalidAttendanceLookup => {
                    Arc::new(EmployeeLookup::new(config.kind, deps.data.clone(), source))
                }
                ToolKind::ReviewContract => Arc::new(ReviewContractTool::new(Arc::new(
                    crate::workflows::contract_review::build(deps)?,
                ))),
            };
            registry = registry.register(tool);
        }
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.spec().name == name)
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

/// Required string argument
pub(crate) fn str_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing string argument '{}'", key)))
}
