//! Business pipelines built on the engine, and the catalog that names them

pub mod assistant;
pub mod contract_review;
pub mod employment_review;
pub mod financial_data;
pub mod image;
pub mod interview_plan;
pub mod meeting_summary;
pub mod prompts;
pub mod receipt;
pub mod recruitment;
pub mod resume;
pub mod supporter;

use crate::core::config::AppConfig;
use crate::core::{BuildError, Pipeline, State, StepError, ToolError};
use crate::services::Deps;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use tracing::debug;

/// Every named pipeline, including the top-level router
#[derive(Debug, Clone)]
pub struct Catalog {
    pipelines: BTreeMap<String, Arc<Pipeline>>,
}

impl Catalog {
    /// Build and validate every pipeline. Any graph error aborts the whole catalog.
    pub fn build(config: &AppConfig, deps: &Deps) -> Result<Self, BuildError> {
        let mut pipelines = BTreeMap::new();
        let mut add = |pipeline: Pipeline| {
            let pipeline = Arc::new(pipeline);
            pipelines.insert(pipeline.name().to_string(), pipeline.clone());
            pipeline
        };

        add(contract_review::build(deps)?);
        add(employment_review::build(deps)?);
        add(resume::build(deps)?);
        add(recruitment::build(deps)?);
        add(interview_plan::build(deps)?);
        let receipt = add(receipt::build(deps, &config.receipts.categories)?);
        let image = add(image::build(deps)?);
        let financial_data = add(financial_data::build(deps)?);
        let meeting = add(meeting_summary::build(deps)?);

        let mut assistants = Vec::new();
        for action in crate::core::config::ASSISTANT_ACTIONS {
            let settings = config.assistant(action).cloned().unwrap_or_default();
            assistants.push(add(assistant::build(action, &settings, deps)?));
        }

        let routes = supporter::Routes {
            assistants,
            receipt,
            image,
            financial_data,
            meeting,
        };
        add(supporter::build(routes)?);

        debug!("Built {} pipelines", pipelines.len());
        Ok(Self { pipelines })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Pipeline>> {
        self.pipelines.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.pipelines.keys().map(String::as_str)
    }

    pub fn pipelines(&self) -> impl Iterator<Item = &Arc<Pipeline>> {
        self.pipelines.values()
    }

    /// The router that dispatches on `action`
    pub fn supporter(&self) -> Option<&Arc<Pipeline>> {
        self.get(supporter::NAME)
    }
}

static JSON_FENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)^\s*```(?:json)?[ \t]*\n?(.*?)\n?\s*```\s*$").ok());

/// Strip a surrounding ```json fence, if any
pub fn strip_json_fence(text: &str) -> &str {
    let inner = JSON_FENCE
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|c| c.get(1));
    match inner {
        Some(inner) => inner.as_str().trim(),
        None => text.trim(),
    }
}

/// Parse a model reply that must be JSON
pub fn parse_json_reply(text: &str) -> Result<Value, ToolError> {
    serde_json::from_str(strip_json_fence(text)).map_err(|e| {
        ToolError::MalformedOutput(format!("expected JSON from the model: {}", e))
    })
}

/// A text field the pipeline schema makes mandatory
pub(crate) fn require_str<'a>(state: &'a State, key: &str) -> Result<&'a str, StepError> {
    state
        .get_str(key)
        .ok_or_else(|| StepError::InvalidState(format!("missing text field '{}'", key)))
}
