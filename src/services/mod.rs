//! External collaborators the pipelines depend on, and the `Deps` bundle
//! that injects them.

pub mod http;

use crate::core::config::AppConfig;
use crate::core::ToolError;
use crate::model::{HttpModelClient, ModelClient, RetryPolicy, RetryingModel};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub use http::HttpServices;

/// A retrieved passage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub score: f64,
}

/// Vector/keyword retrieval
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(&self, collection: &str, query: &str, limit: usize) -> Result<Vec<Document>, ToolError>;
}

/// Document-to-text extraction
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Text of the PDF at `url`. Non-PDF inputs are `ToolError::Unsupported`.
    async fn load_text(&self, url: &str) -> Result<String, ToolError>;
}

/// Audio-to-text
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, url: &str) -> Result<String, ToolError>;
}

/// Relational/data lookups. An empty result is `Ok(vec![])`, not an error.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn query(&self, dataset: &str, params: Value) -> Result<Vec<Value>, ToolError>;
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// URLs of `count` generated images
    async fn generate(&self, prompt: &str, count: u32, size: &str) -> Result<Vec<String>, ToolError>;
}

/// Object storage for generated artifacts
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key` and return its public URL
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<String, ToolError>;
}

/// Collaborators injected into pipeline builders. Built once by the host.
#[derive(Clone)]
pub struct Deps {
    pub model: Arc<dyn ModelClient>,
    /// Model used for image inputs
    pub vision_model: Arc<dyn ModelClient>,
    pub retriever: Arc<dyn Retriever>,
    pub documents: Arc<dyn DocumentLoader>,
    pub transcriber: Arc<dyn Transcriber>,
    pub data: Arc<dyn DataSource>,
    pub images: Arc<dyn ImageGenerator>,
    pub storage: Arc<dyn ObjectStore>,
}

impl Deps {
    /// HTTP-backed collaborators from configuration. Model clients are
    /// wrapped in the configured retry policy.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let model = retrying(
            HttpModelClient::from_config(&config.model).context("Failed to create model client")?,
            RetryPolicy::from_settings(&config.model.retry),
        );
        let vision = config.vision_model();
        let vision_model = retrying(
            HttpModelClient::from_config(vision).context("Failed to create vision model client")?,
            RetryPolicy::from_settings(&vision.retry),
        );
        let services = Arc::new(
            HttpServices::from_config(&config.services).context("Failed to create service clients")?,
        );

        Ok(Self {
            model,
            vision_model,
            retriever: services.clone(),
            documents: services.clone(),
            transcriber: services.clone(),
            data: services.clone(),
            images: services.clone(),
            storage: services,
        })
    }
}

fn retrying(client: HttpModelClient, policy: RetryPolicy) -> Arc<dyn ModelClient> {
    if policy.max_retries == 0 {
        Arc::new(client)
    } else {
        Arc::new(RetryingModel::new(Arc::new(client), policy))
    }
}
