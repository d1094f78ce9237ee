//! HTTP implementations of the service collaborators
//!
//! Each service is a JSON endpoint under its configured base URL. A
//! service without a URL answers every call with `ToolError::Unsupported`.

use crate::core::config::ServicesConfig;
use crate::core::ToolError;
use crate::services::{DataSource, Document, DocumentLoader, ImageGenerator, ObjectStore, Retriever, Transcriber};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HttpServices {
    config: ServicesConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    documents: Vec<Document>,
}

#[derive(Debug, Deserialize)]
struct TextResponse {
    text: String,
}

/// Envelope of the data service: `code < 0` carries a user-facing message
#[derive(Debug, Deserialize)]
struct DataResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct StoredResponse {
    url: String,
}

impl HttpServices {
    pub fn from_config(config: &ServicesConfig) -> Result<Self, ToolError> {
        let timeout = Duration::from_secs(config.timeout_secs.unwrap_or(60));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ToolError::Network(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            config: config.clone(),
            client,
        })
    }

    fn endpoint(base: &Option<String>, service: &str, path: &str) -> Result<String, ToolError> {
        let base = base
            .as_deref()
            .ok_or_else(|| ToolError::Unsupported(format!("{} service is not configured", service)))?;
        Ok(format!("{}/{}", base.trim_end_matches('/'), path))
    }

    async fn post_json<T: DeserializeOwned>(&self, url: String, body: Value) -> Result<T, ToolError> {
        debug!("POST {}", url);
        let response = self.client.post(&url).json(&body).send().await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ToolError> {
    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ToolError::NotFound(response.url().to_string()));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ToolError::status(status.as_u16(), body));
    }
    response
        .json()
        .await
        .map_err(|e| ToolError::MalformedOutput(e.to_string()))
}

/// Whether `url` names a PDF, ignoring any query string or fragment
pub fn is_pdf_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.to_ascii_lowercase().ends_with(".pdf")
}

#[async_trait]
impl Retriever for HttpServices {
    async fn search(&self, collection: &str, query: &str, limit: usize) -> Result<Vec<Document>, ToolError> {
        let url = Self::endpoint(&self.config.retrieval_url, "retrieval", "search")?;
        let response: SearchResponse = self
            .post_json(url, json!({"collection": collection, "query": query, "limit": limit}))
            .await?;
        Ok(response.documents)
    }
}

#[async_trait]
impl DocumentLoader for HttpServices {
    async fn load_text(&self, url: &str) -> Result<String, ToolError> {
        if !is_pdf_url(url) {
            return Err(ToolError::Unsupported(format!("'{}' is not a PDF file", url)));
        }
        let endpoint = Self::endpoint(&self.config.document_url, "document", "extract")?;
        let response: TextResponse = self.post_json(endpoint, json!({"url": url})).await?;
        Ok(response.text)
    }
}

#[async_trait]
impl Transcriber for HttpServices {
    async fn transcribe(&self, url: &str) -> Result<String, ToolError> {
        let endpoint = Self::endpoint(&self.config.transcription_url, "transcription", "transcribe")?;
        let response: TextResponse = self.post_json(endpoint, json!({"url": url})).await?;
        Ok(response.text)
    }
}

#[async_trait]
impl DataSource for HttpServices {
    async fn query(&self, dataset: &str, params: Value) -> Result<Vec<Value>, ToolError> {
        let url = Self::endpoint(&self.config.data_url, "data", "query")?;
        let response: DataResponse = self
            .post_json(url, json!({"dataset": dataset, "params": params}))
            .await?;
        if response.code < 0 {
            return Err(ToolError::InvalidArguments(
                response.msg.unwrap_or_else(|| "query rejected".to_string()),
            ));
        }
        Ok(response.data)
    }
}

#[async_trait]
impl ImageGenerator for HttpServices {
    async fn generate(&self, prompt: &str, count: u32, size: &str) -> Result<Vec<String>, ToolError> {
        let url = Self::endpoint(&self.config.image_url, "image", "generate")?;
        let response: ImageResponse = self
            .post_json(url, json!({"prompt": prompt, "n": count, "size": size}))
            .await?;
        Ok(response.urls)
    }
}

#[async_trait]
impl ObjectStore for HttpServices {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<String, ToolError> {
        let url = Self::endpoint(&self.config.storage_url, "storage", key)?;
        debug!("PUT {}", url);
        let response = self
            .client
            .put(&url)
            .header("Content-Type", content_type)
            .body(body)
            .send()
            .await?;
        let stored: StoredResponse = decode(response).await?;
        Ok(stored.url)
    }
}
