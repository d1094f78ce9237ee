//! Language-model collaborator: request/reply types and client implementations

pub mod client;
pub mod response;
pub mod retry;

use crate::core::{Message, ToolError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use client::HttpModelClient;
pub use response::ModelReply;
pub use retry::{RetryPolicy, RetryingModel};

/// Tool description offered to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub temperature: Option<f32>,
    /// Ask the model for a JSON object
    pub json_output: bool,
}

impl ModelRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn system(self, content: impl Into<String>) -> Self {
        self.message(Message::system(content))
    }

    pub fn user(self, content: impl Into<String>) -> Self {
        self.message(Message::user(content))
    }

    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    pub fn tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn json_output(mut self) -> Self {
        self.json_output = true;
        self
    }
}

/// Trait for model invocation - allows for different implementations
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn invoke(&self, request: ModelRequest) -> Result<ModelReply, ToolError>;
}

impl dyn ModelClient {
    /// Single-turn completion returning the reply text
    pub async fn complete(&self, system: &str, user: &str) -> Result<String, ToolError> {
        let request = ModelRequest::new().system(system).user(user);
        Ok(self.invoke(request).await?.into_text())
    }
}
