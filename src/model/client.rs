//! OpenAI-compatible HTTP model client

use crate::core::config::ModelConfig;
use crate::core::{Message, Role, ToolCall, ToolError};
use crate::model::{ModelClient, ModelReply, ModelRequest, ToolSpec};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::debug;

/// Chat-completions client for any OpenAI-compatible endpoint
#[derive(Debug, Clone)]
pub struct HttpModelClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: Option<f32>,
    timeout: Duration,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionSpec,
}

#[derive(Debug, Serialize)]
struct WireFunctionSpec {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// JSON-encoded arguments object
    #[serde(default)]
    arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

impl HttpModelClient {
    /// Create a client from config. The API key is read from the configured
    /// environment variable.
    pub fn from_config(config: &ModelConfig) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ToolError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_key: config.api_key(),
            temperature: config.temperature,
            timeout: config.timeout(),
            client,
        })
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn chat_completion_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_body(&self, request: ModelRequest) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: request.messages.into_iter().map(to_wire_message).collect(),
            tools: request.tools.into_iter().map(to_wire_tool).collect(),
            temperature: request.temperature.or(self.temperature),
            response_format: request
                .json_output
                .then(|| json!({"type": "json_object"})),
        }
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn to_wire_message(message: Message) -> WireMessage {
    let content = if message.images.is_empty() {
        Value::String(message.content)
    } else {
        let mut parts = vec![json!({"type": "text", "text": message.content})];
        parts.extend(
            message
                .images
                .into_iter()
                .map(|url| json!({"type": "image_url", "image_url": {"url": url}})),
        );
        Value::Array(parts)
    };

    WireMessage {
        role: role_name(message.role),
        content,
        tool_calls: message
            .tool_calls
            .into_iter()
            .map(|call| WireToolCall {
                id: call.id,
                kind: function_kind(),
                function: WireFunctionCall {
                    name: call.name,
                    arguments: call.arguments.to_string(),
                },
            })
            .collect(),
        tool_call_id: message.tool_call_id,
    }
}

fn to_wire_tool(spec: ToolSpec) -> WireTool {
    WireTool {
        kind: "function",
        function: WireFunctionSpec {
            name: spec.name,
            description: spec.description,
            parameters: spec.parameters,
        },
    }
}

fn reply_from_response(response: ChatCompletionResponse) -> Result<ModelReply, ToolError> {
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| ToolError::MalformedOutput("response has no choices".to_string()))?;

    let content = message.content.unwrap_or_default();
    if message.tool_calls.is_empty() {
        return Ok(ModelReply::Final { content });
    }

    let calls = message
        .tool_calls
        .into_iter()
        .map(|call| {
            let arguments = if call.function.arguments.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(&call.function.arguments).map_err(|e| {
                    ToolError::MalformedOutput(format!(
                        "arguments of '{}' are not JSON: {}",
                        call.function.name, e
                    ))
                })?
            };
            Ok(ToolCall {
                id: call.id,
                name: call.function.name,
                arguments,
            })
        })
        .collect::<Result<Vec<_>, ToolError>>()?;

    Ok(ModelReply::ToolCalls { content, calls })
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn invoke(&self, request: ModelRequest) -> Result<ModelReply, ToolError> {
        let start = Instant::now();
        let body = self.build_body(request);

        let mut http_request = self.client.post(self.chat_completion_url()).json(&body);
        if let Some(ref key) = self.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {}", key));
        }

        let response = match tokio::time::timeout(self.timeout, http_request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.is_timeout() => return Err(ToolError::Timeout(start.elapsed())),
            Ok(Err(e)) => return Err(ToolError::Network(format!("request failed: {}", e))),
            Err(_) => return Err(ToolError::Timeout(start.elapsed())),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::status(status.as_u16(), body));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ToolError::MalformedOutput(format!("failed to parse response: {}", e)))?;

        debug!(
            "Model {} answered in {:?}",
            self.model,
            start.elapsed()
        );
        reply_from_response(completion)
    }
}
