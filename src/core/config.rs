//! Application configuration from YAML

use crate::core::schema::Strictness;
use crate::tools::ToolKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Assistant actions whose configuration lives under `assistants`
pub const ASSISTANT_ACTIONS: [&str; 3] = ["hr_agent", "financial_agent", "corporate_legal_agent"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("unknown assistant '{0}' (expected one of hr_agent, financial_agent, corporate_legal_agent)")]
    UnknownAssistant(String),

    #[error("assistant '{assistant}' lists tool '{tool}' more than once")]
    DuplicateTool { assistant: String, tool: String },

    #[error("receipt category '{0}' is defined more than once")]
    DuplicateCategory(String),
}

/// Top-level configuration loaded from YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelConfig,

    /// Model used for image inputs; falls back to `model`
    #[serde(default)]
    pub vision_model: Option<ModelConfig>,

    #[serde(default)]
    pub services: ServicesConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default = "default_assistants")]
    pub assistants: BTreeMap<String, AssistantConfig>,

    #[serde(default)]
    pub receipts: ReceiptConfig,

    #[serde(default)]
    pub history: HistoryConfig,
}

/// OpenAI-compatible chat model endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub base_url: String,

    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    #[serde(default = "default_true")]
    pub jitter: bool,
}

/// Base URLs of the external collaborators
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default)]
    pub retrieval_url: Option<String>,

    #[serde(default)]
    pub data_url: Option<String>,

    #[serde(default)]
    pub document_url: Option<String>,

    #[serde(default)]
    pub transcription_url: Option<String>,

    #[serde(default)]
    pub image_url: Option<String>,

    #[serde(default)]
    pub storage_url: Option<String>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub strictness: Strictness,

    #[serde(default)]
    pub fan_out_limit: Option<usize>,

    /// Advisory deadline per execution, in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Extra system instructions appended to the built-in ones
    #[serde(default)]
    pub instructions: Option<String>,

    #[serde(default)]
    pub tools: Vec<ToolConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    pub kind: ToolKind,

    /// Retrieval collection or data set; each kind has a default
    #[serde(default)]
    pub source: Option<String>,

    #[serde(default)]
    pub limit: Option<usize>,
}

impl ToolConfig {
    pub fn new(kind: ToolKind) -> Self {
        Self {
            kind,
            source: None,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptConfig {
    #[serde(default = "default_receipt_categories")]
    pub categories: Vec<ReceiptCategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptCategory {
    pub name: String,

    /// Visual features the categorizer looks for
    pub feature: String,

    #[serde(default)]
    pub rules: Vec<String>,

    /// Output key to human label
    #[serde(default)]
    pub output_format: BTreeMap<String, String>,

    /// Markdown sample used when rendering the text output
    #[serde(default)]
    pub finalize_example: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub database: Option<PathBuf>,
}

fn default_api_key_env() -> String {
    "BIZFLOW_API_KEY".to_string()
}

fn default_model_timeout() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    2
}

fn default_initial_delay() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_assistants() -> BTreeMap<String, AssistantConfig> {
    let assistant = |kinds: &[ToolKind]| AssistantConfig {
        instructions: None,
        tools: kinds.iter().copied().map(ToolConfig::new).collect(),
    };
    BTreeMap::from([
        (
            "hr_agent".to_string(),
            assistant(&[
                ToolKind::HrPolicySearch,
                ToolKind::PositionLookup,
                ToolKind::DepartmentHeadLookup,
                ToolKind::InvalidAttendanceLookup,
            ]),
        ),
        (
            "financial_agent".to_string(),
            assistant(&[ToolKind::FinancePolicySearch]),
        ),
        (
            "corporate_legal_agent".to_string(),
            assistant(&[ToolKind::ReviewContract]),
        ),
    ])
}

fn default_receipt_categories() -> Vec<ReceiptCategory> {
    vec![
        ReceiptCategory {
            name: "air_transport_receipt".to_string(),
            feature: "Electronic air ticket itinerary with serial number, passenger name, ID number, carrier, flight number, seat class, date and time".to_string(),
            rules: vec![
                "For fare, development fund and total: remove any currency prefix and spaces, keep the original digits".to_string(),
                "For all amounts: keep only digits and the decimal point".to_string(),
            ],
            output_format: BTreeMap::from([
                ("serial_number".to_string(), "Serial number".to_string()),
                ("passenger_name".to_string(), "Passenger name".to_string()),
                ("carrier".to_string(), "Carrier".to_string()),
                ("flight_number".to_string(), "Flight number".to_string()),
                ("date".to_string(), "Date".to_string()),
                ("total".to_string(), "Total".to_string()),
            ]),
            finalize_example: None,
        },
        ReceiptCategory {
            name: "taxi_receipt".to_string(),
            feature: "Printed taxi receipt with plate number, pick-up and drop-off time, distance and fare".to_string(),
            rules: vec!["For all amounts: keep only digits and the decimal point".to_string()],
            output_format: BTreeMap::from([
                ("plate_number".to_string(), "Plate number".to_string()),
                ("date".to_string(), "Date".to_string()),
                ("distance".to_string(), "Distance".to_string()),
                ("total".to_string(), "Total".to_string()),
            ]),
            finalize_example: None,
        },
    ]
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: default_api_key_env(),
            temperature: None,
            timeout_secs: default_model_timeout(),
            retry: RetrySettings::default(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            jitter: true,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strictness: Strictness::Lenient,
            fan_out_limit: Some(4),
            timeout_secs: None,
        }
    }
}

impl Default for ReceiptConfig {
    fn default() -> Self {
        Self {
            categories: default_receipt_categories(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            vision_model: None,
            services: ServicesConfig::default(),
            engine: EngineConfig::default(),
            assistants: default_assistants(),
            receipts: ReceiptConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

impl ModelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// API key from the configured environment variable, if set
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty())
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(yaml).context("Failed to parse config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn vision_model(&self) -> &ModelConfig {
        self.vision_model.as_ref().unwrap_or(&self.model)
    }

    pub fn assistant(&self, action: &str) -> Option<&AssistantConfig> {
        self.assistants.get(action)
    }

    pub fn receipt_category(&self, name: &str) -> Option<&ReceiptCategory> {
        self.receipts.categories.iter().find(|c| c.name == name)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for model in std::iter::once(&self.model).chain(self.vision_model.iter()) {
            if model.base_url.trim().is_empty() {
                return Err(ConfigError::Invalid("model base_url is empty".to_string()));
            }
            if model.model.trim().is_empty() {
                return Err(ConfigError::Invalid("model name is empty".to_string()));
            }
        }

        if self.engine.fan_out_limit == Some(0) {
            return Err(ConfigError::Invalid(
                "engine.fan_out_limit must be at least 1".to_string(),
            ));
        }

        for (action, assistant) in &self.assistants {
            if !ASSISTANT_ACTIONS.contains(&action.as_str()) {
                return Err(ConfigError::UnknownAssistant(action.clone()));
            }
            let mut seen = HashSet::new();
            for tool in &assistant.tools {
                if !seen.insert(tool.kind) {
                    return Err(ConfigError::DuplicateTool {
                        assistant: action.clone(),
                        tool: tool.kind.name().to_string(),
                    });
                }
            }
        }

        let mut categories = HashSet::new();
        for category in &self.receipts.categories {
            if category.name.trim().is_empty() {
                return Err(ConfigError::Invalid("receipt category without a name".to_string()));
            }
            if !categories.insert(category.name.as_str()) {
                return Err(ConfigError::DuplicateCategory(category.name.clone()));
            }
        }

        Ok(())
    }
}
