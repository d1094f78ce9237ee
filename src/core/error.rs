//! Error taxonomy for pipeline construction and execution

use std::time::Duration;
use thiserror::Error;

/// Errors raised while executing a pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input or update does not fit the pipeline's state schema
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    /// A routing decision selected a target outside its declared candidate set
    #[error("routing error at '{step}': '{selected}' is not one of [{}]", .candidates.join(", "))]
    Routing {
        step: String,
        selected: String,
        candidates: Vec<String>,
    },

    /// The top-level router received an action it has no pipeline for
    #[error("unsupported request: unknown action '{action}'")]
    UnknownAction { action: String, known: Vec<String> },

    /// A step failed and had no fallback to absorb the failure
    #[error("step '{step}' failed: {cause}")]
    StepFailure {
        step: String,
        #[source]
        cause: StepError,
    },

    #[error("execution cancelled before step '{before}'")]
    Cancelled { before: String },

    #[error("execution exceeded its deadline of {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Build(#[from] BuildError),
}

impl PipelineError {
    /// Short user-facing message, used where the caller shows errors to end users
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::UnknownAction { .. } => "unsupported request".to_string(),
            PipelineError::Cancelled { .. } => "request cancelled".to_string(),
            PipelineError::Timeout(_) => "request timed out, please try again later".to_string(),
            other => other.to_string(),
        }
    }
}

/// Failure of an individual step
#[derive(Debug, Error)]
pub enum StepError {
    /// An external collaborator call failed
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// The working state does not hold what the step needs
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A nested execution (fan-out member, delegated pipeline) failed.
    /// The engine surfaces the inner error unchanged.
    #[error(transparent)]
    Pipeline(Box<PipelineError>),
}

impl From<PipelineError> for StepError {
    fn from(err: PipelineError) -> Self {
        StepError::Pipeline(Box::new(err))
    }
}

/// Failure of an external collaborator (model, retrieval, data lookup, storage)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Collaborator answered, but not in the expected shape
    #[error("malformed output: {0}")]
    MalformedOutput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported input: {0}")]
    Unsupported(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

impl ToolError {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        ToolError::Status {
            status,
            body: body.into(),
        }
    }

    /// Whether a retry policy may try the call again
    pub fn is_retryable(&self) -> bool {
        match self {
            ToolError::Network(_) | ToolError::Timeout(_) => true,
            ToolError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ToolError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ToolError::MalformedOutput(err.to_string())
        } else if let Some(status) = err.status() {
            ToolError::status(status.as_u16(), err.to_string())
        } else {
            ToolError::Network(err.to_string())
        }
    }
}

/// Graph validation failures, reported by `PipelineBuilder::build`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("pipeline '{0}' has no entry step")]
    MissingEntry(String),

    #[error("duplicate step '{0}'")]
    DuplicateStep(String),

    #[error("'{0}' is a reserved step name")]
    ReservedName(String),

    #[error("edge from '{from}' references unknown step '{to}'")]
    UnknownStep { from: String, to: String },

    #[error("step '{0}' has no outgoing edge")]
    NoSuccessor(String),

    #[error("step '{0}' already has an outgoing edge")]
    DuplicateEdge(String),

    #[error("step '{0}' declares an empty candidate set")]
    EmptyCandidates(String),

    #[error("cycle detected through step '{0}'")]
    Cycle(String),
}
