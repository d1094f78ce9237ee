//! Core domain models
//!
//! This module defines the state container and its schema, steps, the
//! pipeline graph, errors, and configuration.

pub mod config;
pub mod context;
pub mod error;
pub mod message;
pub mod pipeline;
pub mod schema;
pub mod state;
pub mod step;

pub use context::{RunConfig, StepContext};
pub use error::{BuildError, PipelineError, StepError, ToolError};
pub use message::{Message, Role, ToolCall};
pub use pipeline::{Edge, Pipeline, PipelineBuilder, END};
pub use schema::{FieldKind, FieldSpec, InputRole, MergePolicy, StateSchema, Strictness};
pub use state::{ExecutionStatus, State, StateUpdate};
pub use step::{from_async_fn, from_fn, Fallback, Step, StepExt, StepOutcome};
