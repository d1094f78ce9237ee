//! bizflow - request routing and workflow orchestration for business-process assistants

pub mod cli;
pub mod core;
pub mod execution;
pub mod model;
pub mod persistence;
pub mod router;
pub mod services;
pub mod tools;
pub mod workflows;

// Re-export commonly used types
pub use core::{Pipeline, PipelineError, State, StateSchema, StateUpdate, Step, StepContext, StepOutcome, END};
pub use core::{ExecutionStatus, RunConfig};
pub use execution::{CancellationToken, EngineOptions, ExecutionEngine, ExecutionEvent, RunContext};
pub use router::{Route, Router};
pub use services::Deps;
pub use workflows::Catalog;
