//! Execution engine, fan-out, parallel branches, events and cancellation

pub mod cancel;
pub mod engine;
pub mod events;
pub mod fanout;
pub mod parallel;

pub use cancel::CancellationToken;
pub use engine::{EngineOptions, ExecutionEngine, RunContext};
pub use events::{channel_handler, EventEmitter, EventHandler, ExecutionEvent, Phase, ProgressEvent, RecordStyle};
pub use fanout::FanOut;
pub use parallel::Parallel;
