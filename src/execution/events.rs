//! Execution events and the best-effort progress side channel

use crate::core::ExecutionStatus;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Start,
    End,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Start => "start",
            Phase::End => "end",
        }
    }
}

/// Wire shape of a progress record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStyle {
    /// `{"action": ..., "phase": ...}`
    Action,
    /// `{"action": {"type": ..., "state": ...}}`
    Typed,
}

/// Step-level progress notification for streaming consumers
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub action: String,
    pub phase: Phase,
    pub style: RecordStyle,
    pub detail: Option<String>,
}

impl ProgressEvent {
    pub fn new(action: impl Into<String>, phase: Phase) -> Self {
        Self {
            action: action.into(),
            phase,
            style: RecordStyle::Action,
            detail: None,
        }
    }

    pub fn typed(kind: impl Into<String>, phase: Phase) -> Self {
        Self {
            style: RecordStyle::Typed,
            ..Self::new(kind, phase)
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn to_record(&self) -> Value {
        let mut record = match self.style {
            RecordStyle::Action => json!({"action": self.action, "phase": self.phase.as_str()}),
            RecordStyle::Typed => json!({"type": self.action, "state": self.phase.as_str()}),
        };
        if let (Some(detail), Some(obj)) = (&self.detail, record.as_object_mut()) {
            obj.insert("detail".to_string(), Value::String(detail.clone()));
        }
        match self.style {
            RecordStyle::Action => record,
            RecordStyle::Typed => json!({ "action": record }),
        }
    }
}

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        pipeline_name: String,
    },
    StepStarted {
        execution_id: Uuid,
        step: String,
    },
    StepCompleted {
        execution_id: Uuid,
        step: String,
        next_step: String,
    },
    StepFailed {
        execution_id: Uuid,
        step: String,
        error: String,
    },
    FanOutStarted {
        execution_id: Uuid,
        step: String,
        items: usize,
    },
    Progress {
        execution_id: Uuid,
        event: ProgressEvent,
    },
    PipelineCompleted {
        execution_id: Uuid,
        pipeline_name: String,
        status: ExecutionStatus,
    },
}

impl ExecutionEvent {
    pub fn execution_id(&self) -> Uuid {
        match self {
            ExecutionEvent::PipelineStarted { execution_id, .. }
            | ExecutionEvent::StepStarted { execution_id, .. }
            | ExecutionEvent::StepCompleted { execution_id, .. }
            | ExecutionEvent::StepFailed { execution_id, .. }
            | ExecutionEvent::FanOutStarted { execution_id, .. }
            | ExecutionEvent::Progress { execution_id, .. }
            | ExecutionEvent::PipelineCompleted { execution_id, .. } => *execution_id,
        }
    }
}

/// Type for event handlers. Handlers run inline and must not block.
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Handler forwarding events into an unbounded channel.
///
/// Sending never blocks; once the receiver is dropped events are discarded.
pub fn channel_handler() -> (EventHandler, mpsc::UnboundedReceiver<ExecutionEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler: EventHandler = Arc::new(move |event| {
        let _ = tx.send(event);
    });
    (handler, rx)
}

/// Fans one event out to every registered handler
#[derive(Clone, Default)]
pub struct EventEmitter {
    handlers: Arc<Vec<EventHandler>>,
}

impl EventEmitter {
    pub fn new(handlers: Vec<EventHandler>) -> Self {
        Self {
            handlers: Arc::new(handlers),
        }
    }

    pub fn emit(&self, event: ExecutionEvent) {
        trace!(?event, "emit");
        for handler in self.handlers.iter() {
            handler(event.clone());
        }
    }

    pub fn has_handlers(&self) -> bool {
        !self.handlers.is_empty()
    }
}
