//! Model reply types

use crate::core::{Message, ToolCall};

/// Tagged model reply. Routing decisions look at the tag, never at
/// runtime types or message classes.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// The model answered
    Final { content: String },
    /// The model asked for tools before answering
    ToolCalls {
        content: String,
        calls: Vec<ToolCall>,
    },
}

impl ModelReply {
    pub fn text(content: impl Into<String>) -> Self {
        ModelReply::Final {
            content: content.into(),
        }
    }

    pub fn content(&self) -> &str {
        match self {
            ModelReply::Final { content } | ModelReply::ToolCalls { content, .. } => content,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            ModelReply::Final { content } | ModelReply::ToolCalls { content, .. } => content,
        }
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            ModelReply::Final { .. } => &[],
            ModelReply::ToolCalls { calls, .. } => calls,
        }
    }

    /// Assistant message recording this reply in the conversation
    pub fn into_message(self) -> Message {
        match self {
            ModelReply::Final { content } => Message::assistant(content),
            ModelReply::ToolCalls { content, calls } => {
                Message::assistant(content).with_tool_calls(calls)
            }
        }
    }
}
