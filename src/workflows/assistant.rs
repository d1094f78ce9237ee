//! Tool-using assistants: `agent` ⇒ {`tools`, END}; `tools` → `respond` → END
//!
//! The model gets one round of tool calls. After the tool results are in the
//! conversation, `respond` asks for the final answer without offering tools,
//! which keeps the graph acyclic.

use crate::core::config::AssistantConfig;
use crate::core::{
    BuildError, FieldSpec, Message, Pipeline, RunConfig, State, StateSchema, StateUpdate, Step,
    StepContext, StepError, StepOutcome, END,
};
use crate::execution::Phase;
use crate::model::{ModelClient, ModelReply, ModelRequest};
use crate::services::Deps;
use crate::tools::ToolRegistry;
use crate::workflows::prompts;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

pub fn schema() -> StateSchema {
    StateSchema::new().field(FieldSpec::messages().output())
}

/// Build the assistant pipeline for `action`
pub fn build(action: &str, settings: &AssistantConfig, deps: &Deps) -> Result<Pipeline, BuildError> {
    let registry = Arc::new(ToolRegistry::from_config(&settings.tools, deps)?);
    let persona = Persona {
        action: action.to_string(),
        extra: settings.instructions.clone(),
    };

    Pipeline::builder(action, schema())
        .add_step(
            "agent",
            CallModel {
                model: deps.model.clone(),
                persona: persona.clone(),
                registry: registry.clone(),
            },
        )
        .add_step("tools", RunTools { registry })
        .add_step(
            "respond",
            Respond {
                model: deps.model.clone(),
                persona,
            },
        )
        .add_directive("agent", &["tools", END])
        .add_edge("tools", "respond")
        .add_edge("respond", END)
        .build()
}

#[derive(Clone)]
struct Persona {
    action: String,
    extra: Option<String>,
}

impl Persona {
    fn instructions(&self, config: &RunConfig) -> String {
        let title = config.user_title.as_deref();
        let base = match self.action.as_str() {
            "financial_agent" => prompts::finance_assistant(title),
            "corporate_legal_agent" => prompts::legal_assistant(title),
            _ => prompts::hr_assistant(title),
        };
        match &self.extra {
            Some(extra) => format!("{}\n\n{}", base, prompts::render_instructions(extra, title)),
            None => base,
        }
    }

    fn request(&self, state: &State, config: &RunConfig) -> ModelRequest {
        ModelRequest::new()
            .system(self.instructions(config))
            .messages(state.messages())
    }
}

struct CallModel {
    model: Arc<dyn ModelClient>,
    persona: Persona,
    registry: Arc<ToolRegistry>,
}

#[async_trait]
impl Step for CallModel {
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let mut request = self.persona.request(state, ctx.config());
        if !self.registry.is_empty() {
            request = request.tools(self.registry.specs());
        }

        let reply = self.model.invoke(request).await?;
        let next = match &reply {
            ModelReply::ToolCalls { calls, .. } if !calls.is_empty() => {
                debug!("{} requested {} tool calls", self.persona.action, calls.len());
                "tools"
            }
            _ => END,
        };
        Ok(StepOutcome::goto(
            next,
            StateUpdate::new().message(reply.into_message()),
        ))
    }
}

struct RunTools {
    registry: Arc<ToolRegistry>,
}

#[async_trait]
impl Step for RunTools {
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let calls = state
            .last_message()
            .map(|m| m.tool_calls)
            .unwrap_or_default();

        let mut update = StateUpdate::new();
        for call in calls {
            let Some(tool) = self.registry.get(&call.name) else {
                warn!("Model requested unknown tool '{}'", call.name);
                update = update.message(Message::tool(
                    call.id,
                    format!("Error: no tool named '{}'", call.name),
                ));
                continue;
            };

            ctx.progress(&call.name, Phase::Start);
            let content = match tool.invoke(&call.arguments, ctx).await {
                Ok(content) => content,
                Err(StepError::Tool(e)) => {
                    warn!("Tool '{}' failed: {}", call.name, e);
                    format!("Error: {}", e)
                }
                Err(other) => return Err(other),
            };
            ctx.progress(&call.name, Phase::End);
            update = update.message(Message::tool(call.id, content));
        }

        Ok(update.into())
    }
}

struct Respond {
    model: Arc<dyn ModelClient>,
    persona: Persona,
}

#[async_trait]
impl Step for Respond {
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let request = self.persona.request(state, ctx.config());
        let answer = self.model.invoke(request).await?.into_text();
        Ok(StateUpdate::new().message(Message::assistant(answer)).into())
    }
}
