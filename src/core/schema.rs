//! Per-pipeline state schema: field kinds, merge policies, input and output roles
//!
//! One generic engine serves every pipeline; the schema is what makes a
//! pipeline's state typed. It decides which caller fields are admitted, how
//! step updates merge into the working state, and which fields are returned.

use crate::core::error::PipelineError;
use crate::core::state::{State, StateUpdate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Value kind accepted by a field. `null` is accepted by every kind and
/// reads as "unset".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Any,
    Text,
    Bool,
    Number,
    List,
    Object,
}

impl FieldKind {
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (FieldKind::Any, _) => true,
            (FieldKind::Text, Value::String(_)) => true,
            (FieldKind::Bool, Value::Bool(_)) => true,
            (FieldKind::Number, Value::Number(_)) => true,
            (FieldKind::List, Value::Array(_)) => true,
            (FieldKind::Object, Value::Object(_)) => true,
            _ => false,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            FieldKind::Any => "any",
            FieldKind::Text => "text",
            FieldKind::Bool => "bool",
            FieldKind::Number => "number",
            FieldKind::List => "list",
            FieldKind::Object => "object",
        }
    }
}

/// How an incoming value combines with the current one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Last write wins
    Replace,
    /// Concatenate current and incoming lists, no deduplication
    Append,
}

/// Whether and how the caller supplies a field
#[derive(Debug, Clone, PartialEq)]
pub enum InputRole {
    /// Working-only field; callers may seed it but need not
    Internal,
    Required,
    /// Optional input, filled from the default when the caller omits it
    Optional(Option<Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub policy: MergePolicy,
    pub input: InputRole,
    pub output: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            policy: MergePolicy::Replace,
            input: InputRole::Internal,
            output: false,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub fn list(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::List)
    }

    /// List field with append-only merge
    pub fn accumulator(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::List).append()
    }

    /// The conventional append-only conversation history
    pub fn messages() -> Self {
        Self::accumulator("messages")
    }

    pub fn append(mut self) -> Self {
        self.policy = MergePolicy::Append;
        self
    }

    pub fn required(mut self) -> Self {
        self.input = InputRole::Required;
        self
    }

    pub fn optional(mut self) -> Self {
        self.input = InputRole::Optional(None);
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.input = InputRole::Optional(Some(value.into()));
        self
    }

    pub fn output(mut self) -> Self {
        self.output = true;
        self
    }
}

/// Treatment of caller fields the schema does not name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    /// Unknown input fields are dropped
    #[default]
    Lenient,
    /// Unknown input fields are a schema violation
    Strict,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateSchema {
    fields: Vec<FieldSpec>,
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field. A later spec with the same name replaces the earlier one.
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.retain(|f| f.name != spec.name);
        self.fields.push(spec);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Validate caller input and produce the initial working state
    pub fn admit_input(&self, input: State, strictness: Strictness) -> Result<State, PipelineError> {
        let mut state = State::new();

        for (key, value) in input.iter() {
            let Some(spec) = self.get(key) else {
                match strictness {
                    Strictness::Lenient => {
                        debug!("Dropping input field '{}' outside the schema", key);
                        continue;
                    }
                    Strictness::Strict => {
                        return Err(PipelineError::SchemaViolation(format!(
                            "unexpected input field '{}'",
                            key
                        )));
                    }
                }
            };
            check_kind(spec, value)?;
            state.insert(key.to_string(), value.clone());
        }

        for spec in &self.fields {
            if state.contains(&spec.name) {
                continue;
            }
            match &spec.input {
                InputRole::Required => {
                    return Err(PipelineError::SchemaViolation(format!(
                        "missing required input field '{}'",
                        spec.name
                    )));
                }
                InputRole::Optional(Some(default)) => {
                    state.insert(spec.name.clone(), default.clone());
                }
                InputRole::Optional(None) | InputRole::Internal => {}
            }
        }

        Ok(state)
    }

    /// Merge a partial update into the working state.
    ///
    /// Append fields concatenate `current ++ incoming`; a single non-list
    /// value is appended as one element. Every other field is replaced.
    pub fn merge(&self, mut state: State, update: StateUpdate) -> Result<State, PipelineError> {
        for (key, value) in update.into_entries() {
            let spec = self.get(&key).ok_or_else(|| {
                PipelineError::SchemaViolation(format!("update writes unknown field '{}'", key))
            })?;

            match spec.policy {
                MergePolicy::Replace => {
                    check_kind(spec, &value)?;
                    state.insert(key, value);
                }
                MergePolicy::Append => {
                    let incoming = match value {
                        Value::Array(items) => items,
                        Value::Null => Vec::new(),
                        single => vec![single],
                    };
                    match state.get_mut(&key) {
                        Some(Value::Array(current)) => current.extend(incoming),
                        _ => state.insert(key, Value::Array(incoming)),
                    }
                }
            }
        }

        Ok(state)
    }

    /// Output view of a finished state. Output fields that were never set are omitted.
    pub fn project_output(&self, state: &State) -> State {
        let mut output = State::new();
        for spec in self.fields.iter().filter(|f| f.output) {
            if let Some(value) = state.get(&spec.name) {
                output.insert(spec.name.clone(), value.clone());
            }
        }
        output
    }
}

fn check_kind(spec: &FieldSpec, value: &Value) -> Result<(), PipelineError> {
    if spec.kind.accepts(value) {
        Ok(())
    } else {
        Err(PipelineError::SchemaViolation(format!(
            "field '{}' expects {}, got {}",
            spec.name,
            spec.kind.label(),
            value
        )))
    }
}
