//! Resume screening.
//!
//! `process_input_data` splits the comma-separated `resume_urls`, a fan-out
//! step runs the `screen_resume` sub-pipeline (`extract_resume` →
//! `score_resume`) once per URL, and `merge_processing_results` zips
//! extracted profiles with their evaluations by index.

use crate::core::{
    BuildError, FieldSpec, Pipeline, State, StateSchema, StateUpdate, Step, StepContext,
    StepError, StepOutcome, ToolError, END,
};
use crate::execution::{FanOut, Phase, ProgressEvent};
use crate::model::ModelClient;
use crate::services::{Deps, DocumentLoader};
use crate::workflows::{parse_json_reply, prompts, require_str, strip_json_fence};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

pub const NAME: &str = "resume_screening";

pub const PROCESS_INPUT: &str = "process_input_data";
pub const SCREEN_RESUME: &str = "screen_resume";
pub const MERGE_RESULTS: &str = "merge_processing_results";

pub fn schema() -> StateSchema {
    StateSchema::new()
        .field(FieldSpec::text("recruitment_info").required())
        .field(FieldSpec::text("resume_urls").required())
        .field(FieldSpec::text("scoring_rules").optional())
        .field(FieldSpec::list("resume_url_list"))
        .field(FieldSpec::accumulator("resume_json_list"))
        .field(FieldSpec::accumulator("evaluate_json_list"))
        .field(FieldSpec::list("data").output())
}

pub fn screening_schema() -> StateSchema {
    StateSchema::new()
        .field(FieldSpec::text("recruitment_info"))
        .field(FieldSpec::text("scoring_rules"))
        .field(FieldSpec::text("resume_url").required())
        .field(FieldSpec::text("resume_info"))
        .field(FieldSpec::text("resume_json").output())
        .field(FieldSpec::text("evaluate_json").output())
}

/// The per-resume sub-pipeline
pub fn build_screening(deps: &Deps) -> Result<Pipeline, BuildError> {
    Pipeline::builder(SCREEN_RESUME, screening_schema())
        .add_step(
            "extract_resume",
            ExtractResume {
                documents: deps.documents.clone(),
                model: deps.model.clone(),
            },
        )
        .add_step(
            "score_resume",
            ScoreResume {
                model: deps.model.clone(),
            },
        )
        .add_edge("extract_resume", "score_resume")
        .add_edge("score_resume", END)
        .build()
}

pub fn build(deps: &Deps) -> Result<Pipeline, BuildError> {
    let screening = Arc::new(build_screening(deps)?);
    let fan_out = FanOut::new(screening, "resume_url_list", "resume_url")
        .share("recruitment_info")
        .share("scoring_rules")
        .collect("resume_json", "resume_json_list")
        .collect("evaluate_json", "evaluate_json_list");

    Pipeline::builder(NAME, schema())
        .add_step(PROCESS_INPUT, ProcessInput)
        .add_step(SCREEN_RESUME, fan_out)
        .add_step(MERGE_RESULTS, MergeResults)
        .add_edge(PROCESS_INPUT, SCREEN_RESUME)
        .add_edge(SCREEN_RESUME, MERGE_RESULTS)
        .add_edge(MERGE_RESULTS, END)
        .build()
}

fn mark(ctx: &StepContext, kind: &str, phase: Phase) {
    ctx.emit_progress(ProgressEvent::typed(kind, phase));
}

struct ProcessInput;

#[async_trait]
impl Step for ProcessInput {
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        mark(ctx, PROCESS_INPUT, Phase::Start);
        let urls: Vec<Value> = require_str(state, "resume_urls")?
            .split(',')
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(Value::from)
            .collect();
        debug!("Screening {} resumes", urls.len());
        mark(ctx, PROCESS_INPUT, Phase::End);
        mark(ctx, "resume_score", Phase::Start);
        Ok(StateUpdate::new().set("resume_url_list", urls).into())
    }
}

struct ExtractResume {
    documents: Arc<dyn DocumentLoader>,
    model: Arc<dyn ModelClient>,
}

#[async_trait]
impl Step for ExtractResume {
    async fn run(&self, state: &State, _ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let url = require_str(state, "resume_url")?;
        let info = self.documents.load_text(url).await?;
        let profile = self.model.complete(prompts::RESUME_EXTRACTION, &info).await?;
        Ok(StateUpdate::new()
            .set("resume_info", info)
            .set("resume_json", strip_json_fence(&profile))
            .into())
    }
}

/// One weighted scoring dimension supplied by the caller
#[derive(Debug, Deserialize)]
struct ScoringRule {
    name: String,
    value: Value,
}

/// Scoring dimensions as callers name them, with the key the model reports the score under
const DIMENSIONS: [(&str, &str, &str); 5] = [
    (
        "教育背景",
        "educational_background",
        "compare degree, major and school with the stated requirement",
    ),
    (
        "薪资期望",
        "expected_salary",
        "compare the expected salary with the offered range",
    ),
    (
        "工作经验",
        "work_experience",
        "compare industry, role and tenure with the required experience",
    ),
    (
        "技能能力",
        "skills_abilities",
        "check the listed skills against the job requirements",
    ),
    (
        "证书和资格",
        "certifications_qualifications",
        "assess the relevance of certificates and qualifications",
    ),
];

/// Accepts the caller-facing label or the score key
fn dimension_rule(name: &str, max: &str) -> Option<String> {
    let (label, key, text) = DIMENSIONS
        .iter()
        .find(|(label, key, _)| *label == name || *key == name)?;
    Some(format!("{} ({}): {}, at most {} points.", label, key, text, max))
}

/// Scoring rules text. Absent rules use the default ten-rule scheme;
/// otherwise `scoring_rules` is a JSON array of `{name, value}`.
fn scoring_rules(rules: Option<&str>) -> Result<String, StepError> {
    let Some(rules) = rules.filter(|r| !r.trim().is_empty()) else {
        return Ok(prompts::DEFAULT_SCORING_RULES.to_string());
    };
    let parsed: Vec<ScoringRule> = serde_json::from_str(rules)
        .map_err(|e| StepError::InvalidState(format!("scoring_rules is not a rule list: {}", e)))?;

    let mut lines = Vec::new();
    for rule in parsed {
        let max = match &rule.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        match dimension_rule(&rule.name, &max) {
            Some(line) => lines.push(line),
            None => warn!("Ignoring unknown scoring dimension '{}'", rule.name),
        }
    }
    Ok(lines.join("\n"))
}

struct ScoreResume {
    model: Arc<dyn ModelClient>,
}

#[async_trait]
impl Step for ScoreResume {
    async fn run(&self, state: &State, _ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let rules = scoring_rules(state.get_str("scoring_rules"))?;
        let request = prompts::resume_scoring_request(
            state.get_str("recruitment_info").unwrap_or_default(),
            state.get_str("resume_info").unwrap_or_default(),
        );
        let evaluation = self
            .model
            .complete(&prompts::resume_scoring(&rules), &request)
            .await?;
        Ok(StateUpdate::new()
            .set("evaluate_json", strip_json_fence(&evaluation))
            .into())
    }
}

fn parse_object(text: &Value) -> Result<Map<String, Value>, ToolError> {
    match parse_json_reply(text.as_str().unwrap_or_default())? {
        Value::Object(map) => Ok(map),
        _ => Err(ToolError::MalformedOutput(
            "expected a JSON object".to_string(),
        )),
    }
}

struct MergeResults;

#[async_trait]
impl Step for MergeResults {
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        mark(ctx, "resume_score", Phase::End);
        mark(ctx, MERGE_RESULTS, Phase::Start);

        let profiles = state.get_list("resume_json_list");
        let evaluations = state.get_list("evaluate_json_list");
        let mut data = Vec::with_capacity(profiles.len());
        for (profile, evaluation) in profiles.iter().zip(evaluations) {
            let mut merged = parse_object(profile)?;
            merged.extend(parse_object(evaluation)?);
            data.push(Value::Object(merged));
        }

        mark(ctx, MERGE_RESULTS, Phase::End);
        Ok(StateUpdate::new().set("data", data).into())
    }
}
