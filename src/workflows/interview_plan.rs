//! Interview plans: `load_info` → `extract_info` (parallel `extract_resume`,
//! `extract_jd`) → `generate_questions` → `generate_plan`
//!
//! Progress uses typed records named after the running step or branch.

use crate::core::{
    BuildError, FieldKind, FieldSpec, Pipeline, State, StateSchema, StateUpdate, Step,
    StepContext, StepError, StepExt, StepOutcome, ToolError, END,
};
use crate::execution::{Parallel, Phase, ProgressEvent};
use crate::model::{ModelClient, ModelRequest};
use crate::services::{Deps, DocumentLoader};
use crate::workflows::{parse_json_reply, prompts, require_str};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

pub const NAME: &str = "interview_plan_generation";

pub const EXTRACT: &str = "extract_info";

pub fn schema() -> StateSchema {
    StateSchema::new()
        .field(FieldSpec::text("resume_file_path").required())
        .field(FieldSpec::text("job_description").required())
        .field(FieldSpec::text("resume_content"))
        .field(FieldSpec::new("resume_info", FieldKind::Object).output())
        .field(FieldSpec::new("job_info", FieldKind::Object).output())
        .field(FieldSpec::new("questions", FieldKind::Object).output())
        .field(FieldSpec::new("interview_process", FieldKind::Object).output())
        .field(FieldSpec::text("interview_doc").output())
}

pub fn build(deps: &Deps) -> Result<Pipeline, BuildError> {
    let load = LoadInfo {
        documents: deps.documents.clone(),
    }
    .with_fallback("resume_content", |err| {
        format!("Please provide a valid resume attachment or path: {}", err)
    });

    let extract = Parallel::new()
        .branch(
            "extract_resume",
            ExtractObject {
                model: deps.model.clone(),
                system: prompts::INTERVIEW_RESUME_EXTRACTION,
                source: "resume_content",
                target: "resume_info",
            },
        )
        .branch(
            "extract_jd",
            ExtractObject {
                model: deps.model.clone(),
                system: prompts::INTERVIEW_JD_EXTRACTION,
                source: "job_description",
                target: "job_info",
            },
        );

    Pipeline::builder(NAME, schema())
        .add_step("load_info", load)
        .add_step(EXTRACT, extract)
        .add_step(
            "generate_questions",
            GenerateQuestions {
                model: deps.model.clone(),
            },
        )
        .add_step("generate_plan", GeneratePlan)
        .add_edge("load_info", EXTRACT)
        .add_edge(EXTRACT, "generate_questions")
        .add_edge("generate_questions", "generate_plan")
        .add_edge("generate_plan", END)
        .build()
}

fn mark(ctx: &StepContext, phase: Phase) {
    ctx.emit_progress(ProgressEvent::typed(ctx.step_name(), phase));
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JobInfo {
    name: String,
    description: String,
    requirements: Requirements,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Requirements {
    responsibilities: Vec<String>,
    conditions: Vec<String>,
    qualities: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResumeInfo {
    name: String,
    background: Background,
    project_experience: Vec<Project>,
    ability: Value,
    core_strengths: String,
    matching_points: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Background {
    education: Vec<Education>,
    work_experience: Vec<WorkExperience>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Education {
    school: String,
    major: String,
    degree: String,
    duration: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WorkExperience {
    company: String,
    position: String,
    duration: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Project {
    name: String,
    description: String,
    responsibilities: String,
    outcomes: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct Questions {
    technical_questions: Vec<Question>,
    project_questions: Vec<Question>,
    q_and_a_questions: Vec<Question>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct Question {
    question: String,
    purpose: String,
}

/// `(stage, content, duration)` of the fixed interview process
const INTERVIEW_PROCESS: [(&str, &str, &str); 5] = [
    (
        "Introduction",
        "The candidate summarizes their background, core skills and what fits the position.",
        "5 minutes",
    ),
    (
        "Technical assessment",
        "Questions on the required technology stack covering depth and practical use.",
        "15 minutes",
    ),
    (
        "Project discussion",
        "The candidate walks through key projects, their role, the challenges and the results.",
        "20 minutes",
    ),
    (
        "Soft skills",
        "Teamwork, communication and handling pressure.",
        "10 minutes",
    ),
    (
        "Q&A",
        "The candidate asks about the role, the team and career development.",
        "5 minutes",
    ),
];

fn decode<T: DeserializeOwned + Default>(state: &State, field: &str) -> Result<T, StepError> {
    let Some(value) = state.get(field) else {
        return Ok(T::default());
    };
    serde_json::from_value(value.clone()).map_err(|e| {
        ToolError::MalformedOutput(format!("{} has an unexpected shape: {}", field, e)).into()
    })
}

async fn request_object(model: &dyn ModelClient, system: &str, user: &str) -> Result<Value, StepError> {
    let request = ModelRequest::new().system(system).user(user).json_output();
    let reply = model.invoke(request).await?.into_text();
    let value = parse_json_reply(&reply)?;
    if !value.is_object() {
        return Err(ToolError::MalformedOutput("expected a JSON object".to_string()).into());
    }
    Ok(value)
}

/// Plain text of a value that may be a string or a list of strings
fn text_items(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().flat_map(text_items).collect(),
        Value::String(s) if !s.trim().is_empty() => vec![s.clone()],
        Value::Null | Value::String(_) => Vec::new(),
        other => vec![other.to_string()],
    }
}

struct LoadInfo {
    documents: Arc<dyn DocumentLoader>,
}

#[async_trait]
impl Step for LoadInfo {
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let path = require_str(state, "resume_file_path")?;
        mark(ctx, Phase::Start);
        let content = self.documents.load_text(path).await?;
        mark(ctx, Phase::End);
        Ok(StateUpdate::new().set("resume_content", content).into())
    }
}

/// Model extraction of one text field into a JSON object field
struct ExtractObject {
    model: Arc<dyn ModelClient>,
    system: &'static str,
    source: &'static str,
    target: &'static str,
}

#[async_trait]
impl Step for ExtractObject {
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let text = state.get_str(self.source).unwrap_or_default();
        mark(ctx, Phase::Start);
        let extracted = request_object(self.model.as_ref(), self.system, text).await?;
        mark(ctx, Phase::End);
        Ok(StateUpdate::new().set(self.target, extracted).into())
    }
}

struct GenerateQuestions {
    model: Arc<dyn ModelClient>,
}

#[async_trait]
impl Step for GenerateQuestions {
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let job = state.get("job_info").cloned().unwrap_or_else(|| json!({}));
        let resume = state.get("resume_info").cloned().unwrap_or_else(|| json!({}));
        let field = |value: &Value, key: &str| match value.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };

        let system = prompts::interview_questions(
            &field(&job, "description"),
            &field(&job, "requirements"),
            &field(&resume, "project_experience"),
            &field(&resume, "ability"),
        );

        mark(ctx, Phase::Start);
        let reply = request_object(
            self.model.as_ref(),
            &system,
            prompts::INTERVIEW_QUESTIONS_REQUEST,
        )
        .await?;
        let questions: Questions = serde_json::from_value(reply).map_err(|e| {
            ToolError::MalformedOutput(format!("questions have an unexpected shape: {}", e))
        })?;
        let questions = serde_json::to_value(&questions)
            .map_err(|e| ToolError::MalformedOutput(e.to_string()))?;
        mark(ctx, Phase::End);

        Ok(StateUpdate::new().set("questions", questions).into())
    }
}

struct GeneratePlan;

impl GeneratePlan {
    fn document(job: &JobInfo, resume: &ResumeInfo, questions: &Questions) -> String {
        let mut doc = vec![
            format!("## Interview plan for {} - {}", resume.name, job.name),
            "### 1. Position summary".to_string(),
            job.description.clone(),
        ];
        let list = |doc: &mut Vec<String>, heading: &str, items: Vec<String>| {
            doc.push(format!("#### {}", heading));
            doc.extend(items.into_iter().map(|item| format!("- {}", item)));
        };

        list(&mut doc, "Responsibilities", job.requirements.responsibilities.clone());
        list(&mut doc, "Requirements", job.requirements.conditions.clone());
        list(&mut doc, "Core qualities", job.requirements.qualities.clone());

        doc.push("### 2. Candidate summary".to_string());
        list(
            &mut doc,
            "Education",
            resume
                .background
                .education
                .iter()
                .map(|e| format!("{} {} {} {}", e.school, e.major, e.degree, e.duration))
                .collect(),
        );
        list(
            &mut doc,
            "Work experience",
            resume
                .background
                .work_experience
                .iter()
                .map(|w| format!("{} {} {}", w.company, w.position, w.duration))
                .collect(),
        );
        list(
            &mut doc,
            "Projects",
            resume
                .project_experience
                .iter()
                .map(|p| {
                    format!(
                        "{}\n  - Description: {}\n  - Responsibilities: {}\n  - Outcomes: {}",
                        p.name, p.description, p.responsibilities, p.outcomes
                    )
                })
                .collect(),
        );
        list(&mut doc, "Abilities", text_items(&resume.ability));
        list(&mut doc, "Core strengths", vec![resume.core_strengths.clone()]);
        doc.push("#### Fit with the position".to_string());
        doc.push(resume.matching_points.clone());

        let asked = |qs: &[Question]| -> Vec<String> { qs.iter().map(|q| q.question.clone()).collect() };
        doc.push("### 3. Interview questions".to_string());
        list(&mut doc, "Technical questions", asked(&questions.technical_questions));
        list(&mut doc, "Project questions", asked(&questions.project_questions));
        list(&mut doc, "Open Q&A questions", asked(&questions.q_and_a_questions));

        doc.push("### 4. Interview process".to_string());
        doc.extend(
            INTERVIEW_PROCESS
                .iter()
                .map(|(stage, content, duration)| format!("- **{}** ({}): {}", stage, duration, content)),
        );

        doc.join("\n\n")
    }
}

#[async_trait]
impl Step for GeneratePlan {
    async fn run(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        mark(ctx, Phase::Start);
        let job: JobInfo = decode(state, "job_info")?;
        let resume: ResumeInfo = decode(state, "resume_info")?;
        let questions: Questions = decode(state, "questions")?;

        let process = json!({
            "steps": INTERVIEW_PROCESS
                .iter()
                .map(|(stage, content, duration)| {
                    json!({"step": stage, "content": content, "duration": duration})
                })
                .collect::<Vec<_>>()
        });
        let doc = Self::document(&job, &resume, &questions);
        mark(ctx, Phase::End);

        Ok(StateUpdate::new()
            .set("interview_doc", doc)
            .set("interview_process", process)
            .into())
    }
}
