//! Stub collaborators and assertion helpers for pipeline scenarios

#![allow(dead_code)]

use async_trait::async_trait;
use bizflow::core::{Pipeline, PipelineError, State, StepError, ToolError};
use bizflow::execution::{channel_handler, ExecutionEngine, ExecutionEvent, RunContext};
use bizflow::model::{ModelClient, ModelReply, ModelRequest};
use bizflow::services::{
    DataSource, Deps, Document, DocumentLoader, ImageGenerator, ObjectStore, Retriever, Transcriber,
};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Responder = Box<dyn Fn(&ModelRequest) -> Result<ModelReply, ToolError> + Send + Sync>;

/// Model that answers from a script of queued replies, or from a responder function
pub struct StubModel {
    replies: Mutex<VecDeque<Result<ModelReply, ToolError>>>,
    responder: Option<Responder>,
    requests: Mutex<Vec<ModelRequest>>,
    calls: AtomicUsize,
}

impl StubModel {
    pub fn replies(replies: impl IntoIterator<Item = ModelReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(Ok).collect()),
            responder: None,
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn texts(texts: &[&str]) -> Arc<Self> {
        Self::replies(texts.iter().map(|t| ModelReply::text(*t)))
    }

    /// Answer every request with `f`; needed when calls run concurrently
    pub fn with_fn<F>(f: F) -> Arc<Self>
    where
        F: Fn(&ModelRequest) -> Result<ModelReply, ToolError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            responder: Some(Box::new(f)),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(err: ToolError) -> Arc<Self> {
        Self::with_fn(move |_| Err(err.clone()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Text of the last user message in the `n`th request
    pub fn user_text(&self, n: usize) -> String {
        self.requests()[n]
            .messages
            .iter()
            .rev()
            .find(|m| m.role == bizflow::core::Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ModelClient for StubModel {
    async fn invoke(&self, request: ModelRequest) -> Result<ModelReply, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(responder) = &self.responder {
            return responder(&request);
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ToolError::MalformedOutput("no scripted reply left".to_string())))
    }
}

/// Retriever returning fixed passages and recording `(collection, query)`
#[derive(Default)]
pub struct StubRetriever {
    pub documents: Vec<Document>,
    pub queries: Mutex<Vec<(String, String)>>,
}

impl StubRetriever {
    pub fn with_passages(passages: &[(&str, &str)]) -> Self {
        Self {
            documents: passages
                .iter()
                .map(|(id, content)| Document {
                    id: id.to_string(),
                    content: content.to_string(),
                    score: 1.0,
                })
                .collect(),
            queries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Retriever for StubRetriever {
    async fn search(&self, collection: &str, query: &str, limit: usize) -> Result<Vec<Document>, ToolError> {
        self.queries
            .lock()
            .unwrap()
            .push((collection.to_string(), query.to_string()));
        Ok(self.documents.iter().take(limit).cloned().collect())
    }
}

/// Document loader keyed by URL; unknown URLs are not found
#[derive(Default)]
pub struct StubDocuments {
    texts: HashMap<String, String>,
}

impl StubDocuments {
    pub fn with(mut self, url: &str, text: &str) -> Self {
        self.texts.insert(url.to_string(), text.to_string());
        self
    }
}

#[async_trait]
impl DocumentLoader for StubDocuments {
    async fn load_text(&self, url: &str) -> Result<String, ToolError> {
        self.texts
            .get(url)
            .cloned()
            .ok_or_else(|| ToolError::NotFound(url.to_string()))
    }
}

pub struct StubTranscriber {
    pub result: Result<String, ToolError>,
}

impl Default for StubTranscriber {
    fn default() -> Self {
        Self {
            result: Err(ToolError::Unsupported("no transcript scripted".to_string())),
        }
    }
}

#[async_trait]
impl Transcriber for StubTranscriber {
    async fn transcribe(&self, _url: &str) -> Result<String, ToolError> {
        self.result.clone()
    }
}

type DataResponder = Box<dyn Fn(&str, &Value) -> Result<Vec<Value>, ToolError> + Send + Sync>;

/// Data source answering with a function and recording `(dataset, params)`
pub struct StubData {
    responder: DataResponder,
    pub queries: Mutex<Vec<(String, Value)>>,
}

impl StubData {
    pub fn with_fn<F>(f: F) -> Self
    where
        F: Fn(&str, &Value) -> Result<Vec<Value>, ToolError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(f),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn rows(rows: Vec<Value>) -> Self {
        Self::with_fn(move |_, _| Ok(rows.clone()))
    }
}

impl Default for StubData {
    fn default() -> Self {
        Self::rows(Vec::new())
    }
}

#[async_trait]
impl DataSource for StubData {
    async fn query(&self, dataset: &str, params: Value) -> Result<Vec<Value>, ToolError> {
        self.queries
            .lock()
            .unwrap()
            .push((dataset.to_string(), params.clone()));
        (self.responder)(dataset, &params)
    }
}

/// Image generator returning `count` numbered URLs
#[derive(Default)]
pub struct StubImages {
    pub requests: Mutex<Vec<(String, u32, String)>>,
}

#[async_trait]
impl ImageGenerator for StubImages {
    async fn generate(&self, prompt: &str, count: u32, size: &str) -> Result<Vec<String>, ToolError> {
        self.requests
            .lock()
            .unwrap()
            .push((prompt.to_string(), count, size.to_string()));
        Ok((0..count)
            .map(|i| format!("https://images.example/{}.png", i))
            .collect())
    }
}

#[derive(Default)]
pub struct StubStorage {
    pub unavailable: bool,
    pub keys: Mutex<Vec<String>>,
}

#[async_trait]
impl ObjectStore for StubStorage {
    async fn put(&self, key: &str, _body: Vec<u8>, _content_type: &str) -> Result<String, ToolError> {
        if self.unavailable {
            return Err(ToolError::status(503, "storage unavailable"));
        }
        self.keys.lock().unwrap().push(key.to_string());
        Ok(format!("https://files.example/{}", key))
    }
}

/// One of each collaborator; replace fields before calling [`Stubs::deps`]
pub struct Stubs {
    pub model: Arc<StubModel>,
    pub vision: Arc<StubModel>,
    pub retriever: Arc<StubRetriever>,
    pub documents: Arc<StubDocuments>,
    pub transcriber: Arc<StubTranscriber>,
    pub data: Arc<StubData>,
    pub images: Arc<StubImages>,
    pub storage: Arc<StubStorage>,
}

impl Default for Stubs {
    fn default() -> Self {
        Self {
            model: StubModel::texts(&[]),
            vision: StubModel::texts(&[]),
            retriever: Arc::new(StubRetriever::default()),
            documents: Arc::new(StubDocuments::default()),
            transcriber: Arc::new(StubTranscriber::default()),
            data: Arc::new(StubData::default()),
            images: Arc::new(StubImages::default()),
            storage: Arc::new(StubStorage::default()),
        }
    }
}

impl Stubs {
    pub fn deps(&self) -> Deps {
        Deps {
            model: self.model.clone(),
            vision_model: self.vision.clone(),
            retriever: self.retriever.clone(),
            documents: self.documents.clone(),
            transcriber: self.transcriber.clone(),
            data: self.data.clone(),
            images: self.images.clone(),
            storage: self.storage.clone(),
        }
    }
}

/// Run with default engine options
pub async fn run(pipeline: &Pipeline, input: State) -> Result<State, PipelineError> {
    ExecutionEngine::default()
        .execute(pipeline, input, RunContext::default())
        .await
}

/// Run and collect every event the execution emitted
pub async fn run_recording(
    pipeline: &Pipeline,
    input: State,
    run: RunContext,
) -> (Result<State, PipelineError>, Vec<ExecutionEvent>) {
    let (handler, mut rx) = channel_handler();
    let result = ExecutionEngine::default()
        .execute(pipeline, input, run.with_event_handler(handler))
        .await;
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    (result, events)
}

/// Progress records in emission order, as streamed to consumers
pub fn progress_records(events: &[ExecutionEvent]) -> Vec<Value> {
    events
        .iter()
        .filter_map(|event| match event {
            ExecutionEvent::Progress { event, .. } => Some(event.to_record()),
            _ => None,
        })
        .collect()
}

/// Steps started by the outermost execution, in order
pub fn steps_started(events: &[ExecutionEvent]) -> Vec<String> {
    let Some(root) = events.first().map(ExecutionEvent::execution_id) else {
        return Vec::new();
    };
    events
        .iter()
        .filter_map(|event| match event {
            ExecutionEvent::StepStarted { execution_id, step } if *execution_id == root => {
                Some(step.clone())
            }
            _ => None,
        })
        .collect()
}

/// Assert `err` is a failure of `step` and return its cause
pub fn expect_step_failure(err: PipelineError, step: &str) -> StepError {
    match err {
        PipelineError::StepFailure { step: failed, cause } => {
            assert_eq!(failed, step, "wrong failing step");
            cause
        }
        other => panic!("expected failure of step '{}', got: {}", step, other),
    }
}

/// Content of the last message in an output state
pub fn last_message_text(state: &State) -> String {
    state
        .last_message()
        .map(|m| m.content)
        .unwrap_or_default()
}
