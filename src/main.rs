use anyhow::{Context, Result};
use bizflow::cli::commands::{HistoryCommand, ListCommand, PipelineCommand, RunCommand, ValidateCommand};
use bizflow::cli::logging::init_logging;
use bizflow::cli::output::*;
use bizflow::cli::{Cli, Command};
use bizflow::core::config::AppConfig;
use bizflow::core::{Message, PipelineError, Role, RunConfig, State};
use bizflow::execution::{CancellationToken, EngineOptions, EventHandler, ExecutionEngine, ExecutionEvent, RunContext};
use bizflow::persistence::{ExecutionRecord, InMemoryPersistence, PersistenceBackend};
use bizflow::router::DISPATCH_STEP;
use bizflow::services::Deps;
use bizflow::workflows::Catalog;
use bizflow::Pipeline;
use indicatif::ProgressBar;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Everything a command needs, built once from configuration
struct App {
    config: AppConfig,
    catalog: Catalog,
    engine: ExecutionEngine,
    store: Arc<dyn PersistenceBackend>,
    stream: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::from_args();
    init_logging(cli.verbose)?;

    let outcome = match &cli.command {
        Command::Validate(cmd) => validate_config(cmd),
        Command::Run(cmd) => {
            let app = App::load(&cli, cmd.no_history).await?;
            run_request(&app, cmd).await
        }
        Command::Pipeline(cmd) => {
            let app = App::load(&cli, cmd.no_history).await?;
            run_named_pipeline(&app, cmd).await
        }
        Command::List(cmd) => {
            let app = App::load(&cli, true).await?;
            list_pipelines(&app, cmd)
        }
        Command::History(cmd) => {
            let app = App::load(&cli, false).await?;
            show_history(&app, cmd).await
        }
    };

    if let Err(e) = outcome {
        if let Some(err @ PipelineError::UnknownAction { action, known }) = e.downcast_ref::<PipelineError>() {
            eprintln!("{} {}", CROSS, style(err.user_message()).red());
            eprintln!("  Unknown action '{}'. Known actions: {}", action, known.join(", "));
            std::process::exit(2);
        }
        error!("{:#}", e);
        eprintln!("{} {}", CROSS, style(format!("{:#}", e)).red());
        std::process::exit(1);
    }

    Ok(())
}

impl App {
    async fn load(cli: &Cli, no_history: bool) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => AppConfig::from_file(path)?,
            None => AppConfig::default(),
        };

        let deps = Deps::from_config(&config)?;
        let catalog = Catalog::build(&config, &deps).context("Failed to build pipelines")?;
        let engine = ExecutionEngine::new(EngineOptions::from_config(&config.engine));
        let store = open_store(&config, no_history).await?;

        Ok(Self {
            config,
            catalog,
            engine,
            store,
            stream: cli.stream,
        })
    }

    fn pipeline(&self, name: &str) -> Result<&Arc<Pipeline>> {
        self.catalog.get(name).with_context(|| {
            let known: Vec<&str> = self.catalog.names().collect();
            format!("Unknown pipeline '{}' (known: {})", name, known.join(", "))
        })
    }

    /// Execute with Ctrl-C cancellation and console progress, then record the outcome
    async fn execute(
        &self,
        pipeline: &Pipeline,
        input: State,
        config: RunConfig,
        action: Option<&str>,
        save: bool,
    ) -> Result<State> {
        let execution_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling at the next step boundary");
                on_interrupt.cancel();
            }
        });

        let spinner = (!self.stream).then(create_spinner);
        let run = RunContext::new(config.clone())
            .with_cancel(cancel)
            .with_execution_id(execution_id)
            .with_event_handler(console_handler(spinner.clone()));

        let result = self.engine.execute(pipeline, input, run).await;
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }

        if save {
            let mut record = ExecutionRecord::start(execution_id, pipeline.name())
                .with_thread(config.thread_id.clone());
            if let Some(action) = action {
                record = record.with_action(action);
            }
            let record = record.finish(&result);
            match self.store.save_execution(&record).await {
                Ok(()) => debug!("Saved execution {}", execution_id),
                Err(e) => warn!("Failed to save execution {}: {:#}", execution_id, e),
            }
        }

        Ok(result?)
    }
}

#[cfg(feature = "sqlite")]
async fn open_store(config: &AppConfig, no_history: bool) -> Result<Arc<dyn PersistenceBackend>> {
    use bizflow::persistence::SqliteExecutionStore;

    if no_history || !config.history.enabled {
        return Ok(Arc::new(InMemoryPersistence::new()));
    }
    let store = match &config.history.database {
        Some(path) => SqliteExecutionStore::new(path).await?,
        None => SqliteExecutionStore::with_default_path().await?,
    };
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_store(config: &AppConfig, no_history: bool) -> Result<Arc<dyn PersistenceBackend>> {
    if !no_history && config.history.enabled {
        warn!("Built without the sqlite feature; history is kept in memory only");
    }
    Ok(Arc::new(InMemoryPersistence::new()))
}

/// Spinner updates by default, one line per event with `--stream`
fn console_handler(spinner: Option<ProgressBar>) -> EventHandler {
    Arc::new(move |event: ExecutionEvent| match &spinner {
        Some(spinner) => match &event {
            ExecutionEvent::StepStarted { step, .. } => spinner.set_message(step.clone()),
            ExecutionEvent::Progress { event, .. } => spinner.set_message(format_progress(event)),
            _ => {}
        },
        None => eprintln!("{}", format_execution_event(&event)),
    })
}

async fn run_request(app: &App, cmd: &RunCommand) -> Result<()> {
    let router = app
        .catalog
        .supporter()
        .context("The router pipeline is not configured")?;

    let mut messages = Vec::new();
    if let Some(thread) = &cmd.thread {
        if let Some(checkpoint) = app.store.latest_for_thread(thread).await? {
            messages = checkpoint.messages();
            debug!("Continuing thread {} with {} messages", thread, messages.len());
        }
    }
    messages.push(Message::user(cmd.message.as_str()));

    let mut input = State::new()
        .with("action", cmd.action.as_str())
        .with("messages", messages.iter().map(Message::to_value).collect::<Vec<Value>>());
    if let Some(image) = &cmd.receipt_image {
        input = input.with("receipt_image", image.as_str());
    }

    let mut config = RunConfig::new();
    if let Some(title) = &cmd.user_title {
        config = config.with_user_title(title);
    }
    if let Some(user_id) = &cmd.user_id {
        config = config.with_user_id(user_id);
    }
    if let Some(thread) = &cmd.thread {
        config = config.with_thread_id(thread);
    }

    let output = app
        .execute(router, input, config, Some(cmd.action.as_str()), !cmd.no_history)
        .await?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&output.to_json())?);
        return Ok(());
    }

    match output.messages().into_iter().rev().find(|m| m.role == Role::Assistant) {
        Some(reply) => println!("{}", reply.content),
        None => println!("{} No answer was produced", WARN),
    }
    if let Some(fields) = output.get("receipt_json") {
        println!("\n{}", serde_json::to_string_pretty(fields)?);
    }
    Ok(())
}

async fn run_named_pipeline(app: &App, cmd: &PipelineCommand) -> Result<()> {
    let pipeline = app.pipeline(&cmd.name)?;
    let value: Value = serde_json::from_str(&cmd.input).context("Input is not valid JSON")?;
    let input = State::from_json(value).context("Input must be a JSON object")?;

    let mut config = RunConfig::new();
    if let Some(title) = &cmd.user_title {
        config = config.with_user_title(title);
    }

    println!("{} Running {}", ROCKET, style(pipeline.name()).bold());
    let output = app
        .execute(pipeline, input, config, None, !cmd.no_history)
        .await?;
    println!("{}", serde_json::to_string_pretty(&output.to_json())?);
    Ok(())
}

fn validate_config(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating configuration...", INFO);

    let config = match AppConfig::from_file(&cmd.file) {
        Ok(config) => config,
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    };

    let deps = Deps::from_config(&config)?;
    let catalog = match Catalog::build(&config, &deps) {
        Ok(catalog) => catalog,
        Err(e) => {
            println!("{} Pipeline construction failed:", CROSS);
            println!("  {}", style(e).red());
            std::process::exit(1);
        }
    };

    println!("{} Configuration is valid!", CHECK);
    println!("  Model: {}", style(&config.model.model).bold());
    println!("  Receipt categories: {}", style(config.receipts.categories.len()).cyan());
    for pipeline in catalog.pipelines() {
        println!(
            "  {} (entry {}, {} steps)",
            style(pipeline.name()).bold(),
            style(pipeline.entry()).cyan(),
            pipeline.step_names().len()
        );
    }

    if cmd.json {
        println!("\n{}", serde_json::to_string_pretty(&config)?);
    }
    Ok(())
}

fn router_actions(catalog: &Catalog) -> Vec<String> {
    catalog
        .supporter()
        .and_then(|router| router.edge(DISPATCH_STEP))
        .map(|edge| edge.candidates().into_iter().map(str::to_string).collect())
        .unwrap_or_default()
}

fn list_pipelines(app: &App, cmd: &ListCommand) -> Result<()> {
    let actions = router_actions(&app.catalog);
    let pipelines: Vec<&str> = app.catalog.names().collect();

    if cmd.json {
        let data = serde_json::json!({ "actions": actions, "pipelines": pipelines });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!("{} Router actions:", INFO);
    for action in &actions {
        println!("  {}", style(action).cyan());
    }
    println!("{} Pipelines:", INFO);
    for name in pipelines {
        println!("  {}", style(name).bold());
    }
    Ok(())
}

async fn show_history(app: &App, cmd: &HistoryCommand) -> Result<()> {
    if !app.config.history.enabled {
        println!("{} History is disabled in the configuration", WARN);
        return Ok(());
    }

    if let Some(id) = &cmd.execution_id {
        let execution_id = Uuid::parse_str(id).context("Invalid execution ID format")?;
        match app.store.load_execution(execution_id).await? {
            Some(record) => print_execution_details(&record, cmd.json)?,
            None => println!("{} Execution not found", WARN),
        }
        return Ok(());
    }

    let mut records = match (&cmd.pipeline, &cmd.thread) {
        (_, Some(thread)) => app.store.list_thread(thread).await?,
        (Some(pipeline), None) => app.store.list_executions(pipeline).await?,
        (None, None) => app.store.recent(cmd.limit).await?,
    };
    if let (Some(pipeline), Some(_)) = (&cmd.pipeline, &cmd.thread) {
        records.retain(|r| &r.pipeline_name == pipeline);
    }
    records.truncate(cmd.limit);

    if cmd.json {
        let data = serde_json::json!({ "executions": records });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("{} No executions found", INFO);
        return Ok(());
    }

    println!("{} Execution history (showing latest {}):", INFO, records.len());
    for record in &records {
        println!("  {}", format_execution_record(record));
    }
    Ok(())
}

fn print_execution_details(record: &ExecutionRecord, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(record)?);
        return Ok(());
    }

    println!("{} Execution Details", INFO);
    println!("  ID: {}", style(record.execution_id).cyan());
    println!("  Pipeline: {}", style(&record.pipeline_name).bold());
    if let Some(action) = &record.action {
        println!("  Action: {}", style(action).cyan());
    }
    if let Some(thread) = &record.thread_id {
        println!("  Thread: {}", style(thread).dim());
    }
    println!("  Status: {}", format_status(record.status));
    println!("  Started: {}", style(record.started_at.to_rfc3339()).dim());
    if let Some(completed) = record.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
    }
    if let Some(duration) = record.duration().and_then(|d| d.to_std().ok()) {
        println!("  Duration: {}", style(format_duration(duration)).dim());
    }
    if let Some(error) = &record.error {
        println!("  Error: {}", style(error).red());
    }
    if let Some(output) = &record.output {
        println!("\n  {}", style("Output:").bold());
        let text = serde_json::to_string_pretty(output)?;
        for line in format_output(&text, 40).lines() {
            println!("    {}", line);
        }
    }
    Ok(())
}
