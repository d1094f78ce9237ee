//! CLI command definitions

use clap::Args;

/// Send a request through the router
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Router action, e.g. hr_agent or receipt_agent
    #[arg(short, long)]
    pub action: String,

    /// The user's message
    #[arg(short, long, default_value = "")]
    pub message: String,

    /// Receipt image URL for receipt_agent
    #[arg(long)]
    pub receipt_image: Option<String>,

    /// Job title of the requesting user
    #[arg(long)]
    pub user_title: Option<String>,

    #[arg(long)]
    pub user_id: Option<String>,

    /// Conversation thread; continues from the thread's last checkpoint
    #[arg(long)]
    pub thread: Option<String>,

    /// Don't save execution to history
    #[arg(long)]
    pub no_history: bool,

    /// Print the output state as JSON
    #[arg(long)]
    pub json: bool,
}

/// Run one named pipeline directly
#[derive(Debug, Args, Clone)]
pub struct PipelineCommand {
    /// Pipeline name, see `bizflow list`
    #[arg(short, long)]
    pub name: String,

    /// Input state as a JSON object
    #[arg(short, long, default_value = "{}")]
    pub input: String,

    #[arg(long)]
    pub user_title: Option<String>,

    /// Don't save execution to history
    #[arg(long)]
    pub no_history: bool,
}

/// Validate a configuration file
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List router actions and pipelines
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show execution history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Conversation thread to filter by
    #[arg(short, long)]
    pub thread: Option<String>,

    /// Number of recent executions to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show one execution in full
    #[arg(long)]
    pub execution_id: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
