//! Command-line interface

pub mod commands;
pub mod logging;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{HistoryCommand, ListCommand, PipelineCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;

/// Request routing and workflow orchestration for business assistants
#[derive(Debug, Parser, Clone)]
#[command(name = "bizflow")]
#[command(version)]
#[command(about = "Routes business requests to workflow pipelines", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the YAML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Print every execution event instead of a spinner
    #[arg(short, long, global = true)]
    pub stream: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Send a request through the router
    Run(RunCommand),

    /// Run one named pipeline on a JSON input
    Pipeline(PipelineCommand),

    /// Validate a configuration and build every pipeline
    Validate(ValidateCommand),

    /// List router actions and pipelines
    List(ListCommand),

    /// Show execution history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
