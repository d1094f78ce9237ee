//! CLI output formatting

use crate::core::ExecutionStatus;
use crate::execution::{ExecutionEvent, ProgressEvent};
use crate::persistence::ExecutionRecord;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Spinner shown on stderr while an execution runs
pub fn create_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed}] {msg}") {
        spinner.set_style(template);
    }
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::Cancelled => style("CANCELLED").yellow().to_string(),
        ExecutionStatus::TimedOut => style("TIMED OUT").red().to_string(),
    }
}

/// One-line history entry
pub fn format_execution_record(record: &ExecutionRecord) -> String {
    let status_icon = match record.status {
        ExecutionStatus::Completed => CHECK,
        ExecutionStatus::Failed | ExecutionStatus::TimedOut => CROSS,
        ExecutionStatus::Running => SPINNER,
        _ => INFO,
    };

    let mut line = format!(
        "{} {} - {} - {}",
        status_icon,
        style(short_id(&record.execution_id)).dim(),
        style(&record.pipeline_name).bold(),
        format_status(record.status),
    );
    if let Some(action) = &record.action {
        line.push_str(&format!(" - {}", style(action).cyan()));
    }
    if let Some(thread) = &record.thread_id {
        line.push_str(&format!(" (thread {})", style(thread).dim()));
    }
    line.push_str(&format!(
        " - {}",
        style(record.started_at.format("%Y-%m-%d %H:%M:%S")).dim()
    ));
    line
}

/// Progress record as the streaming consumer sees it
pub fn format_progress(event: &ProgressEvent) -> String {
    event.to_record().to_string()
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name,
        } => format!(
            "{} Starting pipeline {} ({})",
            ROCKET,
            style(pipeline_name).bold(),
            style(short_id(execution_id)).dim()
        ),
        ExecutionEvent::StepStarted { step, .. } => format!("{} {}", SPINNER, style(step).cyan()),
        ExecutionEvent::StepCompleted {
            step, next_step, ..
        } => format!(
            "{} {} → {}",
            CHECK,
            style(step).green(),
            style(next_step).cyan()
        ),
        ExecutionEvent::StepFailed { step, error, .. } => {
            format!("{} {}: {}", CROSS, style(step).red(), style(error).dim())
        }
        ExecutionEvent::FanOutStarted { step, items, .. } => format!(
            "{} {} fanning out over {} items",
            INFO,
            style(step).yellow(),
            items
        ),
        ExecutionEvent::Progress { event, .. } => {
            format!("{} {}", INFO, style(format_progress(event)).dim())
        }
        ExecutionEvent::PipelineCompleted {
            execution_id,
            pipeline_name,
            status,
        } => format!(
            "{} Pipeline {} ({}) {}",
            INFO,
            style(pipeline_name).bold(),
            style(short_id(execution_id)).dim(),
            format_status(*status)
        ),
    }
}

/// Format output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}

pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
