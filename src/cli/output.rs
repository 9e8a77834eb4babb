//! CLI output formatting

use crate::{
    core::{JobStatus, OverallStatus},
    execution::ExecutionEvent,
    persistence::RunRecord,
};
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
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static LOCK: Emoji<'_, '_> = Emoji("🔒 ", "# ");

/// Create a progress bar over the job count
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a job status for display
pub fn format_job_status(status: JobStatus) -> String {
    match status {
        JobStatus::Pending => style("PENDING").dim().to_string(),
        JobStatus::Running => style("RUNNING").yellow().to_string(),
        JobStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        JobStatus::Failed => style("FAILED").red().to_string(),
        JobStatus::Skipped => style("SKIPPED").dim().to_string(),
    }
}

/// Format an overall status for display
pub fn format_overall(status: OverallStatus) -> String {
    match status {
        OverallStatus::Success => style("SUCCESS").green().to_string(),
        OverallStatus::Failure => style("FAILURE").red().to_string(),
    }
}

/// Format a run record for the history listing
pub fn format_run_record(record: &RunRecord) -> String {
    let status_icon = match record.status {
        OverallStatus::Success => CHECK,
        OverallStatus::Failure => CROSS,
    };

    format!(
        "{} {} - {} - {} ({} ok / {} failed / {} skipped of {})",
        status_icon,
        style(&record.run_id.to_string()[..8]).dim(),
        style(&record.pipeline_name).bold(),
        format_overall(record.status),
        record.succeeded_jobs,
        record.failed_jobs,
        record.skipped_jobs,
        record.total_jobs,
    )
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            run_id,
            pipeline_name,
        } => format!(
            "{} Starting pipeline {} ({})",
            ROCKET,
            style(pipeline_name).bold(),
            style(&run_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::JobStarted { job } => {
            format!("{} {}", SPINNER, style(job).cyan())
        }
        ExecutionEvent::JobSucceeded { job, duration_ms } => {
            format!(
                "{} {} ({})",
                CHECK,
                style(job).green(),
                style(format_millis(*duration_ms)).dim()
            )
        }
        ExecutionEvent::JobFailed { job, failure } => {
            format!("{} {}: {}", CROSS, style(job).red(), style(failure).dim())
        }
        ExecutionEvent::JobSkipped { job } => {
            format!("{} {} (dependency failed)", WARN, style(job).dim())
        }
        ExecutionEvent::GatePassed { job, registry } => {
            format!(
                "{} {} authenticated against {}",
                LOCK,
                style(job).cyan(),
                style(registry).bold()
            )
        }
        ExecutionEvent::GateDenied {
            job,
            registry,
            reason,
        } => format!(
            "{} {} denied by {} gate: {}",
            CROSS,
            style(job).red(),
            style(registry).bold(),
            style(reason).dim()
        ),
        ExecutionEvent::PipelineCompleted { run_id, status } => {
            format!(
                "{} Pipeline ({}) finished: {}",
                INFO,
                style(&run_id.to_string()[..8]).dim(),
                format_overall(*status)
            )
        }
    }
}

/// Format job output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{} ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}

fn format_millis(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}m {}s", ms / 60_000, (ms % 60_000) / 1000)
    }
}
