use anyhow::{Context, Result};
use conveyor::cache::CacheStore;
use conveyor::cli::commands::{HistoryCommand, RunCommand, ValidateCommand};
use conveyor::cli::output::*;
use conveyor::cli::{Cli, Command};
use conveyor::collab::{DockerCli, GitCheckout, ProcessDeployGate, Secrets};
use conveyor::core::config::PipelineConfig;
use conveyor::core::{OverallStatus, Pipeline};
use conveyor::execution::{
    ExecutionEvent, JobContext, JobRunner, PipelineController, StepExecutor,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Exit code for configuration errors (cycles, unknown needs, bad YAML)
const EXIT_CONFIG_ERROR: i32 = 2;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd).await?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

/// Load a definition, mapping configuration errors to exit code 2
fn load_config(path: &str) -> PipelineConfig {
    match PipelineConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            println!("{} Configuration error:", CROSS);
            println!("  {}", style(e).red());
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    }
}

async fn run_pipeline(cmd: &RunCommand) -> Result<()> {
    let config = load_config(&cmd.file);
    println!("{} Loaded pipeline: {}", INFO, style(&config.name).bold());

    let mut pipeline = config.to_pipeline();
    if let Some(n) = cmd.max_parallel {
        pipeline.max_parallel = n.max(1);
    }

    if cmd.dry_run {
        print_plan(&pipeline);
        return Ok(());
    }

    let data_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("conveyor");
    let cache_root = cmd
        .cache_dir
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir.join("cache"));
    let cache = Arc::new(CacheStore::open(&cache_root).context("Failed to open cache store")?);

    let secrets = Secrets::from_env();
    let masked = secrets.masked_values();

    let repository = pipeline
        .repository
        .clone()
        .unwrap_or_else(|| ".".to_string());
    let vcs = Arc::new(GitCheckout::new(repository, data_dir.join("workspaces")));

    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
    let runner = Arc::new(
        JobRunner::new(StepExecutor::new(cancel_rx.clone()), cache, vcs)
            .with_masked_values(masked.clone()),
    );
    let controller = Arc::new(PipelineController::new(
        runner,
        Arc::new(ProcessDeployGate::new(secrets)),
        Arc::new(DockerCli),
        (cancel_tx, cancel_rx),
        masked,
    ));

    // Progress bar over jobs; event lines print above it
    let bar = create_progress_bar(pipeline.jobs.len());
    controller.add_event_handler(move |event| {
        match &event {
            ExecutionEvent::JobSucceeded { .. }
            | ExecutionEvent::JobFailed { .. }
            | ExecutionEvent::JobSkipped { .. } => bar.inc(1),
            ExecutionEvent::PipelineCompleted { .. } => bar.finish_and_clear(),
            _ => {}
        }
        bar.println(format_execution_event(&event));
    });

    // Ctrl-C aborts the run; in-flight steps are terminated
    {
        let controller = controller.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                controller.abort();
            }
        });
    }

    let ctx = JobContext::new(pipeline.env.clone(), std::env::current_dir()?);
    println!();
    let report = controller.run(&mut pipeline, &ctx).await;

    if !cmd.no_history {
        if let Err(e) = save_history(&pipeline).await {
            println!("{} Could not save run history: {}", WARN, style(e).dim());
        }
    }

    match report.status {
        OverallStatus::Success => {
            println!(
                "\n{} {} completed {}",
                CHECK,
                style(&pipeline.name).bold(),
                style("successfully").green()
            );
            Ok(())
        }
        OverallStatus::Failure => {
            println!(
                "\n{} {} {}",
                CROSS,
                style(&pipeline.name).bold(),
                style("failed").red()
            );
            std::process::exit(1);
        }
    }
}

fn print_plan(pipeline: &Pipeline) {
    println!("{} Execution plan (dry run):", INFO);
    for name in pipeline.execution_order() {
        let Some(job) = pipeline.job(name) else {
            continue;
        };
        let needs = if job.needs.is_empty() {
            String::new()
        } else {
            format!(" (needs: {})", job.needs.join(", "))
        };
        let gated = if job.is_deploy() { " [deploy, gated]" } else { "" };
        println!(
            "  {}{}{}",
            style(name).cyan(),
            style(needs).dim(),
            style(gated).yellow()
        );
    }
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline...", INFO);

    match PipelineConfig::from_file(&cmd.file) {
        Ok(config) => {
            println!("{} Pipeline definition is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Jobs: {}", style(config.jobs.len()).cyan());
            let deploy = config.jobs.iter().filter(|j| j.deploy.is_some()).count();
            if deploy > 0 {
                println!("  Deploy jobs: {}", style(deploy).cyan());
            }

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    }
}

#[cfg(feature = "sqlite")]
async fn save_history(pipeline: &Pipeline) -> Result<()> {
    use conveyor::persistence::{record_from, PersistenceBackend, SqliteRunStore};

    let store = SqliteRunStore::with_default_path().await?;
    let record = record_from(pipeline);
    store.save_run(&record).await?;
    println!(
        "\n{} Run saved to history (ID: {})",
        INFO,
        style(&record.run_id.to_string()[..8]).dim()
    );
    Ok(())
}

#[cfg(not(feature = "sqlite"))]
async fn save_history(_pipeline: &Pipeline) -> Result<()> {
    Ok(())
}

#[cfg(feature = "sqlite")]
async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    use conveyor::persistence::{PersistenceBackend, SqliteRunStore};

    let store = SqliteRunStore::with_default_path().await?;

    if let Some(run_id_str) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id_str).context("Invalid run ID format")?;
        match store.load_run(run_id).await? {
            Some(record) => {
                if cmd.json {
                    println!("{}", serde_json::to_string_pretty(&record)?);
                } else {
                    println!("{}", format_run_record(&record));
                }
            }
            None => println!("{} Run not found", WARN),
        }
        return Ok(());
    }

    let records = if let Some(pipeline_name) = &cmd.pipeline {
        store.list_runs(pipeline_name).await?
    } else {
        let mut all = Vec::new();
        for pipeline in store.list_pipelines().await? {
            all.extend(store.list_runs(&pipeline).await?);
        }
        all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        all
    };
    let records: Vec<_> = records.into_iter().take(cmd.limit).collect();

    if records.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    if cmd.json {
        let data = serde_json::json!({ "runs": records });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Run history (showing latest {}):", INFO, cmd.limit);
        for record in &records {
            println!("  {}", format_run_record(record));
        }
    }

    Ok(())
}

#[cfg(not(feature = "sqlite"))]
async fn show_history(_cmd: &HistoryCommand) -> Result<()> {
    anyhow::bail!("run history requires the 'sqlite' feature")
}
