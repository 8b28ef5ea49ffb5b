use std::{sync::Arc, time::Duration};

use clap::Parser;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{watch, Mutex};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use recall_tracker::{
    cli::{Cli, Commands, OutputFormat},
    config::Config,
    error::{RecallError, Result},
    fda::{FdaClient, RecallRecord},
    server::{self, AppState},
    storage::{Database, RunStatus, Trigger},
    sync::{CycleOutcome, Scheduler, SyncEngine},
    utils,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("recall_tracker=debug,info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve { no_schedule } => {
            info!("Starting recall API...");
            serve(config, no_schedule).await
        }

        Commands::Update => update(&config).await,

        Commands::List { format, limit } => list_recalls(&config, format, limit),

        Commands::Show {
            recall_number,
            format,
        } => show_recall(&config, &recall_number, format),

        Commands::Stats { format } => show_stats(&config, format),

        Commands::Init { force } => {
            info!("Initializing...");
            initialize(&config, &cli.config, force)
        }
    };

    if let Err(e) = result {
        error!("{}", format!("Error: {}", e).red());
        std::process::exit(1);
    }
}

fn build_engine(config: &Config) -> Result<Arc<SyncEngine>> {
    let source = FdaClient::new(&config.fda)?;
    let database = Database::new(&config.database.path)?;

    Ok(Arc::new(SyncEngine::new(
        Arc::new(source),
        Arc::new(Mutex::new(database)),
    )))
}

async fn serve(config: Config, no_schedule: bool) -> Result<()> {
    let engine = build_engine(&config)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = if config.schedule.enabled && !no_schedule {
        Some(
            Scheduler::new(
                engine.clone(),
                config.schedule_interval(),
                config.schedule.run_on_startup,
            )
            .spawn(shutdown_rx),
        )
    } else {
        info!("Scheduler disabled; use /update to fetch recalls");
        None
    };

    let state = AppState::new(config, engine);
    let served = server::start_server(state, shutdown_tx).await;

    if let Some(handle) = scheduler {
        if let Err(e) = handle.await {
            error!("Scheduler task ended abnormally: {}", e);
        }
    }

    served
}

async fn update(config: &Config) -> Result<()> {
    let engine = build_engine(config)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
            .map_err(|e| RecallError::Other(e.into()))?,
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(format!("Fetching {}", config.fda.endpoint));

    let outcome = engine.trigger(Trigger::ManualCli).await;
    spinner.finish_and_clear();

    match outcome {
        CycleOutcome::Completed(summary) => {
            println!("{}", "✓ Recall update complete".green());
            println!("  Fetched:    {}", summary.fetched);
            println!("  Inserted:   {}", summary.upserts.inserted.to_string().green());
            println!("  Replaced:   {}", summary.upserts.replaced.to_string().yellow());
            println!("  Unchanged:  {}", summary.upserts.unchanged);
            if summary.skipped > 0 {
                println!("  Skipped:    {}", summary.skipped.to_string().red());
            }
        }
        CycleOutcome::Failed(reason) => {
            println!("{}", "✗ Recall update failed".red());
            println!("  {}", reason);
        }
    }

    Ok(())
}

fn list_recalls(config: &Config, format: OutputFormat, limit: Option<usize>) -> Result<()> {
    let db = Database::new(&config.database.path)?;
    let recalls = db.get_recalls(limit)?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&recalls)?);
        return Ok(());
    }

    if recalls.is_empty() {
        println!("{}", "No recalls stored yet. Run `recall-tracker update` first.".yellow());
        return Ok(());
    }

    let widths = [16, 10, 12, 36, 40];
    utils::print_table_border(124);
    utils::print_table_row(
        &["Recall", "Class", "Reported", "Product", "Reason"],
        &widths,
    );
    utils::print_table_border(124);

    for recall in &recalls {
        let class = recall.classification().unwrap_or("-");
        let row = [
            recall.recall_number().unwrap_or("-").to_string(),
            class.to_string(),
            recall
                .report_date()
                .map(utils::format_report_date)
                .unwrap_or_else(|| "-".to_string()),
            recall.product_description().unwrap_or("-").to_string(),
            recall.reason_for_recall().unwrap_or("-").to_string(),
        ];
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        utils::print_table_row(&cells, &widths);
    }
    utils::print_table_border(124);
    println!("{} recalls", recalls.len());

    Ok(())
}

fn show_recall(config: &Config, recall_number: &str, format: OutputFormat) -> Result<()> {
    let db = Database::new(&config.database.path)?;
    let recall = db
        .get_recall(recall_number)?
        .ok_or_else(|| RecallError::NotFound(recall_number.to_string()))?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&recall)?);
        return Ok(());
    }

    print_recall(&recall);
    Ok(())
}

fn print_recall(recall: &RecallRecord) {
    println!(
        "{}",
        format!("=== Recall {} ===", recall.recall_number().unwrap_or("-"))
            .cyan()
            .bold()
    );

    if let Some(class) = recall.classification() {
        println!("  {:<28}{}", "classification", utils::format_classification(class));
    }

    for (key, value) in recall.as_map() {
        if key == "recall_number" || key == "classification" {
            continue;
        }
        let text = match value {
            serde_json::Value::String(s) if key.ends_with("_date") => utils::format_report_date(s),
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        println!("  {:<28}{}", key, text);
    }
}

fn show_stats(config: &Config, format: OutputFormat) -> Result<()> {
    let db = Database::new(&config.database.path)?;
    let stats = db.get_stats()?;
    let history = db.get_sync_runs(10)?;

    if format == OutputFormat::Json {
        let body = serde_json::json!({ "stats": stats, "recent_runs": history });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!("{}", "=== Food Recall Statistics ===".cyan().bold());
    println!("\nRecalls:");
    println!("  Total:      {}", stats.total_recalls);
    for (class, count) in &stats.by_classification {
        println!("  {:<11} {}", format!("{}:", utils::format_classification(class)), count);
    }

    println!("\nFetch Cycles:");
    println!("  Total:      {}", stats.total_runs);
    println!("  Failed:     {}", stats.failed_runs.to_string().red());
    println!(
        "  Last OK:    {}",
        stats
            .last_success_at
            .as_ref()
            .map(utils::format_timestamp)
            .unwrap_or_else(|| "never".to_string())
    );

    if !history.is_empty() {
        println!("\n{}", "Recent Fetch Cycles:".yellow());
        let widths = [24, 12, 10, 8, 8, 30];
        utils::print_table_border(100);
        utils::print_table_row(
            &["Started", "Trigger", "Status", "Fetched", "Written", "Error"],
            &widths,
        );
        utils::print_table_border(100);

        for run in history {
            let status = match run.status {
                RunStatus::Succeeded => "succeeded".to_string(),
                RunStatus::Failed => "failed".to_string(),
            };
            utils::print_table_row(
                &[
                    &utils::format_timestamp(&run.started_at),
                    &run.trigger.to_string(),
                    &status,
                    &run.fetched.to_string(),
                    &run.upserts.written().to_string(),
                    run.error.as_deref().unwrap_or(""),
                ],
                &widths,
            );
        }
        utils::print_table_border(100);
    }

    Ok(())
}

fn initialize(config: &Config, config_path: &str, force: bool) -> Result<()> {
    println!("{}", "Initializing recall tracker...".green());
    let _db = Database::new(&config.database.path)?;
    println!("{}", "✓ Database initialized".green());

    let file = Config::file_path(config_path);
    if Config::write_default(&file, force)? {
        println!("{}", format!("✓ Default configuration written to {}", file.display()).green());
    } else {
        println!(
            "{}",
            format!("✓ Keeping existing {} (use --force to overwrite)", file.display()).yellow()
        );
    }

    println!("\n{}", "Configuration:".cyan());
    println!("  Endpoint:   {}", config.fda.endpoint);
    println!("  Search:     {}", config.fda.search);
    println!("  Limit:      {}", config.fda.limit);
    println!("  Database:   {}", config.database.path);
    println!("  Listen:     {}", config.bind_address());
    println!("  Interval:   {}s", config.schedule.interval_secs);

    println!("\n{}", "Ready to use! Try running:".cyan());
    println!("  {} to fetch recalls now", "recall-tracker update".yellow());
    println!("  {} to list stored recalls", "recall-tracker list".yellow());
    println!("  {} to start the API and schedule", "recall-tracker serve".yellow());
    Ok(())
}
