//! Batch command - parse many statement files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use finstmt_core::batch::{BatchOptions, BatchOrchestrator, BatchOutcome, DocumentOutcome};
use finstmt_core::document::FileSource;
use finstmt_core::pipeline::StatementParser;

use super::parse::{format_statement, OutputFormat};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input files or glob pattern
    #[arg(required = true)]
    input: String,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Number of parallel workers
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Process one file at a time, in order
    #[arg(long)]
    sequential: bool,

    /// Give up on unfinished files after this many seconds
    #[arg(long)]
    timeout: Option<u64>,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = super::config::load(config_path)?;

    // Expand glob pattern
    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| {
            let ext = p.extension().and_then(|e| e.to_str()).unwrap_or("");
            matches!(ext.to_lowercase().as_str(), "pdf" | "txt")
        })
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let mut options = BatchOptions::from_config(&config.batch);
    if let Some(jobs) = args.jobs {
        options = options.with_max_workers(jobs);
    }
    if args.sequential {
        options.parallel = false;
    }
    if let Some(secs) = args.timeout {
        options = options.with_timeout(Duration::from_secs(secs));
    }
    debug!("Batch options: {:?}", options);

    let parser = StatementParser::from_config(&config)?;
    let orchestrator = BatchOrchestrator::new(Arc::new(parser), Arc::new(FileSource::new()));
    let ids: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap(),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(format!("Processing {} files...", ids.len()));

    let outcome = orchestrator.run(&ids, &options).await;

    pb.finish_with_message("Complete");

    if let Some(output_dir) = &args.output_dir {
        write_outputs(&outcome, output_dir, args.format)?;
    }

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &outcome)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        outcome.len(),
        start.elapsed()
    );
    println!(
        "   {} successful, {} failed",
        style(outcome.succeeded()).green(),
        style(outcome.failed()).red()
    );

    if outcome.failed() > 0 {
        println!();
        println!("{}", style("Failed files:").red());
        for (id, result) in outcome.iter() {
            if let DocumentOutcome::Failure(failure) = result {
                println!(
                    "  - {}: {} ({})",
                    id,
                    failure.message,
                    serde_json::to_string(&failure.kind)?.trim_matches('"')
                );
            }
        }
    }

    Ok(())
}

fn write_outputs(outcome: &BatchOutcome, output_dir: &Path, format: OutputFormat) -> anyhow::Result<()> {
    for (id, result) in outcome.iter() {
        let Some(statement) = result.statement() else {
            continue;
        };

        let output_name = Path::new(id)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("statement");
        let output_path = output_dir.join(format!("{}.{}", output_name, format.extension()));

        fs::write(&output_path, format_statement(statement, format)?)?;
        debug!("Wrote output to {}", output_path.display());
    }
    Ok(())
}

fn write_summary(path: &Path, outcome: &BatchOutcome) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "status",
        "institution",
        "account_number",
        "period_start",
        "period_end",
        "closing_balance",
        "transactions",
        "confidence",
        "error",
    ])?;

    for (id, result) in outcome.iter() {
        let filename = Path::new(id)
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_string();

        let record = match result {
            DocumentOutcome::Success(statement) => [
                filename,
                "success".to_string(),
                statement.account_info.institution.clone(),
                statement.account_info.number.clone(),
                statement.period.start.map(|d| d.to_string()).unwrap_or_default(),
                statement.period.end.map(|d| d.to_string()).unwrap_or_default(),
                statement.balance.closing.to_string(),
                statement.transactions.len().to_string(),
                format!("{:.2}", statement.confidence.overall),
                String::new(),
            ],
            DocumentOutcome::Failure(failure) => [
                filename,
                "error".to_string(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                failure.message.clone(),
            ],
        };
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}
