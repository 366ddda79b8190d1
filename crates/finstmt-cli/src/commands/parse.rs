//! Parse command - extract data from a single statement file.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use finstmt_core::document::{DocumentSource, FileSource};
use finstmt_core::pipeline::{ExtractionResult, StatementParser};
use finstmt_core::StatementResult;

/// Arguments for the parse command.
#[derive(Args)]
pub struct ParseArgs {
    /// Input file (PDF or extracted text)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Include extraction diagnostics in JSON output
    #[arg(long)]
    debug: bool,

    /// Show per-field confidence scores
    #[arg(long)]
    show_confidence: bool,

    /// Report validation issues
    #[arg(long)]
    validate: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV of the transactions
    Csv,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        }
    }
}

pub async fn run(args: ParseArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = super::config::load(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    info!("Processing file: {}", args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap(),
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    pb.set_message("Reading document...");
    let text = FileSource::new().read_text(&args.input.to_string_lossy())?;
    if text.trim().is_empty() {
        anyhow::bail!("No text could be extracted from {}", args.input.display());
    }

    pb.set_message("Extracting statement...");
    let parser = StatementParser::from_config(&config)?;
    let result = parser.parse_with_diagnostics(&text)?;

    pb.finish_and_clear();

    if args.validate {
        let issues = result.statement.validate();
        if !issues.is_empty() {
            eprintln!("{}", style("Validation issues:").yellow());
            for issue in &issues {
                eprintln!("  - {}", issue);
            }
        }
    }

    let output = if args.debug {
        format_with_diagnostics(&result)?
    } else {
        format_statement(&result.statement, args.format)?
    };

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    if args.show_confidence {
        print_confidence(&result.statement);
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

/// Render a statement in the requested format.
pub fn format_statement(statement: &StatementResult, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(statement.to_json()?),
        OutputFormat::Csv => format_transactions_csv(statement),
        OutputFormat::Text => Ok(format_statement_text(statement)),
    }
}

fn format_with_diagnostics(result: &ExtractionResult) -> anyhow::Result<String> {
    let value = serde_json::json!({
        "statement": result.statement,
        "diagnostics": result.diagnostics,
    });
    Ok(serde_json::to_string_pretty(&value)?)
}

fn format_transactions_csv(statement: &StatementResult) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record(["date", "description", "amount", "balance", "category"])?;

    for txn in &statement.transactions {
        wtr.write_record([
            txn.date.to_string(),
            txn.description.clone(),
            txn.amount.to_string(),
            txn.balance.map(|b| b.to_string()).unwrap_or_default(),
            txn.category.clone().unwrap_or_default(),
        ])?;
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn format_statement_text(statement: &StatementResult) -> String {
    let mut out = String::new();
    let info = &statement.account_info;

    out.push_str(&format!("Institution:   {}\n", info.institution));
    out.push_str(&format!("Account:       {} ({})\n", info.number, info.account_type));
    if let Some(name) = &info.name {
        out.push_str(&format!("Holder:        {}\n", name));
    }
    let date = |d: Option<chrono::NaiveDate>| d.map(|d| d.to_string()).unwrap_or_else(|| "?".to_string());
    out.push_str(&format!(
        "Period:        {} to {}\n",
        date(statement.period.start),
        date(statement.period.end)
    ));
    if let Some(opening) = statement.balance.opening {
        out.push_str(&format!("Opening:       {}\n", opening));
    }
    out.push_str(&format!("Closing:       {}\n", statement.balance.closing));
    out.push_str(&format!("Transactions:  {}\n", statement.transactions.len()));

    for txn in &statement.transactions {
        out.push_str(&format!(
            "  {}  {:<40} {:>12}  {}\n",
            txn.date,
            txn.description,
            txn.amount,
            txn.category.as_deref().unwrap_or("-")
        ));
    }

    out.push_str(&format!(
        "Confidence:    {:.1}%\n",
        statement.confidence.overall * 100.0
    ));
    out
}

fn print_confidence(statement: &StatementResult) {
    println!();
    println!(
        "{} Overall confidence: {:.1}%",
        style("ℹ").blue(),
        statement.confidence.overall * 100.0
    );
    for (field, score) in &statement.confidence.fields {
        let line = format!("  {:<16} {:.2}", field, score);
        if *score >= 0.8 {
            println!("{}", style(line).green());
        } else if *score >= 0.5 {
            println!("{}", style(line).yellow());
        } else {
            println!("{}", style(line).red());
        }
    }
}
