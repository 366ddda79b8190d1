//! `finstmt` - pull account details, balances and transactions out of
//! bank, card and brokerage statements.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{batch, config, grammars, parse};

#[derive(Parser)]
#[command(name = "finstmt", author, version, about, long_about = None)]
struct Cli {
    /// Log more (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Engine configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract one statement
    Parse(parse::ParseArgs),
    /// Extract every statement matching a glob
    Batch(batch::BatchArgs),
    /// Show the institutions that can be detected
    Grammars(grammars::GrammarsArgs),
    /// Inspect or edit the configuration file
    Config(config::ConfigArgs),
}

/// Log to stderr so stdout stays clean for JSON and CSV output.
fn init_logging(verbose: u8) -> anyhow::Result<()> {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install logger: {}", e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Parse(args) => parse::run(args, config_path).await,
        Command::Batch(args) => batch::run(args, config_path).await,
        Command::Grammars(args) => grammars::run(args, config_path).await,
        Command::Config(args) => config::run(args).await,
    }
}
