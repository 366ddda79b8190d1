//! Grammars command - list registered institution grammars.

use clap::Args;
use console::style;
use serde::Serialize;

use finstmt_core::pipeline::StatementParser;

/// Arguments for the grammars command.
#[derive(Args)]
pub struct GrammarsArgs {
    /// Print as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct GrammarInfo {
    institution: String,
    signatures: Vec<String>,
    default_type: Option<String>,
    fallback: bool,
}

pub async fn run(args: GrammarsArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = super::config::load(config_path)?;
    let parser = StatementParser::from_config(&config)?;

    // Fallback first, then institutions in detection tie-break order
    let grammars: Vec<GrammarInfo> = parser
        .registry()
        .all()
        .iter()
        .map(|g| GrammarInfo {
            institution: g.institution.clone(),
            signatures: g.signatures.iter().map(|s| s.name.clone()).collect(),
            default_type: g.default_type.map(|t| t.to_string()),
            fallback: g.is_fallback(),
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&grammars)?);
        return Ok(());
    }

    for grammar in &grammars {
        let name = if grammar.fallback {
            style(format!("{} (fallback)", grammar.institution)).dim()
        } else {
            style(grammar.institution.clone()).bold()
        };
        println!(
            "{:<24} {:<12} {}",
            name,
            grammar.default_type.as_deref().unwrap_or("-"),
            grammar.signatures.join(", ")
        );
    }
    println!();
    println!(
        "{} {} institution grammars registered",
        style("ℹ").blue(),
        grammars.iter().filter(|g| !g.fallback).count()
    );

    Ok(())
}
