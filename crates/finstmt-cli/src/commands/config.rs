//! Config command - manage configuration.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use console::style;
use tracing::debug;

use finstmt_core::EngineConfig;

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show current configuration
    Show,

    /// Initialize a new configuration file
    Init(InitArgs),

    /// Get a specific configuration value
    Get {
        /// Configuration key (e.g., "transactions.outlier_penalty")
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// New value
        value: String,
    },

    /// Show configuration file path
    Path,
}

#[derive(Args)]
struct InitArgs {
    /// Output path for configuration file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Overwrite existing file
    #[arg(long)]
    force: bool,
}

pub async fn run(args: ConfigArgs) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => show_config(),
        ConfigCommand::Init(init_args) => init_config(init_args),
        ConfigCommand::Get { key } => get_config(&key),
        ConfigCommand::Set { key, value } => set_config(&key, &value),
        ConfigCommand::Path => show_path(),
    }
}

/// Per-user configuration file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("finstmt")
        .join("config.json")
}

/// Configuration from `--config`, else the per-user file, else defaults.
pub fn load(config_path: Option<&str>) -> anyhow::Result<EngineConfig> {
    let config = match config_path {
        Some(path) => EngineConfig::from_file(Path::new(path))?,
        None => {
            let path = default_config_path();
            if path.exists() {
                debug!("Loading configuration from {}", path.display());
                EngineConfig::from_file(&path)?
            } else {
                EngineConfig::default()
            }
        }
    };
    config.validate()?;
    Ok(config)
}

fn show_config() -> anyhow::Result<()> {
    let config_path = default_config_path();

    let config = if config_path.exists() {
        EngineConfig::from_file(&config_path)?
    } else {
        println!(
            "{} No config file found, showing defaults.",
            style("ℹ").blue()
        );
        EngineConfig::default()
    };

    println!("{}", serde_json::to_string_pretty(&config)?);

    Ok(())
}

fn init_config(args: InitArgs) -> anyhow::Result<()> {
    let output_path = args.output.unwrap_or_else(default_config_path);

    if output_path.exists() && !args.force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            output_path.display()
        );
    }

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    // Write the default category rules so they can be edited in place
    let config = EngineConfig {
        categories: Some(finstmt_core::categorize::default_rule_specs()),
        ..EngineConfig::default()
    };
    config.save(&output_path)?;

    println!(
        "{} Created configuration file at {}",
        style("✓").green(),
        output_path.display()
    );

    Ok(())
}

fn get_config(key: &str) -> anyhow::Result<()> {
    let config_path = default_config_path();

    let config = if config_path.exists() {
        EngineConfig::from_file(&config_path)?
    } else {
        EngineConfig::default()
    };

    let json = serde_json::to_value(&config)?;
    let value = lookup(&json, key)?;

    println!("{}", serde_json::to_string_pretty(value)?);

    Ok(())
}

fn set_config(key: &str, value: &str) -> anyhow::Result<()> {
    let config_path = default_config_path();

    let config = if config_path.exists() {
        EngineConfig::from_file(&config_path)?
    } else {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        EngineConfig::default()
    };

    // Values that are not valid JSON are taken as strings
    let parsed_value: serde_json::Value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));

    let mut json = serde_json::to_value(&config)?;
    assign(&mut json, key, parsed_value.clone())?;

    let config: EngineConfig = serde_json::from_value(json)?;
    config.validate()?;
    config.save(&config_path)?;

    println!(
        "{} Set {} = {}",
        style("✓").green(),
        key,
        serde_json::to_string(&parsed_value)?
    );

    Ok(())
}

fn show_path() -> anyhow::Result<()> {
    let config_path = default_config_path();

    println!("Configuration file: {}", config_path.display());

    if config_path.exists() {
        println!("Status: {}", style("exists").green());
    } else {
        println!("Status: {}", style("not created").yellow());
        println!();
        println!("Run 'finstmt config init' to create a configuration file.");
    }

    Ok(())
}

/// Value at a dotted key path.
fn lookup<'a>(json: &'a serde_json::Value, key: &str) -> anyhow::Result<&'a serde_json::Value> {
    let mut current = json;
    for part in key.split('.') {
        current = current
            .get(part)
            .ok_or_else(|| anyhow::anyhow!("Configuration key not found: {}", key))?;
    }
    Ok(current)
}

/// Replace the value at an existing dotted key path.
fn assign(json: &mut serde_json::Value, key: &str, value: serde_json::Value) -> anyhow::Result<()> {
    let parts: Vec<&str> = key.split('.').collect();
    let mut current = json;

    for (i, part) in parts.iter().enumerate() {
        if i == parts.len() - 1 {
            let obj = current
                .as_object_mut()
                .ok_or_else(|| anyhow::anyhow!("Cannot set value at non-object path"))?;
            if !obj.contains_key(*part) {
                anyhow::bail!("Configuration key not found: {}", key);
            }
            obj.insert((*part).to_string(), value);
            return Ok(());
        }
        current = current
            .get_mut(*part)
            .ok_or_else(|| anyhow::anyhow!("Configuration path not found: {}", key))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_assign() {
        let mut json = serde_json::to_value(EngineConfig::default()).unwrap();
        assert_eq!(lookup(&json, "batch.parallel").unwrap(), &serde_json::json!(true));

        assign(&mut json, "batch.parallel", serde_json::json!(false)).unwrap();
        let config: EngineConfig = serde_json::from_value(json.clone()).unwrap();
        assert!(!config.batch.parallel);

        assert!(assign(&mut json, "batch.nonsense", serde_json::json!(1)).is_err());
        assert!(lookup(&json, "nope.key").is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"detection": {"min_strength": 0.5}}"#).unwrap();

        let config = load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.detection.min_strength, 0.5);
        assert!(config.batch.parallel);
    }
}
