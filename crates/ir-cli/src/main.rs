//! Intel Relay CLI
//!
//! Polls a SEKOIA.IO Inthreat collection and writes every page, closed over
//! its references, as a STIX bundle.

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod commands;
mod config;

use commands::{check_connection, print_outcome, print_report, report_json};
use config::AppConfig;
use ir_observability::{parse_level, LoggingConfig};

#[derive(Parser)]
#[command(name = "intel-relay")]
#[command(version)]
#[command(about = "SEKOIA.IO Inthreat feed to STIX bundle relay", long_about = None)]
struct Cli {
    /// Configuration file path (defaults to ./config.yml when present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid output format: {}", s)),
        }
    }
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Poll the collection until interrupted (default)
    Run,

    /// Run a single sweep and print a summary
    Once,

    /// Test connectivity and credentials against the collection
    Check,

    /// Show current configuration
    Config {
        /// Show secrets (redacted by default)
        #[arg(long)]
        show_secrets: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::resolve(cli.config.as_deref(), |name| std::env::var(name).ok())?;

    ir_observability::init_logging_with_config(logging_config(&config, cli.verbose));

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => commands::run_forever(config).await,
        Commands::Once => cmd_once(config, cli.format).await,
        Commands::Check => cmd_check(config).await,
        Commands::Config { show_secrets } => cmd_config(config, show_secrets, cli.format),
    }
}

fn logging_config(config: &AppConfig, verbose: bool) -> LoggingConfig {
    if verbose {
        return LoggingConfig {
            json_format: config.logging.json_format,
            ..LoggingConfig::development()
        };
    }

    let base = if config.logging.json_format {
        LoggingConfig::production()
    } else {
        LoggingConfig::default()
    };

    let level = parse_level(&config.logging.level).unwrap_or(base.level);
    LoggingConfig { level, ..base }
}

async fn cmd_once(config: AppConfig, format: OutputFormat) -> Result<()> {
    let report = commands::run_once(config).await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&report_json(&report))?);
    } else {
        print_report(&report);
    }
    Ok(())
}

async fn cmd_check(config: AppConfig) -> Result<()> {
    let outcome = check_connection(&config).await?;
    print_outcome(&outcome);

    if !outcome.is_healthy() {
        println!();
        println!("{}", "Connection check failed".red().bold());
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_config(config: AppConfig, show_secrets: bool, format: OutputFormat) -> Result<()> {
    let display_config = if show_secrets {
        config
    } else {
        config.redact_secrets()
    };

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&display_config)?);
    } else {
        println!("{}", "Current Configuration".bold());
        println!("─────────────────────────");
        print!("{}", serde_yaml::to_string(&display_config)?);
    }

    Ok(())
}
