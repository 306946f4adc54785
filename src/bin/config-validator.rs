//! # Worker Configuration Validator
//!
//! Command-line tool for validating pipeline worker settings before a worker
//! is deployed. Loads a settings file layered with `PIPEWORKER__*` environment
//! overrides and prints the effective result.

use clap::{Parser, Subcommand};
use pipeworker_core::config::{SettingsLoader, WorkerSettings};
use std::process;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate pipeline worker settings")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Settings file (yaml, toml or json)
    #[arg(short, long)]
    config: Option<String>,

    /// Environment variable prefix for overrides
    #[arg(long, default_value = "PIPEWORKER")]
    env_prefix: String,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format (table, json)
    #[arg(long, default_value = "table")]
    format: String,

    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load, validate and print the effective settings
    Validate,

    /// Print the built-in defaults
    Defaults,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::Defaults) => print_settings(&cli, &WorkerSettings::default()),
        Some(Commands::Validate) | None => validate(&cli),
    };

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            process::exit(1);
        }
    }
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut loader = SettingsLoader::new().with_env_prefix(&cli.env_prefix);
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }

    let settings = match loader.load() {
        Ok(settings) => settings,
        Err(e) => {
            println!("❌ Invalid worker settings: {}", e);
            return Err(Box::new(e));
        }
    };

    print_settings(cli, &settings)?;
    if cli.format != "json" {
        println!("\n✅ Worker settings are valid");
    }
    Ok(())
}

fn print_settings(cli: &Cli, settings: &WorkerSettings) -> Result<(), Box<dyn std::error::Error>> {
    match cli.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(settings)?),
        "table" => {
            let concurrency = &settings.concurrency;
            let max = concurrency
                .max
                .map_or_else(|| "unbounded".to_string(), |max| max.to_string());
            let mode = if concurrency.fixed_rate { "fixed" } else { "dynamic" };

            println!("{:<26} {}", "name", settings.name);
            println!("{:<26} {}", "concurrency.mode", mode);
            println!("{:<26} {}", "concurrency.starting", concurrency.starting);
            println!("{:<26} {}", "concurrency.min", concurrency.min);
            println!("{:<26} {}", "concurrency.max", max);
            println!("{:<26} {}", "concurrency.window_ms", concurrency.window_ms);
            println!("{:<26} {}", "write_to_error_sink", settings.write_to_error_sink);
            println!("{:<26} {}", "shutdown_timeout_ms", settings.shutdown_timeout_ms);
        }
        other => return Err(format!("Unknown output format: {}", other).into()),
    }
    Ok(())
}
