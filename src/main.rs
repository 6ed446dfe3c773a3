//! Command-line client for the settings cache.
//!
//! Loads configuration, builds a [`SettingsService`] over HTTP and runs one
//! command, printing JSON to stdout. Logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;

use settings_cache::cache::{FetchOptions, UpdateOptions};
use settings_cache::config::{apply_env_overrides, load_config, ClientConfig};
use settings_cache::observability::logging::init_logging;
use settings_cache::transport::HttpTransport;
use settings_cache::{SettingsError, SettingsField, SettingsPatch, SettingsService};

#[derive(Parser)]
#[command(name = "settings-cli")]
#[command(about = "Inspect and update system settings", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the current settings
    Show {
        /// Bypass the cache
        #[arg(long)]
        force: bool,
    },
    /// Update one setting
    Set { field: String, value: String },
    /// Validate FIELD=VALUE pairs without writing
    Validate {
        #[arg(required = true)]
        pairs: Vec<String>,
    },
    /// Print cache, breaker and rate-limit status
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.observability);

    match run(cli.command, &config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load(path: Option<&PathBuf>) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };
    Ok(apply_env_overrides(config)?)
}

async fn run(
    command: Commands,
    config: &ClientConfig,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    if let Commands::Validate { pairs } = &command {
        let patch = parse_pairs(pairs)?;
        let report = settings_cache::settings::validate_patch(&patch);
        print_json(&report)?;
        return Ok(exit_code(report.is_valid));
    }

    let transport = HttpTransport::new(&config.api)?;
    tracing::info!(url = %transport.settings_url(), "settings-cli starting");
    let service = SettingsService::new(config, Arc::new(transport));

    match command {
        Commands::Show { force } => {
            match service
                .fetch_settings(FetchOptions {
                    force_refresh: force,
                })
                .await
            {
                Ok(result) => {
                    print_json(result.snapshot.as_ref())?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => report_error(&e),
            }
        }
        Commands::Set { field, value } => {
            let field: SettingsField = field.parse()?;
            // Expected version comes from the current document.
            if let Err(e) = service.fetch_settings(FetchOptions::default()).await {
                return report_error(&e);
            }
            let patch = SettingsPatch::new().with(field, value);
            match service.submit_update(patch, UpdateOptions::default()).await {
                Ok(outcome) => {
                    print_json(&outcome.changes)?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => report_error(&e),
            }
        }
        Commands::Status => {
            if let Err(e) = service.fetch_settings(FetchOptions::default()).await {
                tracing::warn!(error = %e, "Status reflects a failed load");
            }
            print_json(&service.get_cache_status())?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Validate { .. } => Ok(ExitCode::SUCCESS),
    }
}

fn parse_pairs(pairs: &[String]) -> Result<SettingsPatch, Box<dyn std::error::Error>> {
    let mut patch = SettingsPatch::new();
    for pair in pairs {
        let (field, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected FIELD=VALUE, got '{}'", pair))?;
        patch.insert(field.trim().parse::<SettingsField>()?, value);
    }
    Ok(patch)
}

fn report_error(error: &SettingsError) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match error.validation_report() {
        Some(report) => print_json(report)?,
        None => eprintln!("Error: {}", error),
    }
    if error.is_retryable() {
        eprintln!("This error is temporary; try again shortly.");
    }
    Ok(ExitCode::FAILURE)
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
