//! risk-predictor entry point.
//!
//! Usage:
//!   risk-predictor                 # serve HTTP (default)
//!   risk-predictor serve --bind 127.0.0.1:8000
//!   risk-predictor sample          # predict the built-in sample record
//!   risk-predictor file input.json # predict records from a JSON file
//!   risk-predictor file input.json --include-id
//!   risk-predictor preprocess      # print the feature table only

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use risk_predictor::{
    config::Config,
    features::{build_feature_table, input_records, sample_record},
    http::start_http_server,
    models::{ModelProvider, load_models},
    prediction::predict_records,
};
use serde_json::{Value, json};
use tracing::info;

#[derive(Parser)]
#[command(name = "risk-predictor")]
#[command(about = "Maternal risk prediction service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        /// Listen address, overrides server.bind
        #[arg(long)]
        bind: Option<std::net::SocketAddr>,
    },
    /// Predict the built-in sample record and print the response
    Sample {
        /// Attach `_input_id` to each record, as the HTTP endpoint does
        #[arg(long)]
        include_id: bool,
    },
    /// Predict the records in a JSON file (object or array)
    File {
        path: PathBuf,
        /// Attach `_input_id` to each record, as the HTTP endpoint does
        #[arg(long)]
        include_id: bool,
    },
    /// Print the feature table for a JSON file, or the sample record
    Preprocess { path: Option<PathBuf> },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&config.runtime.log_level))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
    config.log_startup();

    let outcome = match cli.command.unwrap_or(Commands::Serve { bind: None }) {
        Commands::Serve { bind } => {
            if let Some(addr) = bind {
                config.server.bind = addr;
            }
            serve(config).await
        }
        Commands::Sample { include_id } => {
            return predict_offline(&config, sample_record(), include_id);
        }
        Commands::File { path, include_id } => match read_json(&path) {
            Ok(data) => return predict_offline(&config, data, include_id),
            Err(e) => Err(e),
        },
        Commands::Preprocess { path } => preprocess(path),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    let provider = Arc::new(ModelProvider::new(config.model_paths()));
    if provider.try_initial_load().await {
        info!("Models ready");
    }
    start_http_server(Arc::new(config), provider).await?;
    Ok(())
}

fn read_json(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
}

/// Load models, predict `data` and print the response.
/// Exit code 2 when the models cannot be loaded.
fn predict_offline(config: &Config, data: Value, include_id: bool) -> ExitCode {
    let models = match load_models(&config.model_paths()) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Model load failed: {}", e);
            return ExitCode::from(2);
        }
    };

    let result = predict_records(
        data,
        models.classifier.as_ref(),
        models.regressor.as_ref(),
        include_id,
    );

    match result.and_then(|batch| Ok(serde_json::to_string_pretty(&batch)?)) {
        Ok(out) => {
            println!("{}", out);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Prediction failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn preprocess(path: Option<PathBuf>) -> Result<()> {
    let data = match path {
        Some(p) => read_json(&p)?,
        None => sample_record(),
    };
    let records = input_records(data)?;
    let table = build_feature_table(&records)?;
    let out = json!({
        "columns": table.columns(),
        "rows": table.to_records(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_commands_omit_ids_unless_asked() {
        let cli = Cli::parse_from(["risk-predictor", "file", "records.json"]);
        assert!(matches!(
            cli.command,
            Some(Commands::File {
                include_id: false,
                ..
            })
        ));

        let cli = Cli::parse_from(["risk-predictor", "sample", "--include-id"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Sample { include_id: true })
        ));
    }

    #[test]
    fn serve_is_the_default_command() {
        assert!(Cli::parse_from(["risk-predictor"]).command.is_none());
    }
}
