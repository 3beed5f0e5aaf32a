mod config;
mod observability;

use clap::{Parser, Subcommand};
use config::{Config, ConfigError};
use observability::ObservabilityError;
use report_ingest::errors::IngestError;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "beacon-relay", about = "Relays browser reports to an analytics backend")]
struct Cli {
    #[arg(long)]
    config_path: PathBuf,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    ReportIngest,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Observability(#[from] ObservabilityError),
    #[error("config has no `{0}` section")]
    MissingSection(&'static str),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    ReportIngest(#[from] IngestError),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "beacon-relay stopped");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = Config::from_file(&cli.config_path)?;

    let _sentry_guard = observability::init_logging(&config.common.logging)?;
    if let Some(metrics) = &config.common.metrics {
        observability::init_metrics(metrics)?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match cli.command {
        CliCommand::ReportIngest => {
            let ingest_config = config
                .report_ingest
                .ok_or(CliError::MissingSection("report_ingest"))?;
            tracing::info!("starting report-ingest");
            runtime.block_on(report_ingest::run(ingest_config))?;
        }
    }

    Ok(())
}
