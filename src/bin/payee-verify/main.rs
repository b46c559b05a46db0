//! payee-verify CLI entry point.

mod cli;

use chrono::{Duration, Utc};
use clap::Parser;
use cli::{Cli, Command};
use color_eyre::eyre::eyre;
use payee_verify::{VerificationForm, VerifierBuilder, VerifierConfig};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }

    info!("payee-verify v{}", env!("CARGO_PKG_VERSION"));

    let config = cli.load_config()?;

    if let Command::InitConfig { output } = &cli.command {
        VerifierConfig::default().to_file(output)?;
        info!("Wrote default configuration to {}", output.display());
        return Ok(());
    }

    let mut builder = VerifierBuilder::new(config);
    if cli.mock_provider {
        builder = builder.mock_provider();
    }
    let verifier = builder.build()?;

    let session = cli.session.as_str();
    let result = match cli.command {
        Command::VerifyBank(args) => {
            let form = VerificationForm::from(args);
            verifier.verify(session, &form).await.map(|o| to_json(&o))
        }
        Command::VerifyUpi(args) => {
            let form = VerificationForm::from(args);
            verifier.verify(session, &form).await.map(|o| to_json(&o))
        }
        Command::Refresh { store, account_id } => verifier
            .refresh(session, &store, account_id)
            .await
            .map(|o| to_json(&o)),
        Command::Attempts { store, hours } => {
            let to = Utc::now();
            let from = to - Duration::hours(hours.clamp(1, 24 * 366));
            verifier
                .attempts(session, &store, from, to)
                .await
                .map(|rows| to_json(&rows))
        }
        Command::InitConfig { .. } => return Ok(()),
    };

    match result {
        Ok(json) => {
            println!("{}", json?);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", e.user_message());
            if let Some(secs) = e.retry_after_secs() {
                eprintln!("Retry after {secs}s.");
            }
            Err(eyre!("{:?}: {e}", e.kind()))
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> color_eyre::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
