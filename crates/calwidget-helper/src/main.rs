//! calwidget-helper entry point.

use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use calwidget_helper::cli::{Cli, Command};
use calwidget_helper::commands;
use calwidget_helper::error::{CliError, CliResult};
use calwidget_providers::TokenStore;

#[tokio::main]
async fn main() -> ExitCode {
    // clap's default exit code for bad arguments is 2; the widget only
    // distinguishes 0 from non-zero, and the contract is a uniform 1.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize tracing on stderr; stdout carries only the JSON payload.
    let filter = if cli.debug {
        EnvFilter::new(Level::DEBUG.to_string())
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(Level::WARN.to_string()))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    if cli.find_port {
        return commands::port::find_port();
    }

    if let Some(ref args) = cli.fetch_events {
        return commands::events::fetch(args).await;
    }

    let store = TokenStore::new(TokenStore::default_dir());

    match cli.command {
        Some(Command::Google {
            client_id,
            client_secret,
            port,
        }) => commands::auth::google(client_id, client_secret, port, &store).await,
        Some(Command::Nextcloud {
            auth_endpoint,
            token_endpoint,
            client_id,
            client_secret,
            port,
        }) => {
            commands::auth::nextcloud(
                auth_endpoint,
                token_endpoint,
                client_id,
                client_secret,
                port,
                &store,
            )
            .await
        }
        None => {
            // No provider argument: use whatever the widget last set in the
            // shared config, defaulting to Google.
            let provider = store
                .load_shared_config()
                .get("provider")
                .and_then(|value| value.as_str().map(str::to_string))
                .unwrap_or_else(|| "google".to_string());

            match provider.as_str() {
                "google" => commands::auth::google(None, None, None, &store).await,
                "nextcloud" => {
                    commands::auth::nextcloud(None, None, None, None, None, &store).await
                }
                other => Err(CliError::Config(format!(
                    "unknown provider: {}. Use 'google' or 'nextcloud'",
                    other
                ))),
            }
        }
    }
}
