use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use osmon::cli::{handle_command, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing subscriber; stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    // Endpoints may use wss://
    let _ = rustls::crypto::ring::default_provider().install_default();

    handle_command(Cli::parse()).await
}
