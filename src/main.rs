use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use book_companion::{
    api::BackendClient,
    cli::{execute_command, CliContext, Commands},
    config::{Config, LogFormat},
    session::SessionStore,
    storage::SqliteStorage,
};

/// Reader companion for the book site
#[derive(Parser, Debug)]
#[command(name = "book-companion", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    info!(version = env!("CARGO_PKG_VERSION"), "Book companion starting");

    let storage = match SqliteStorage::new(&config.storage).await {
        Ok(s) => {
            info!(path = %config.storage.path.display(), "Session storage initialized");
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize session storage");
            return Err(e.into());
        }
    };

    let backend = match BackendClient::new(&config.backend, config.request.clone()) {
        Ok(c) => {
            info!(base_url = %c.base_url(), layout = ?config.backend.layout, "Backend client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize backend client");
            return Err(e.into());
        }
    };

    let ctx = CliContext {
        config,
        backend: Arc::new(backend),
        session: SessionStore::new(Arc::new(storage)),
    };

    let result = execute_command(cli.command, &ctx).await;
    if result.exit_code == 0 {
        println!("{}", result.message);
    } else {
        eprintln!("{}", result.message);
        std::process::exit(result.exit_code);
    }
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
