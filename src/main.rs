//! Hubbridge daemon - streams gateway hub events to HTTP webhooks.
//!
//! This is the main binary entry point. See the `hubbridge` library for the
//! core functionality.

// Rust guideline compliant 2026-02

use anyhow::{Context, Result};
use clap::Parser;
use hubbridge::{control, Bridge, Config, SignalRConnector};
use mimalloc::MiMalloc;
use std::sync::Arc;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
/// mimalloc provides better multi-threaded performance than the system allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// CLI
#[derive(Parser)]
#[command(name = "hubbridge")]
#[command(version)]
#[command(about = "Bridges authenticated gateway hubs to HTTP webhooks")]
struct Cli {
    /// Control endpoint port (overrides PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Print the effective configuration (secrets redacted) and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(port) = cli.port {
        config.port = port;
    }

    if cli.check_config {
        println!("{:#?}", config);
        return Ok(());
    }

    let addr = config.listen_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind control endpoint on {}", addr))?;

    let connector = Arc::new(SignalRConnector::new(config.hub_url.clone()));
    let bridge = Arc::new(Bridge::start(&config, connector)?);
    let app = control::router(control::AppState::new(
        Arc::clone(&bridge),
        config.control_secret.clone(),
    ));

    log::info!("[Control] Listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("control endpoint failed")?;

    bridge.shutdown().await;
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => log::info!("Received SIGINT, shutting down"),
        () = terminate => log::info!("Received SIGTERM, shutting down"),
    }
}
