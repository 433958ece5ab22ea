use std::path::PathBuf;

use blossom_server::config::{Config, DEFAULT_CONFIG_FILE};
use blossom_server::{logging, routes, state};
use clap::Parser;
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(name = "blossom-server", version, about = "Content-addressed blob server")]
struct Cli {
    /// YAML config file; missing files fall back to defaults
    #[arg(short, long, env = "BLOSSOM_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config
    let config = Config::load(&cli.config)?;

    logging::init(&config.logging)?;

    // Build app state
    let state = state::AppState::new(&config).await?;

    #[cfg(unix)]
    spawn_reload_task(state.reloader(&cli.config))?;

    // Build router
    let app = routes::router(state);

    let listener = TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        public_url = %config.server.public_url(),
        "Starting blossom-server"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Re-read the config file on every SIGHUP
#[cfg(unix)]
fn spawn_reload_task(reloader: state::Reloader) -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup())?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            if let Err(e) = reloader.reload() {
                tracing::error!(error = %e, "Configuration reload failed; keeping previous settings");
            }
        }
    });
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
