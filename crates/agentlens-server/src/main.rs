use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use axum::routing::get;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use agentlens_server::config::ServerConfig;
use agentlens_server::hub::SessionHub;
use agentlens_server::resolver::DirectoryResolver;
use agentlens_server::ws::session_ws;
use agentlens_watch::WatcherRegistry;

/// Real-time observability server for AI coding-agent session transcripts.
#[derive(Debug, Parser)]
#[command(name = "agentlens-server", version)]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind address, e.g. 127.0.0.1:4545.
    #[arg(long)]
    bind: Option<String>,

    /// Transcript root to scan for session files (repeatable).
    #[arg(long = "transcript-root")]
    transcript_roots: Vec<PathBuf>,

    /// Trailing debounce for batch delivery, in milliseconds.
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Max-wait flush ceiling under sustained writes, in milliseconds.
    #[arg(long)]
    max_wait_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load_from(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }
    if !cli.transcript_roots.is_empty() {
        config.transcript_roots = cli.transcript_roots;
    }
    if let Some(debounce_ms) = cli.debounce_ms {
        config.debounce_ms = debounce_ms;
    }
    if let Some(max_wait_ms) = cli.max_wait_ms {
        config.max_wait_ms = max_wait_ms;
    }

    let roots = config.effective_roots();
    if roots.is_empty() {
        tracing::warn!("no transcript roots configured; every subscribe will fail to resolve");
    } else {
        tracing::info!(roots = ?roots, "scanning transcript roots");
    }

    let registry = Arc::new(WatcherRegistry::new());
    let resolver = Arc::new(DirectoryResolver::new(roots));
    let hub = SessionHub::with_timing(
        registry.clone(),
        resolver,
        Duration::from_millis(config.debounce_ms),
        Duration::from_millis(config.max_wait_ms),
    );

    let app = Router::new()
        .route("/ws", get(session_ws))
        .with_state(hub.clone());

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("binding to {}", config.bind))?;

    tracing::info!(addr = %config.bind, "agentlens listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub, registry))
        .await
        .context("server error")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,agentlens_server=debug")),
        )
        .init();
}

async fn shutdown_signal(hub: Arc<SessionHub>, registry: Arc<WatcherRegistry>) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutting down");
    hub.shutdown();
    // The hub stops every watcher it owns; this sweeps any stragglers.
    registry.stop_all();
}
