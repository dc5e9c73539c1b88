use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ledgerd::config::LedgerdConfig;
use ledgerd::guard::RepeatedFailureGuard;
use ledgerd::http;
use ledgerd::service::LedgerService;
use ledgerd::store::SqliteStore;

#[derive(Parser, Debug)]
#[command(name = "ledgerd", version, about = "Ledger service with per-key admission control")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the HTTP listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Override the SQLite database path
    #[arg(long)]
    db: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    info!("Starting ledgerd");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => LedgerdConfig::from_file(path)?,
        None => LedgerdConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    if let Some(db) = args.db {
        config.store.db_path = db;
    }
    config.validate()?;
    info!(
        listen_addr = %config.server.listen_addr,
        db_path = %config.store.db_path,
        ip_capacity = config.admission.ip_capacity,
        user_capacity = config.admission.user_capacity,
        "Configuration loaded"
    );

    let store = Arc::new(SqliteStore::open(&config.store.db_path)?);
    let guard = RepeatedFailureGuard::from_config(&config.guard);
    let service = Arc::new(LedgerService::new(store, guard));

    let admission = http::AdmissionControl::from_config(&config.admission);
    admission.start();
    let router = http::build_router(service, &admission);

    let listener = tokio::net::TcpListener::bind(config.server.listen_addr).await?;
    info!(addr = %config.server.listen_addr, "HTTP server listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("ledgerd stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
