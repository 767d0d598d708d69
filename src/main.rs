use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use blobserve::store::FsStore;

mod config;

use config::Config;

const TRACING_TARGET: &str = "blobserve:main";

fn main() {
    init_tracing();

    if let Err(error) = run() {
        tracing::error!(target: TRACING_TARGET, ?error, "server exited with an error");
        process::exit(1);
    }
}

#[tokio::main]
async fn run() -> anyhow::Result<()> {
    let config = Config::parse();
    config.validate().context("invalid configuration")?;

    tracing::info!(
        target: TRACING_TARGET,
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        store_root = %config.store_root.display(),
        "starting blobserve",
    );

    if config.binds_to_all_interfaces() {
        tracing::warn!(target: TRACING_TARGET, "listening on all network interfaces");
    }

    tokio::fs::create_dir_all(&config.store_root)
        .await
        .with_context(|| format!("cannot create store root {}", config.store_root.display()))?;

    let store = Arc::new(FsStore::new(&config.store_root));
    let app = blobserve::router(store, config.read_chunk_size).layer((
        TraceLayer::new_for_http(),
        TimeoutLayer::new(config.request_timeout()),
    ));

    let listener = TcpListener::bind(config.server_addr())
        .await
        .with_context(|| format!("cannot bind {}", config.server_addr()))?;

    tracing::info!(target: TRACING_TARGET, addr = %config.server_addr(), "server is ready and listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server terminated abnormally")?;

    tracing::info!(target: TRACING_TARGET, "shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(target: TRACING_TARGET, %error, "cannot install the ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!(target: TRACING_TARGET, %error, "cannot install the sigterm handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!(target: TRACING_TARGET, "received ctrl-c"),
        _ = terminate => tracing::info!(target: TRACING_TARGET, "received sigterm"),
    }
}
