use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sessiongate_core::{
    auth::HttpIdentityBackend,
    config::{Settings, DEFAULT_CONFIG_FILE},
    kv::MemoryKv,
    router::create_router,
    AppState,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sessiongate", version, about = "Cookie session gateway")]
struct Args {
    /// TOML config file; SESSIONGATE_* environment variables override it
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Settings::load_from(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let identity = Arc::new(HttpIdentityBackend::new(&config.identity)?);
    let kv = Arc::new(MemoryKv::new());
    let state = AppState::new(config.clone(), kv.clone(), identity)?;

    let kv_sweeper = kv.spawn_sweeper(config.kv.cleanup_cycle());
    let throttle_sweeper = state.throttle.spawn_sweeper();
    let app = create_router(state)?;

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, app = %config.app_name, "listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    throttle_sweeper.shutdown().await;
    kv_sweeper.shutdown().await;
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
}
