use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod auth;
pub mod bus;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod federation;
pub mod health;
pub mod metrics;
pub mod registry;
pub mod routes;
pub mod storage;
pub mod tokens;

use bus::run_bus_server;
use config::Config;
use context::PodContext;
use storage::Stores;

pub async fn run_http_server(ctx: Arc<PodContext>, listener: TcpListener) -> Result<()> {
    let app = routes::create_router(ctx);
    axum::serve(listener, app).await?;
    Ok(())
}

/// A pod serving on already-bound listeners
pub struct RunningPod {
    pub context: Arc<PodContext>,
    pub http_addr: SocketAddr,
    pub bus_addr: SocketAddr,
}

/// Bind both listeners and serve them in the background
///
/// Ports of 0 pick ephemeral ports; the bound addresses are returned.
pub async fn spawn_pod(config: Config, stores: Stores) -> Result<RunningPod> {
    let http_listener = TcpListener::bind(config.http_addr()).await?;
    let bus_listener = TcpListener::bind(config.bus_addr()).await?;
    let http_addr = http_listener.local_addr()?;
    let bus_addr = bus_listener.local_addr()?;

    let context = Arc::new(PodContext::new(config, stores)?);
    context
        .tokens
        .spawn_sweeper(context.config.token_sweep_interval);

    let http_ctx = context.clone();
    tokio::spawn(async move {
        if let Err(e) = run_http_server(http_ctx, http_listener).await {
            tracing::error!("HTTP server failed: {}", e);
        }
    });
    tokio::spawn(run_bus_server(context.clone(), bus_listener));

    Ok(RunningPod {
        context,
        http_addr,
        bus_addr,
    })
}

pub async fn run() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(
        public_address = %config.public_address,
        postgres = config.database_url.is_some(),
        redis = config.redis_url.is_some(),
        "Starting pod"
    );

    let stores = Stores::connect(&config).await?;

    let http_listener = TcpListener::bind(config.http_addr()).await?;
    tracing::info!("HTTP server listening on http://{}", config.http_addr());
    let bus_listener = TcpListener::bind(config.bus_addr()).await?;
    tracing::info!("Push bus listening on ws://{}", config.bus_addr());

    let ctx = Arc::new(PodContext::new(config, stores)?);
    let sweeper = ctx.tokens.spawn_sweeper(ctx.config.token_sweep_interval);

    let http_server = run_http_server(ctx.clone(), http_listener);
    let bus_server = run_bus_server(ctx, bus_listener);

    tokio::select! {
        _ = bus_server => {
            tracing::info!("Push bus shut down.");
        },
        res = http_server => {
            if let Err(e) = res {
                tracing::error!("HTTP server failed: {}", e);
            }
        },
        _ = signal::ctrl_c() => {
            tracing::info!("Shutdown signal received. Shutting down...");
        }
    }

    sweeper.abort();
    Ok(())
}
