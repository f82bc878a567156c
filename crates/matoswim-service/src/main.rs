//! MatoSwim Service - Water temperature monitor and HTTP API.
//!
//! Run with: `cargo run -p matoswim-service`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use clap::{Parser, Subcommand};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use matoswim_core::{LogNotifier, Monitor, Notifier, Preferences, SeedData, extract_temperature};
use matoswim_service::{AppState, Config, SqliteKeyValueStore, api, ws};
use matoswim_store::Store;
use matoswim_types::format_value;

/// MatoSwim Service - Water temperature monitor and HTTP REST API.
#[derive(Parser, Debug)]
#[command(name = "matoswim-service")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long, global = true)]
    bind: Option<String>,

    /// Database path (overrides config).
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the service in the foreground (default behavior).
    Run,

    /// Fetch the page once and print the sea temperature.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("matoswim_service=info".parse()?)
                .add_directive("matoswim_core=info".parse()?),
        )
        .init();

    let config = load_config(&args)?;

    match args.command {
        Some(Command::Check) => check(&config).await,
        Some(Command::Run) | None => run_server(config).await,
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default().unwrap_or_default(),
    };

    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(db_path) = &args.database {
        config.storage.path = db_path.clone();
    }

    config.validate()?;
    Ok(config)
}

/// One-shot fetch and extract.
async fn check(config: &Config) -> anyhow::Result<()> {
    let fetcher = config.source.build_fetcher()?;
    let page = fetcher
        .fetch()
        .await
        .with_context(|| format!("failed to fetch {}", fetcher.url()))?;
    let value = extract_temperature(&page).context("no sea temperature on the page")?;

    println!("{}°C", format_value(value));
    Ok(())
}

fn build_notifier(config: &Config) -> Arc<dyn Notifier> {
    if config.notifications.desktop {
        #[cfg(feature = "notifications")]
        return Arc::new(matoswim_service::DesktopNotifier);

        #[cfg(not(feature = "notifications"))]
        warn!("Desktop notifications requested but the `notifications` feature is disabled");
    }
    Arc::new(LogNotifier)
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    info!("Opening database at {:?}", config.storage.path);
    let store = Store::open(&config.storage.path)?;
    let preferences = Preferences::new(SqliteKeyValueStore::new(store));

    let seed = match SeedData::bundled() {
        Ok(seed) => Some(seed),
        Err(e) => {
            warn!("Seed temperatures unavailable: {}", e);
            None
        }
    };

    info!("Fetching {} with the {:?} renderer", config.source.url, config.source.renderer);
    let fetcher = config.source.build_fetcher()?;
    let monitor = Arc::new(Monitor::new(
        preferences,
        seed.as_ref(),
        fetcher,
        build_notifier(&config),
        config.monitor_options(),
    ));
    monitor.start().await;

    let addr: SocketAddr = config.server.bind.parse()?;
    let state = AppState::new(Arc::clone(&monitor), config);

    let app = Router::new()
        .merge(api::router())
        .merge(ws::router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    monitor.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
