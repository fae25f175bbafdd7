//! flock-dash - church management dashboard service
//!
//! Startup: resolve the root folder, load `flock.toml`, open (or create) the
//! database, make sure an admin account exists, wire the SMS gateway, photo
//! store and spreadsheet source, then serve the dashboard.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use flock_common::config::{resolve_root_folder, FlockConfig, RootFolder, StorageBackend, ROOT_FOLDER_ENV};
use flock_common::db::{bootstrap_admin, init_database};
use flock_dash::services::sheets::GoogleSheetsSource;
use flock_dash::services::{photo_store, sms_gateway, PhotoStore, SheetSource, SmsGateway};
use flock_dash::{build_router, AppState};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for flock-dash
#[derive(Parser, Debug)]
#[command(name = "flock-dash")]
#[command(about = "Church management dashboard")]
#[command(version)]
struct Args {
    /// Root folder holding flock.db, flock.toml and local photos
    #[arg(short, long)]
    root_folder: Option<String>,

    /// Address to listen on, overriding [server].bind
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flock_dash=info,flock_common=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting flock-dash v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    let root = RootFolder::new(resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV));
    root.ensure_exists()
        .with_context(|| format!("Failed to initialize root folder {}", root.path().display()))?;
    info!("Root folder: {}", root.path().display());

    let mut config = FlockConfig::load(&root.service_config_path())?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    let db_path = root.database_path();
    info!("Database: {}", db_path.display());
    let pool = init_database(&db_path).await?;

    if bootstrap_admin(&pool, config.server.bootstrap_admin_password.as_deref())
        .await?
        .is_some()
    {
        info!("Sign in as 'admin' to create the other dashboard accounts");
    }

    let sms: Arc<dyn SmsGateway> =
        Arc::from(sms_gateway::from_config(&config.sms).context("Failed to build SMS gateway")?);
    info!("SMS gateway: {}", sms.name());

    let photos_dir = root.photos_dir();
    let photos: Arc<dyn PhotoStore> = Arc::from(
        photo_store::from_config(&config.storage, &photos_dir).context("Failed to build photo store")?,
    );

    let sheets = GoogleSheetsSource::from_config(&config.sheets).context("Failed to build spreadsheet source")?;
    if sheets.is_none() {
        warn!("No spreadsheet configured; sync accepts uploaded rows only");
    }

    let serve_local_photos = config.storage.backend == StorageBackend::Local;
    let bind = config.server.bind.clone();

    let mut state = AppState::new(pool, config, sms, photos);
    if let Some(sheets) = sheets {
        state = state.with_sheets(Arc::new(sheets) as Arc<dyn SheetSource>);
    }
    if serve_local_photos {
        state = state.with_photos_dir(photos_dir);
    }

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    info!("flock-dash listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
