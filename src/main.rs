use anyhow::{Context, Result};
use axum::Router;
use std::{fs, io::ErrorKind, path::Path, sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::mpsc};
use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod errors;
mod handlers;
mod models;
mod pipeline;
mod routes;
mod services;
mod state;

use pipeline::{Pipeline, filter::FilterConfig};
use services::{
    gallery_service::GalleryService, rate_limiter::RateLimiter, storage_service::StorageService,
};
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting gallery-thumbnailer with config: {:?}", cfg);

    // --- Ensure storage and staging directories exist ---
    for dir in [Path::new(&cfg.storage_dir), cfg.staging_dir.as_path()] {
        if !dir.exists() {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
            tracing::info!("Created directory at {}", dir.display());
        }
    }

    // --- Initialize SQLite connection ---
    let db = Arc::new(db::connect(&cfg.database_url).await?);
    db::run_migrations(&db).await?;

    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(());
    }

    // --- Clients are created once and injected ---
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let storage = StorageService::new(db.clone(), cfg.storage_dir.clone()).with_notifier(events_tx);
    let gallery = Arc::new(GalleryService::new(db.clone()));

    let filter = FilterConfig {
        scope_prefix: cfg.scope_prefix.clone(),
    };
    let pipeline = Pipeline::new(
        Arc::new(storage.clone()),
        gallery.clone(),
        filter,
        cfg.staging_dir.clone(),
    );
    pipeline::spawn_dispatcher(pipeline.clone(), events_rx);

    let state = AppState {
        storage,
        gallery,
        pipeline,
        upload_limiter: RateLimiter::new(cfg.uploads_per_minute, Duration::from_secs(60)),
    };

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
