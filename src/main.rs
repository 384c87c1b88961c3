use anyhow::Result;
use axum::{routing::get, Extension, Json, Router};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

use plugcast::config::{AppConfig, LoggingConfig};
use plugcast::plugins::builtin::FileLoggerPlugin;
use plugcast::plugins::{Assigns, PluginCatalog, PluginRegistry, Pipeline};
use plugcast::server::{build_router, AppContext, AppServer};
use plugcast::status::{ConfiguredStatusPages, NoStatusPages, StatusPageResolver};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;

    // console + daily file
    let log_dir = config.logging.log_dir();
    let _guard = init_tracing(&config.logging, &log_dir);
    tracing::info!("plugcast {} starting", env!("CARGO_PKG_VERSION"));
    match &config.source {
        Some(path) => tracing::info!("Config loaded from {:?}", path),
        None => tracing::info!("No config file found, using built-in defaults"),
    }

    let request_log_dir = log_dir.join("requests");
    let catalog = Arc::new(PluginCatalog::with_builtins(request_log_dir.clone()));
    let registry = PluginRegistry::spawn_seeded(catalog.clone(), &config.plugins);
    let pipeline = Pipeline::new(registry, catalog);

    // prune request logs past retention
    let cleaner = FileLoggerPlugin::new(request_log_dir);
    tokio::spawn(async move {
        let removed = cleaner.cleanup_old_logs().await;
        if removed > 0 {
            tracing::info!("Removed {} old request log files", removed);
        }
    });

    let resolver: Arc<dyn StatusPageResolver> = if config.status_pages.is_empty() {
        Arc::new(NoStatusPages)
    } else {
        Arc::new(ConfiguredStatusPages::from_config(
            &config.status_pages,
            config.source_dir.as_deref(),
        )?)
    };

    let ctx = AppContext::new(pipeline, resolver, &config.server).with_admin(config.admin.enabled);
    let app = build_router(demo_routes(), &ctx);

    let mut server = AppServer::new(config.server.clone());
    let addr = server.start(app).await?;
    tracing::info!("Listening on http://{}", addr);
    if config.admin.enabled {
        tracing::info!("Admin endpoints enabled under http://{}/_plugins", addr);
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl-C received, stopping");
    server.stop().await?;
    Ok(())
}

fn init_tracing(logging: &LoggingConfig, log_dir: &Path) -> Option<WorkerGuard> {
    use tracing_subscriber::prelude::*;

    let mut guard = None;
    let file_layer = if logging.file {
        match std::fs::create_dir_all(log_dir) {
            Ok(()) => {
                // rotated daily
                let file_appender = tracing_appender::rolling::daily(log_dir, "plugcast.log");
                let (non_blocking, worker) = tracing_appender::non_blocking(file_appender);
                guard = Some(worker);
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_target(true)
                        .with_writer(non_blocking),
                )
            }
            Err(e) => {
                eprintln!("Cannot create log directory {:?}: {}", log_dir, e);
                None
            }
        }
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(true)
                .with_target(false),
        )
        .with(file_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level)),
        )
        .init();

    if guard.is_some() {
        tracing::info!("Log file: {:?}", log_dir.join("plugcast.log"));
    }
    guard
}

fn demo_routes() -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
}

async fn index(assigns: Option<Extension<Assigns>>) -> Json<Value> {
    let request_id = assigns
        .as_ref()
        .and_then(|Extension(a)| a.get("request_id").cloned())
        .unwrap_or(Value::Null);
    Json(json!({
        "service": "plugcast",
        "version": env!("CARGO_PKG_VERSION"),
        "request_id": request_id,
    }))
}

async fn health() -> &'static str {
    "ok"
}
