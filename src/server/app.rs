use anyhow::Result;
use axum::{http::StatusCode, middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::admin::admin_router;
use super::lifecycle::{plugin_lifecycle, LifecycleState};
use crate::config::ServerConfig;
use crate::plugins::Pipeline;
use crate::status::{status_pages, StatusPageResolver};

/// Everything the middleware stack needs besides the routes
#[derive(Clone)]
pub struct AppContext {
    pub pipeline: Pipeline,
    pub resolver: Arc<dyn StatusPageResolver>,
    pub max_body_bytes: usize,
    pub cors_permissive: bool,
    pub admin: bool,
}

impl AppContext {
    pub fn new(pipeline: Pipeline, resolver: Arc<dyn StatusPageResolver>, config: &ServerConfig) -> Self {
        Self {
            pipeline,
            resolver,
            max_body_bytes: config.max_body_bytes,
            cors_permissive: config.cors_permissive,
            admin: false,
        }
    }

    pub fn with_admin(mut self, enabled: bool) -> Self {
        self.admin = enabled;
        self
    }
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Wrap `routes` with the status-page and plugin layers.
///
/// The plugin lifecycle is the outer layer, so status pages see handler
/// responses while early errors from the pre-request phase are resolved by
/// the lifecycle itself. Admin routes bypass both.
pub fn build_router(routes: Router, ctx: &AppContext) -> Router {
    let lifecycle = LifecycleState {
        pipeline: ctx.pipeline.clone(),
        resolver: ctx.resolver.clone(),
        max_body_bytes: ctx.max_body_bytes,
    };

    let mut app = routes
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(ctx.resolver.clone(), status_pages))
        .layer(middleware::from_fn_with_state(lifecycle, plugin_lifecycle));

    if ctx.admin {
        let pipeline = &ctx.pipeline;
        app = app.merge(admin_router(
            pipeline.registry().clone(),
            pipeline.catalog().clone(),
        ));
    }

    let app = app.layer(TraceLayer::new_for_http());
    if ctx.cors_permissive {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// HTTP server with start/stop control
pub struct AppServer {
    config: ServerConfig,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    local_addr: Option<SocketAddr>,
}

impl AppServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            shutdown_tx: None,
            local_addr: None,
        }
    }

    /// Bind and serve `app` in the background; returns the bound address
    pub async fn start(&mut self, app: Router) -> Result<SocketAddr> {
        if self.shutdown_tx.is_some() {
            anyhow::bail!("server already running");
        }

        let listener =
            tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        tracing::info!("Server starting on {}", addr);

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        self.shutdown_tx = Some(tx);
        self.local_addr = Some(addr);

        tokio::spawn(async move {
            let shutdown = async {
                let _ = rx.await;
                tracing::info!("Server shutting down");
            };
            if let Err(e) = axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!("Server error: {}", e);
            }
        });

        Ok(addr)
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.local_addr = None;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}
