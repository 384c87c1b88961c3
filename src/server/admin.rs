use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::{Phase, PluginId, PluginInfo, PluginOptions, DEFAULT_PRIORITY};
use crate::plugins::{PluginCatalog, PluginRegistry};

#[derive(Clone)]
struct AdminState {
    registry: PluginRegistry,
    catalog: Arc<PluginCatalog>,
}

/// Body of `POST /_plugins`
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub phase: Phase,
    pub module: String,
    #[serde(default)]
    pub options: PluginOptions,
    #[serde(default = "default_priority")]
    pub priority: i32,
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub id: PluginId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CatalogItem {
    pub name: String,
    #[serde(flatten)]
    pub info: PluginInfo,
}

/// Routes for inspecting and changing the registry at runtime
pub fn admin_router(registry: PluginRegistry, catalog: Arc<PluginCatalog>) -> Router {
    Router::new()
        .route("/_plugins", get(list_plugins).post(register_plugin))
        .route("/_plugins/catalog", get(list_catalog))
        .route("/_plugins/:id", delete(unregister_plugin))
        .with_state(AdminState { registry, catalog })
}

async fn list_plugins(State(state): State<AdminState>) -> Result<Response, StatusCode> {
    let snapshot = state.registry.get_all_plugins().await.map_err(|e| {
        tracing::error!("Failed to read plugin registry: {}", e);
        StatusCode::SERVICE_UNAVAILABLE
    })?;
    Ok(Json(snapshot).into_response())
}

async fn list_catalog(State(state): State<AdminState>) -> Json<Vec<CatalogItem>> {
    let items = state
        .catalog
        .infos()
        .into_iter()
        .map(|(name, info)| CatalogItem { name, info })
        .collect();
    Json(items)
}

async fn register_plugin(
    State(state): State<AdminState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Response, StatusCode> {
    if !state.catalog.contains(&request.module) {
        tracing::warn!("Rejected registration of unknown module {}", request.module);
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }

    let id = state.registry.register(
        request.phase,
        request.module.clone(),
        request.options,
        request.priority,
    );
    tracing::debug!(
        "Queued {} for {} at priority {} ({})",
        request.module,
        request.phase,
        request.priority,
        id
    );
    Ok((StatusCode::ACCEPTED, Json(RegisterResponse { id })).into_response())
}

async fn unregister_plugin(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let id: PluginId = id.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    state.registry.unregister(id).await.map_err(|e| {
        tracing::error!("Failed to unregister {}: {}", id, e);
        StatusCode::SERVICE_UNAVAILABLE
    })?;
    tracing::info!("Unregistered plugin {}", id);
    Ok(StatusCode::NO_CONTENT)
}
