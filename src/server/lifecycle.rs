use axum::{
    body::{Bytes, HttpBody},
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::error::RegistryError;
use crate::models::{Phase, Reply};
use crate::plugins::{Assigns, PhaseResult, Pipeline, RequestState};
use crate::status::{early_error, RequestHead, StatusPageResolver};

/// Shared state of the [`plugin_lifecycle`] middleware
#[derive(Clone)]
pub struct LifecycleState {
    pub pipeline: Pipeline,
    pub resolver: Arc<dyn StatusPageResolver>,
    /// Largest body buffered for post-request plugins. Bigger or unsized
    /// bodies stream through and plugins only see status and headers.
    pub max_body_bytes: usize,
}

/// Runs pre-request plugins, the wrapped routes, then post-request plugins
pub async fn plugin_lifecycle(
    State(lifecycle): State<LifecycleState>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let head = RequestHead::from_parts(&parts);
    let state = RequestState::from_parts(&parts);

    let state = match lifecycle.pipeline.run_phase(Phase::PreRequest, state).await {
        Ok(PhaseResult::Continue(state)) => state,
        Ok(PhaseResult::Halt(state)) => {
            let reply = state.reply.unwrap_or_else(|| {
                tracing::warn!("Request {} aborted without a response", state.request_id);
                Reply::canonical(StatusCode::INTERNAL_SERVER_ERROR)
            });
            tracing::debug!("Request {} aborted with {}", state.request_id, reply.status);
            return early_error(lifecycle.resolver.as_ref(), &head, reply).into_response();
        }
        Ok(PhaseResult::Failed { module, reason }) => {
            tracing::debug!(
                "Plugin {} failed before {} {}: {}",
                module,
                head.method,
                head.path(),
                reason
            );
            let reply = Reply::canonical(StatusCode::INTERNAL_SERVER_ERROR);
            return early_error(lifecycle.resolver.as_ref(), &head, reply).into_response();
        }
        Err(e) => {
            tracing::error!("Pre-request phase unavailable: {}", e);
            let reply = Reply::canonical(StatusCode::SERVICE_UNAVAILABLE);
            return early_error(lifecycle.resolver.as_ref(), &head, reply).into_response();
        }
    };
    let request_id = state.request_id.clone();

    parts.headers = state.headers.clone();
    parts.extensions.insert(Assigns(state.assigns.clone()));
    let response = next.run(Request::from_parts(parts, body)).await;

    match lifecycle.pipeline.has_plugins(Phase::PostRequest).await {
        Ok(true) => {}
        Ok(false) => return response,
        Err(e) => {
            tracing::warn!("Skipping post-request phase: {}", e);
            return response;
        }
    }

    match body_len(&response) {
        Some(len) if len <= lifecycle.max_body_bytes => {}
        len => {
            tracing::debug!(
                "Response for {} not buffered (length {:?}, limit {}), post-request plugins see headers only",
                request_id,
                len,
                lifecycle.max_body_bytes
            );
            return headers_only_post(&lifecycle.pipeline, state, response).await;
        }
    }

    let reply = match Reply::from_response(response, lifecycle.max_body_bytes).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!("Failed to buffer response for {}: {}", request_id, e);
            return Reply::canonical(StatusCode::INTERNAL_SERVER_ERROR).into_response();
        }
    };

    let result = lifecycle
        .pipeline
        .run_phase(Phase::PostRequest, state.respond(reply))
        .await;
    match post_outcome(result, &request_id) {
        Ok(Some(reply)) => reply.into_response(),
        Ok(None) => Reply::canonical(StatusCode::INTERNAL_SERVER_ERROR).into_response(),
        Err(reply) => reply.into_response(),
    }
}

/// Exact body size if known, from the body itself or `Content-Length`
fn body_len(response: &Response) -> Option<usize> {
    response
        .body()
        .size_hint()
        .exact()
        .and_then(|len| usize::try_from(len).ok())
        .or_else(|| {
            response
                .headers()
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
        })
}

/// Post-request phase over status and headers; the original body streams on
async fn headers_only_post(
    pipeline: &Pipeline,
    state: RequestState,
    response: Response,
) -> Response {
    let request_id = state.request_id.clone();
    let (mut parts, body) = response.into_parts();
    let head = Reply {
        status: parts.status,
        headers: parts.headers.clone(),
        body: Bytes::new(),
    };

    let result = pipeline.run_phase(Phase::PostRequest, state.respond(head)).await;
    match post_outcome(result, &request_id) {
        Ok(Some(reply)) => {
            parts.status = reply.status;
            parts.headers = reply.headers;
            Response::from_parts(parts, body)
        }
        Ok(None) => Response::from_parts(parts, body),
        Err(reply) => reply.into_response(),
    }
}

/// Reply left by the post-request phase, or the error reply to send instead
fn post_outcome(
    result: Result<PhaseResult, RegistryError>,
    request_id: &str,
) -> Result<Option<Reply>, Reply> {
    match result {
        Ok(PhaseResult::Continue(state)) | Ok(PhaseResult::Halt(state)) => Ok(state.reply),
        Ok(PhaseResult::Failed { module, reason }) => {
            tracing::debug!("Plugin {} failed after {}: {}", module, request_id, reason);
            Err(Reply::canonical(StatusCode::INTERNAL_SERVER_ERROR))
        }
        Err(e) => {
            tracing::error!("Post-request phase unavailable: {}", e);
            Err(Reply::canonical(StatusCode::SERVICE_UNAVAILABLE))
        }
    }
}
