use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::resolver::{RequestHead, StatusPageResolver};
use super::stream::{ForwardHandler, StatusPageStream, StreamCommand, StreamEvent, TerminateReason};
use crate::models::Reply;

/// Axum middleware running every route response through a [`StatusPageStream`]
pub async fn status_pages(
    State(resolver): State<Arc<dyn StatusPageResolver>>,
    request: Request,
    next: Next,
) -> Response {
    let head = RequestHead::from_request(&request);
    let response = next.run(request).await;

    let (mut parts, body) = response.into_parts();
    let mut stream = StatusPageStream::new(head, ForwardHandler::default(), resolver);
    let event = StreamEvent::Headers {
        status: parts.status,
        headers: std::mem::take(&mut parts.headers),
    };

    let mut replacement = None;
    for command in stream.info(event) {
        match command {
            StreamCommand::Headers { status, headers } => {
                parts.status = status;
                parts.headers = headers;
            }
            StreamCommand::ErrorResponse {
                status,
                headers,
                body,
            } => {
                replacement = Some(Reply {
                    status,
                    headers,
                    body,
                });
            }
            StreamCommand::Stop => break,
            other => tracing::trace!("Ignoring stream command {:?}", other),
        }
    }
    stream.terminate(TerminateReason::Normal);

    match replacement {
        Some(reply) => reply.into_response(),
        None => Response::from_parts(parts, body),
    }
}
