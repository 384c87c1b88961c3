use axum::http::{request::Parts, HeaderMap, Method, Request, StatusCode, Uri};
use bytes::Bytes;

use crate::error::ResolveError;
use crate::models::Reply;

/// Request snapshot the resolver gets to look at
#[derive(Debug, Clone, PartialEq)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl RequestHead {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        Self {
            method,
            uri,
            headers,
        }
    }

    pub fn from_parts(parts: &Parts) -> Self {
        Self::new(parts.method.clone(), parts.uri.clone(), parts.headers.clone())
    }

    pub fn from_request<B>(request: &Request<B>) -> Self {
        Self::new(
            request.method().clone(),
            request.uri().clone(),
            request.headers().clone(),
        )
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }
}

/// Replacement response offered by a resolver
#[derive(Debug, Clone, PartialEq)]
pub struct StatusPage {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Free-form details about where the page came from; logged only
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl StatusPage {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn into_reply(self) -> Reply {
        Reply {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

/// What a resolver decided for a status code
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Discard the original response and send this page instead
    Replace(StatusPage),
    /// Keep the response, but use this request for later lookups
    UpdateRequest(RequestHead),
    /// Leave everything as it is
    NoOverride,
}

/// Maps a status code and request to an optional custom response
pub trait StatusPageResolver: Send + Sync {
    fn resolve(&self, status: u16, request: &RequestHead) -> Result<Resolution, ResolveError>;
}

/// Resolver that never overrides anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStatusPages;

impl StatusPageResolver for NoStatusPages {
    fn resolve(&self, _status: u16, _request: &RequestHead) -> Result<Resolution, ResolveError> {
        Ok(Resolution::NoOverride)
    }
}

/// Ask the resolver; a failing resolver counts as "no override"
pub fn resolve_or_passthrough(
    resolver: &dyn StatusPageResolver,
    status: u16,
    request: &RequestHead,
) -> Resolution {
    match resolver.resolve(status, request) {
        Ok(resolution) => resolution,
        Err(e) => {
            tracing::warn!(
                "Status page lookup for {} {} failed, keeping response: {}",
                status,
                request.path(),
                e
            );
            Resolution::NoOverride
        }
    }
}
