use axum::http::{request::Parts, HeaderMap, Method, Uri};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;

use crate::models::Reply;

/// Values plugins attach to a request for downstream handlers.
///
/// Inserted into the request extensions after the pre-request phase, so a
/// handler can pick them up with `Extension<Assigns>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assigns(pub HashMap<String, Value>);

impl Assigns {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// State threaded through the plugins of one request
#[derive(Debug, Clone)]
pub struct RequestState {
    /// Unique request identifier
    pub request_id: String,
    /// HTTP method
    pub method: Method,
    /// Request URI (path and query)
    pub uri: Uri,
    /// Request headers; pre-request plugins may rewrite them
    pub headers: HeaderMap,
    /// Data shared between plugins and handlers
    pub assigns: HashMap<String, Value>,
    /// Response: filled by the handler before post-request, or by a plugin that aborts
    pub reply: Option<Reply>,
    /// Request timestamp (Unix epoch seconds)
    pub timestamp: i64,
    /// ISO8601 formatted timestamp
    pub timestamp_iso: String,
    /// When the request entered the pipeline
    pub started: Instant,
}

impl RequestState {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        let now = chrono::Utc::now();
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            method,
            uri,
            headers,
            assigns: HashMap::new(),
            reply: None,
            timestamp: now.timestamp(),
            timestamp_iso: now.to_rfc3339(),
            started: Instant::now(),
        }
    }

    pub fn from_parts(parts: &Parts) -> Self {
        Self::new(parts.method.clone(), parts.uri.clone(), parts.headers.clone())
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn assign(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.assigns.insert(key.into(), value.into());
    }

    pub fn respond(mut self, reply: Reply) -> Self {
        self.reply = Some(reply);
        self
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Short request id (first 8 chars) for file naming
    pub fn short_request_id(&self) -> String {
        self.request_id.chars().take(8).collect()
    }
}
