use axum::{
    body::Body,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;

/// A fully buffered HTTP response
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Reply {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Plain text reply carrying the canonical reason phrase
    pub fn canonical(status: StatusCode) -> Self {
        let reason = status.canonical_reason().unwrap_or("Unknown Status");
        Self::new(status).with_body(reason)
    }

    /// Buffer a response body, giving up past `limit` bytes.
    ///
    /// The length header is dropped since plugins may rewrite the body.
    pub async fn from_response(response: Response, limit: usize) -> Result<Self, axum::Error> {
        let (mut parts, body) = response.into_parts();
        let body = axum::body::to_bytes(body, limit).await?;
        parts.headers.remove(header::CONTENT_LENGTH);
        Ok(Self {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
