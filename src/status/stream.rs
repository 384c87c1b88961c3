//! Status-page interception as a stream handler.
//!
//! A [`StatusPageStream`] sits in front of the next handler of a response's
//! chain. Response events whose status the resolver knows are swapped for an
//! error response followed by a stop; everything else goes through untouched.

use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use std::sync::Arc;

use super::resolver::{resolve_or_passthrough, RequestHead, Resolution, StatusPageResolver};
use crate::models::Reply;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Initialized,
    Streaming,
    Terminated,
}

/// Events travelling down the chain
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A complete response
    Response {
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },
    /// Start of a response whose body follows as data
    Headers {
        status: StatusCode,
        headers: HeaderMap,
    },
    /// Anything else the chain may care about
    Info(String),
}

/// Instructions returned to the connection
#[derive(Debug, Clone, PartialEq)]
pub enum StreamCommand {
    Response {
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },
    Headers {
        status: StatusCode,
        headers: HeaderMap,
    },
    Data {
        chunk: Bytes,
        fin: bool,
    },
    Info(String),
    ErrorResponse {
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminateReason {
    Normal,
    Error(String),
}

/// One link of a stream chain
pub trait StreamHandler: Send {
    fn data(&mut self, chunk: Bytes, fin: bool) -> Vec<StreamCommand>;
    fn info(&mut self, event: StreamEvent) -> Vec<StreamCommand>;
    fn terminate(&mut self, reason: &TerminateReason);
}

/// End of the chain: turns every event into the matching command
#[derive(Debug, Default)]
pub struct ForwardHandler {
    terminated: Option<TerminateReason>,
}

impl ForwardHandler {
    pub fn terminated(&self) -> Option<&TerminateReason> {
        self.terminated.as_ref()
    }
}

impl StreamHandler for ForwardHandler {
    fn data(&mut self, chunk: Bytes, fin: bool) -> Vec<StreamCommand> {
        vec![StreamCommand::Data { chunk, fin }]
    }

    fn info(&mut self, event: StreamEvent) -> Vec<StreamCommand> {
        let command = match event {
            StreamEvent::Response {
                status,
                headers,
                body,
            } => StreamCommand::Response {
                status,
                headers,
                body,
            },
            StreamEvent::Headers { status, headers } => StreamCommand::Headers { status, headers },
            StreamEvent::Info(message) => StreamCommand::Info(message),
        };
        vec![command]
    }

    fn terminate(&mut self, reason: &TerminateReason) {
        self.terminated = Some(reason.clone());
    }
}

/// Per-response adapter substituting configured status pages
pub struct StatusPageStream<H> {
    request: RequestHead,
    next: H,
    resolver: Arc<dyn StatusPageResolver>,
    state: StreamState,
    next_terminated: bool,
}

impl<H: StreamHandler> StatusPageStream<H> {
    pub fn new(request: RequestHead, next: H, resolver: Arc<dyn StatusPageResolver>) -> Self {
        Self {
            request,
            next,
            resolver,
            state: StreamState::Initialized,
            next_terminated: false,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn request(&self) -> &RequestHead {
        &self.request
    }

    pub fn next_handler(&self) -> &H {
        &self.next
    }

    pub fn data(&mut self, chunk: Bytes, fin: bool) -> Vec<StreamCommand> {
        if self.state == StreamState::Terminated {
            return Vec::new();
        }
        self.state = StreamState::Streaming;
        self.next.data(chunk, fin)
    }

    pub fn info(&mut self, event: StreamEvent) -> Vec<StreamCommand> {
        if self.state == StreamState::Terminated {
            return Vec::new();
        }

        let status = match &event {
            StreamEvent::Response { status, .. } | StreamEvent::Headers { status, .. } => {
                Some(*status)
            }
            StreamEvent::Info(_) => None,
        };

        if let Some(status) = status {
            match resolve_or_passthrough(self.resolver.as_ref(), status.as_u16(), &self.request) {
                Resolution::Replace(page) => {
                    tracing::debug!(
                        "Replacing {} response for {} {} with status page {} ({:?})",
                        status,
                        self.request.method,
                        self.request.path(),
                        page.status,
                        page.metadata
                    );
                    self.state = StreamState::Terminated;
                    return vec![
                        StreamCommand::ErrorResponse {
                            status: page.status,
                            headers: page.headers,
                            body: page.body,
                        },
                        StreamCommand::Stop,
                    ];
                }
                Resolution::UpdateRequest(head) => {
                    self.request = head;
                }
                Resolution::NoOverride => {}
            }
        }

        self.state = StreamState::Streaming;
        self.next.info(event)
    }

    pub fn terminate(&mut self, reason: TerminateReason) {
        self.state = StreamState::Terminated;
        if !self.next_terminated {
            self.next_terminated = true;
            self.next.terminate(&reason);
        }
    }
}

/// Status-page substitution for a response produced before any handler ran
pub fn early_error(resolver: &dyn StatusPageResolver, request: &RequestHead, response: Reply) -> Reply {
    match resolve_or_passthrough(resolver, response.status.as_u16(), request) {
        Resolution::Replace(page) => {
            tracing::debug!(
                "Replacing early {} for {} with status page {}",
                response.status,
                request.path(),
                page.status
            );
            page.into_reply()
        }
        Resolution::UpdateRequest(_) | Resolution::NoOverride => response,
    }
}
