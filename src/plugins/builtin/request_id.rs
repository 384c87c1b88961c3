use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue};

use super::option_str;
use crate::models::{OptionInfo, PluginInfo, PluginOptions};
use crate::plugins::{Plugin, PluginOutcome, RequestState};

const DEFAULT_HEADER: &str = "x-request-id";

/// Makes sure every request carries an id header and echoes it on the response.
///
/// An incoming id is kept and becomes the request id of the state; otherwise
/// the generated one is used.
pub struct RequestIdPlugin;

impl RequestIdPlugin {
    pub const NAME: &'static str = "request_id";

    fn header_name(options: &PluginOptions) -> Result<HeaderName, String> {
        let name = option_str(options, "header").unwrap_or(DEFAULT_HEADER);
        HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| format!("invalid header name '{}': {}", name, e))
    }
}

#[async_trait]
impl Plugin for RequestIdPlugin {
    async fn pre_request(&self, mut state: RequestState, options: &PluginOptions) -> PluginOutcome {
        let header = match Self::header_name(options) {
            Ok(h) => h,
            Err(e) => return PluginOutcome::Fail(e),
        };

        let incoming = state
            .headers
            .get(&header)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        match incoming {
            Some(id) => state.request_id = id,
            None => match HeaderValue::from_str(&state.request_id) {
                Ok(value) => {
                    state.headers.insert(header, value);
                }
                Err(e) => return PluginOutcome::Fail(format!("request id not a header value: {}", e)),
            },
        }

        let id = state.request_id.clone();
        state.assign("request_id", id);
        PluginOutcome::Continue(state)
    }

    async fn post_request(&self, mut state: RequestState, options: &PluginOptions) -> PluginOutcome {
        let header = match Self::header_name(options) {
            Ok(h) => h,
            Err(e) => return PluginOutcome::Fail(e),
        };

        if let (Some(reply), Ok(value)) = (
            state.reply.as_mut(),
            HeaderValue::from_str(&state.request_id),
        ) {
            reply.headers.insert(header, value);
        }
        PluginOutcome::Continue(state)
    }

    fn plugin_info(&self) -> PluginInfo {
        PluginInfo {
            title: "Request id".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            author: "plugcast".to_string(),
            description: "Propagates a request id header from request to response".to_string(),
            options: vec![OptionInfo::new(
                "header",
                "Header carrying the id (default x-request-id)",
            )],
        }
    }
}
