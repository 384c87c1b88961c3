use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue};

use crate::models::{OptionInfo, PluginInfo, PluginOptions};
use crate::plugins::{Plugin, PluginOutcome, RequestState};

/// Sets fixed headers on every response, e.g. security headers.
///
/// `headers` is a table of name to string value. Existing values are
/// overwritten.
pub struct ResponseHeadersPlugin;

impl ResponseHeadersPlugin {
    pub const NAME: &'static str = "response_headers";

    fn parse(options: &PluginOptions) -> Result<Vec<(HeaderName, HeaderValue)>, String> {
        let Some(table) = options.get("headers") else {
            return Ok(Vec::new());
        };
        let table = table
            .as_object()
            .ok_or_else(|| "option 'headers' must be a table".to_string())?;

        table
            .iter()
            .map(|(name, value)| {
                let value = value
                    .as_str()
                    .ok_or_else(|| format!("header '{}' must be a string", name))?;
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| format!("invalid header name '{}': {}", name, e))?;
                let value = HeaderValue::from_str(value)
                    .map_err(|e| format!("invalid value for '{}': {}", name, e))?;
                Ok((name, value))
            })
            .collect()
    }
}

#[async_trait]
impl Plugin for ResponseHeadersPlugin {
    async fn pre_request(&self, state: RequestState, _options: &PluginOptions) -> PluginOutcome {
        PluginOutcome::Continue(state)
    }

    async fn post_request(&self, mut state: RequestState, options: &PluginOptions) -> PluginOutcome {
        let headers = match Self::parse(options) {
            Ok(h) => h,
            Err(e) => return PluginOutcome::Fail(e),
        };

        if let Some(reply) = state.reply.as_mut() {
            for (name, value) in headers {
                reply.headers.insert(name, value);
            }
        }
        PluginOutcome::Continue(state)
    }

    fn plugin_info(&self) -> PluginInfo {
        PluginInfo {
            title: "Response headers".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            author: "plugcast".to_string(),
            description: "Adds configured headers to every response".to_string(),
            options: vec![OptionInfo::new("headers", "Table of header name to value")],
        }
    }
}
