use async_trait::async_trait;
use axum::http::{header, HeaderValue, StatusCode};

use super::{option_bool, option_str};
use crate::models::{OptionInfo, PluginInfo, PluginOptions, Reply};
use crate::plugins::{Plugin, PluginOutcome, RequestState};

const DEFAULT_MESSAGE: &str = "Service temporarily unavailable for maintenance";

/// Answers 503 while `enabled` is set, except for paths listed in `allow`
pub struct MaintenancePlugin;

impl MaintenancePlugin {
    pub const NAME: &'static str = "maintenance";

    fn is_allowed(options: &PluginOptions, path: &str) -> bool {
        options
            .get("allow")
            .and_then(|v| v.as_array())
            .map(|paths| paths.iter().filter_map(|p| p.as_str()).any(|p| p == path))
            .unwrap_or(false)
    }
}

#[async_trait]
impl Plugin for MaintenancePlugin {
    async fn pre_request(&self, state: RequestState, options: &PluginOptions) -> PluginOutcome {
        if !option_bool(options, "enabled").unwrap_or(false) || Self::is_allowed(options, state.path()) {
            return PluginOutcome::Continue(state);
        }

        let message = option_str(options, "message").unwrap_or(DEFAULT_MESSAGE);
        let mut reply = Reply::new(StatusCode::SERVICE_UNAVAILABLE).with_body(message.to_string());
        reply.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        if let Some(retry) = options.get("retry_after").and_then(|v| v.as_u64()) {
            reply.headers.insert(header::RETRY_AFTER, HeaderValue::from(retry));
        }

        PluginOutcome::Abort(state.respond(reply))
    }

    async fn post_request(&self, state: RequestState, _options: &PluginOptions) -> PluginOutcome {
        PluginOutcome::Continue(state)
    }

    fn plugin_info(&self) -> PluginInfo {
        PluginInfo {
            title: "Maintenance mode".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            author: "plugcast".to_string(),
            description: "Rejects requests with 503 while maintenance is on".to_string(),
            options: vec![
                OptionInfo::new("enabled", "Turn maintenance mode on (default false)"),
                OptionInfo::new("message", "Body of the 503 response"),
                OptionInfo::new("allow", "Paths still served during maintenance"),
                OptionInfo::new("retry_after", "Seconds for the Retry-After header"),
            ],
        }
    }
}
