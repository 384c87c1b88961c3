use async_trait::async_trait;

use super::context::RequestState;
use crate::models::{PluginInfo, PluginOptions};

/// Result of a single plugin call
#[derive(Debug)]
pub enum PluginOutcome {
    /// Hand the state to the next plugin
    Continue(RequestState),
    /// Stop running plugins for this phase; the request goes on
    ShortCircuit(RequestState),
    /// Stop the request; the state's reply (if any) is sent
    Abort(RequestState),
    /// Report an error
    Fail(String),
}

/// Plugin trait for intercepting the request lifecycle
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Called before the request reaches its handler
    async fn pre_request(&self, state: RequestState, options: &PluginOptions) -> PluginOutcome;

    /// Called after the handler produced a response
    async fn post_request(&self, state: RequestState, options: &PluginOptions) -> PluginOutcome;

    /// Describe the plugin and the options it understands
    fn plugin_info(&self) -> PluginInfo;
}
