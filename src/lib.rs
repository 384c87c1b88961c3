//! Request plugin registry with status-page substitution for axum services.
//!
//! Plugins are registered per phase with a priority and run around every
//! request by [`server::plugin_lifecycle`]. Responses whose status has a
//! configured page are replaced by [`status::status_pages`].

pub mod config;
pub mod error;
pub mod models;
pub mod plugins;
pub mod server;
pub mod status;

pub use config::AppConfig;
pub use error::{ConfigError, RegistryError, ResolveError};
pub use plugins::{PluginCatalog, PluginRegistry};
