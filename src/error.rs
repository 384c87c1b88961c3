use std::path::PathBuf;
use thiserror::Error;

use crate::models::PluginId;

/// Errors returned by the plugin registry handle
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("plugin registry is not running")]
    Closed,

    #[error("unknown plugin module: {0}")]
    UnknownModule(String),

    #[error("plugin id already registered: {0}")]
    DuplicateId(PluginId),
}

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid status code: {0}")]
    InvalidStatusCode(u16),

    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("invalid plugin phase: {0}")]
    InvalidPhase(String),
}

/// Error reported by a status page resolver; treated as "no override"
#[derive(Debug, Error)]
#[error("status page resolver failed: {0}")]
pub struct ResolveError(pub String);
