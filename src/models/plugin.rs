use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Priority used when a registration does not name one
pub const DEFAULT_PRIORITY: i32 = 50;

/// Options handed to a plugin on every call
pub type PluginOptions = serde_json::Map<String, serde_json::Value>;

/// Lifecycle point at which a plugin runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Phase {
    PreRequest,
    PostRequest,
}

impl Phase {
    pub const ALL: [Phase; 2] = [Phase::PreRequest, Phase::PostRequest];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::PreRequest => "pre_request",
            Phase::PostRequest => "post_request",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pre_request" | "pre-request" | "pre" => Ok(Phase::PreRequest),
            "post_request" | "post-request" | "post" => Ok(Phase::PostRequest),
            other => Err(ConfigError::InvalidPhase(other.to_string())),
        }
    }
}

impl TryFrom<String> for Phase {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Opaque identifier handed out at registration time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(uuid::Uuid);

impl PluginId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for PluginId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PluginId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s).map(Self)
    }
}

/// A registered plugin: which module to call and with which options
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginEntry {
    pub id: PluginId,
    /// Catalog name of the implementation
    pub module: String,
    pub options: PluginOptions,
}

impl PluginEntry {
    pub fn new(module: impl Into<String>, options: PluginOptions) -> Self {
        Self {
            id: PluginId::new(),
            module: module.into(),
            options,
        }
    }
}

/// Entry of a phase list together with its priority
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrioritizedEntry {
    pub priority: i32,
    #[serde(flatten)]
    pub entry: PluginEntry,
}

/// Both phase lists as seen at one point of the registry's command order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegistrySnapshot {
    pub pre_request: Vec<PrioritizedEntry>,
    pub post_request: Vec<PrioritizedEntry>,
}

impl RegistrySnapshot {
    pub fn phase(&self, phase: Phase) -> &[PrioritizedEntry] {
        match phase {
            Phase::PreRequest => &self.pre_request,
            Phase::PostRequest => &self.post_request,
        }
    }

    pub fn len(&self) -> usize {
        self.pre_request.len() + self.post_request.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every entry of both phases, pre-request first
    pub fn entries(&self) -> impl Iterator<Item = (Phase, &PrioritizedEntry)> {
        self.pre_request
            .iter()
            .map(|e| (Phase::PreRequest, e))
            .chain(self.post_request.iter().map(|e| (Phase::PostRequest, e)))
    }
}

/// Descriptive metadata a plugin reports about itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub title: String,
    pub version: String,
    pub author: String,
    pub description: String,
    #[serde(default)]
    pub options: Vec<OptionInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionInfo {
    pub name: String,
    pub description: String,
}

impl OptionInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

impl PluginInfo {
    pub fn recognizes(&self, option: &str) -> bool {
        self.options.iter().any(|o| o.name == option)
    }
}
