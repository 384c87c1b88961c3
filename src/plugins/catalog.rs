use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::builtin::{FileLoggerPlugin, MaintenancePlugin, RequestIdPlugin, ResponseHeadersPlugin};
use super::traits::Plugin;
use crate::models::PluginInfo;

/// Table of plugin implementations, keyed by module name.
///
/// Registry entries only carry the module name; the pipeline resolves it here
/// on every dispatch.
#[derive(Clone, Default)]
pub struct PluginCatalog {
    plugins: BTreeMap<String, Arc<dyn Plugin>>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the bundled plugins; `log_dir` is used by `file_logger`
    pub fn with_builtins(log_dir: PathBuf) -> Self {
        Self::new()
            .with(RequestIdPlugin::NAME, Arc::new(RequestIdPlugin))
            .with(ResponseHeadersPlugin::NAME, Arc::new(ResponseHeadersPlugin))
            .with(MaintenancePlugin::NAME, Arc::new(MaintenancePlugin))
            .with(FileLoggerPlugin::NAME, Arc::new(FileLoggerPlugin::new(log_dir)))
    }

    /// Add (or replace) an implementation
    pub fn with(mut self, name: impl Into<String>, plugin: Arc<dyn Plugin>) -> Self {
        let name = name.into();
        if self.plugins.insert(name.clone(), plugin).is_some() {
            tracing::warn!("Plugin module replaced in catalog: {}", name);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Module names with their self-description, sorted by name
    pub fn infos(&self) -> Vec<(String, PluginInfo)> {
        self.plugins
            .iter()
            .map(|(name, plugin)| (name.clone(), plugin.plugin_info()))
            .collect()
    }
}

impl std::fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginCatalog")
            .field("modules", &self.plugins.keys().collect::<Vec<_>>())
            .finish()
    }
}
