use std::sync::Arc;

use super::catalog::PluginCatalog;
use super::context::RequestState;
use super::registry::PluginRegistry;
use super::traits::PluginOutcome;
use crate::error::RegistryError;
use crate::models::Phase;

/// How a phase ended
#[derive(Debug)]
pub enum PhaseResult {
    /// Every plugin continued, or one short-circuited; the request goes on
    Continue(RequestState),
    /// A plugin aborted the request
    Halt(RequestState),
    /// A plugin reported a failure
    Failed { module: String, reason: String },
}

/// Runs the registered plugins of a phase in priority order
#[derive(Clone, Debug)]
pub struct Pipeline {
    registry: PluginRegistry,
    catalog: Arc<PluginCatalog>,
}

impl Pipeline {
    pub fn new(registry: PluginRegistry, catalog: Arc<PluginCatalog>) -> Self {
        Self { registry, catalog }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &Arc<PluginCatalog> {
        &self.catalog
    }

    /// Whether any plugin is registered for the phase right now
    pub async fn has_plugins(&self, phase: Phase) -> Result<bool, RegistryError> {
        Ok(!self.registry.get_plugins(phase).await?.is_empty())
    }

    pub async fn run_phase(
        &self,
        phase: Phase,
        mut state: RequestState,
    ) -> Result<PhaseResult, RegistryError> {
        let entries = self.registry.get_plugins(phase).await?;

        for prioritized in entries {
            let entry = prioritized.entry;
            let Some(plugin) = self.catalog.get(&entry.module) else {
                tracing::warn!("Skipping plugin {}: module not in catalog", entry.module);
                continue;
            };

            let outcome = match phase {
                Phase::PreRequest => plugin.pre_request(state, &entry.options).await,
                Phase::PostRequest => plugin.post_request(state, &entry.options).await,
            };

            state = match outcome {
                PluginOutcome::Continue(next) => next,
                PluginOutcome::ShortCircuit(next) => {
                    tracing::debug!("{} short-circuited {}", entry.module, phase);
                    return Ok(PhaseResult::Continue(next));
                }
                PluginOutcome::Abort(next) => {
                    tracing::info!(
                        "{} aborted request {} during {}",
                        entry.module,
                        next.request_id,
                        phase
                    );
                    return Ok(PhaseResult::Halt(next));
                }
                PluginOutcome::Fail(reason) => {
                    tracing::error!("Plugin {} failed during {}: {}", entry.module, phase, reason);
                    return Ok(PhaseResult::Failed {
                        module: entry.module,
                        reason,
                    });
                }
            };
        }

        Ok(PhaseResult::Continue(state))
    }
}
