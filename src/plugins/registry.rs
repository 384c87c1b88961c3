use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use super::catalog::PluginCatalog;
use crate::config::SeedEntry;
use crate::error::RegistryError;
use crate::models::{
    Phase, PluginEntry, PluginId, PluginOptions, PrioritizedEntry, RegistrySnapshot,
    DEFAULT_PRIORITY,
};

/// The two phase lists, kept sorted by priority.
///
/// Equal priorities keep registration order. No id appears twice across
/// both lists.
#[derive(Debug, Default)]
pub struct RegistryState {
    pre_request: Vec<PrioritizedEntry>,
    post_request: Vec<PrioritizedEntry>,
}

impl RegistryState {
    pub fn new() -> Self {
        Self::default()
    }

    fn list_mut(&mut self, phase: Phase) -> &mut Vec<PrioritizedEntry> {
        match phase {
            Phase::PreRequest => &mut self.pre_request,
            Phase::PostRequest => &mut self.post_request,
        }
    }

    pub fn plugins(&self, phase: Phase) -> &[PrioritizedEntry] {
        match phase {
            Phase::PreRequest => &self.pre_request,
            Phase::PostRequest => &self.post_request,
        }
    }

    pub fn contains(&self, id: PluginId) -> bool {
        Phase::ALL
            .iter()
            .any(|phase| self.plugins(*phase).iter().any(|e| e.entry.id == id))
    }

    /// Insert after every entry whose priority is lower or equal
    pub fn insert(
        &mut self,
        phase: Phase,
        priority: i32,
        entry: PluginEntry,
    ) -> Result<(), RegistryError> {
        if self.contains(entry.id) {
            return Err(RegistryError::DuplicateId(entry.id));
        }

        let list = self.list_mut(phase);
        let at = list.partition_point(|e| e.priority <= priority);
        list.insert(at, PrioritizedEntry { priority, entry });
        Ok(())
    }

    /// Remove the id from both phases; returns how many entries went away
    pub fn remove(&mut self, id: PluginId) -> usize {
        let before = self.len();
        self.pre_request.retain(|e| e.entry.id != id);
        self.post_request.retain(|e| e.entry.id != id);
        before - self.len()
    }

    pub fn len(&self) -> usize {
        self.pre_request.len() + self.post_request.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            pre_request: self.pre_request.clone(),
            post_request: self.post_request.clone(),
        }
    }
}

type Ack<T> = oneshot::Sender<T>;

/// Internal message for the registry actor.
enum Command {
    Register {
        phase: Phase,
        priority: i32,
        entry: PluginEntry,
        ack: Option<Ack<Result<PluginId, RegistryError>>>,
    },
    Unregister {
        id: PluginId,
        reply: Ack<()>,
    },
    GetPlugins {
        phase: Phase,
        reply: Ack<Vec<PrioritizedEntry>>,
    },
    GetAll {
        reply: Ack<RegistrySnapshot>,
    },
}

/// Owner of the registry state; runs as a background task.
struct RegistryActor {
    state: RegistryState,
    catalog: Arc<PluginCatalog>,
}

impl RegistryActor {
    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<Command>) {
        tracing::info!(
            "Plugin registry started ({} modules available)",
            self.catalog.len()
        );

        while let Some(command) = receiver.recv().await {
            self.handle(command);
        }

        tracing::info!(
            "Plugin registry shutting down with {} entries",
            self.state.len()
        );
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Register {
                phase,
                priority,
                entry,
                ack,
            } => {
                let module = entry.module.clone();
                let result = self.apply_register(phase, priority, entry);
                match &result {
                    Ok(id) => tracing::info!(
                        "Registered plugin {} ({}) for {} at priority {}",
                        module,
                        id,
                        phase,
                        priority
                    ),
                    Err(e) => tracing::warn!("Dropping {} registration of {}: {}", phase, module, e),
                }
                if let Some(ack) = ack {
                    let _ = ack.send(result);
                }
            }
            Command::Unregister { id, reply } => {
                let removed = self.state.remove(id);
                tracing::debug!("Unregister {}: {} entries removed", id, removed);
                let _ = reply.send(());
            }
            Command::GetPlugins { phase, reply } => {
                let _ = reply.send(self.state.plugins(phase).to_vec());
            }
            Command::GetAll { reply } => {
                let _ = reply.send(self.state.snapshot());
            }
        }
    }

    fn apply_register(
        &mut self,
        phase: Phase,
        priority: i32,
        entry: PluginEntry,
    ) -> Result<PluginId, RegistryError> {
        let plugin = self
            .catalog
            .get(&entry.module)
            .ok_or_else(|| RegistryError::UnknownModule(entry.module.clone()))?;

        let info = plugin.plugin_info();
        for key in entry.options.keys() {
            if !info.recognizes(key) {
                tracing::warn!("Plugin {} does not recognize option '{}'", entry.module, key);
            }
        }

        let id = entry.id;
        self.state.insert(phase, priority, entry)?;
        Ok(id)
    }
}

/// Handle to the plugin registry.
///
/// Cheap to clone; every clone talks to the same actor. The actor stops once
/// the last handle is dropped.
#[derive(Clone)]
pub struct PluginRegistry {
    sender: mpsc::UnboundedSender<Command>,
}

impl PluginRegistry {
    /// Spawn the actor on the current tokio runtime
    pub fn spawn(catalog: Arc<PluginCatalog>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let actor = RegistryActor {
            state: RegistryState::new(),
            catalog,
        };
        tokio::spawn(actor.run(receiver));
        Self { sender }
    }

    /// Spawn and register every seed as a runtime registration would
    pub fn spawn_seeded(catalog: Arc<PluginCatalog>, seeds: &[SeedEntry]) -> Self {
        let registry = Self::spawn(catalog);
        for seed in seeds {
            registry.register(
                seed.phase,
                seed.module.clone(),
                seed.options.clone(),
                seed.priority,
            );
        }
        tracing::info!("Seeded plugin registry with {} entries", seeds.len());
        registry
    }

    /// Queue a registration and return its id without waiting.
    ///
    /// The id is not a confirmation: rejected registrations only show up in
    /// the logs.
    pub fn register(
        &self,
        phase: Phase,
        module: impl Into<String>,
        options: PluginOptions,
        priority: i32,
    ) -> PluginId {
        let entry = PluginEntry::new(module, options);
        let id = entry.id;
        let command = Command::Register {
            phase,
            priority,
            entry,
            ack: None,
        };
        if self.sender.send(command).is_err() {
            tracing::warn!("Plugin registry is not running, dropping registration {}", id);
        }
        id
    }

    /// Register with empty options at the default priority
    pub fn register_default(&self, phase: Phase, module: impl Into<String>) -> PluginId {
        self.register(phase, module, PluginOptions::new(), DEFAULT_PRIORITY)
    }

    /// Register and wait until the actor applied or rejected the entry
    pub async fn register_and_wait(
        &self,
        phase: Phase,
        module: impl Into<String>,
        options: PluginOptions,
        priority: i32,
    ) -> Result<PluginId, RegistryError> {
        let entry = PluginEntry::new(module, options);
        self.request(|ack| Command::Register {
            phase,
            priority,
            entry,
            ack: Some(ack),
        })
        .await?
    }

    /// Remove the id from every phase; unknown ids are a no-op
    pub async fn unregister(&self, id: PluginId) -> Result<(), RegistryError> {
        self.request(|reply| Command::Unregister { id, reply }).await
    }

    pub async fn get_plugins(&self, phase: Phase) -> Result<Vec<PrioritizedEntry>, RegistryError> {
        self.request(|reply| Command::GetPlugins { phase, reply }).await
    }

    pub async fn get_all_plugins(&self) -> Result<RegistrySnapshot, RegistryError> {
        self.request(|reply| Command::GetAll { reply }).await
    }

    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }

    async fn request<T>(&self, command: impl FnOnce(Ack<T>) -> Command) -> Result<T, RegistryError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(command(tx))
            .map_err(|_| RegistryError::Closed)?;
        rx.await.map_err(|_| RegistryError::Closed)
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("running", &self.is_running())
            .finish()
    }
}
