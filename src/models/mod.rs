pub mod plugin;
pub mod reply;

pub use plugin::{
    OptionInfo, Phase, PluginEntry, PluginId, PluginInfo, PluginOptions, PrioritizedEntry,
    RegistrySnapshot, DEFAULT_PRIORITY,
};
pub use reply::Reply;
