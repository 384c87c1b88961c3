pub mod builtin;
pub mod catalog;
pub mod context;
pub mod pipeline;
pub mod registry;
pub mod traits;

pub use catalog::PluginCatalog;
pub use context::{Assigns, RequestState};
pub use pipeline::{PhaseResult, Pipeline};
pub use registry::{PluginRegistry, RegistryState};
pub use traits::{Plugin, PluginOutcome};
