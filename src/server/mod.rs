pub mod admin;
pub mod app;
pub mod lifecycle;

pub use admin::admin_router;
pub use app::{build_router, AppContext, AppServer};
pub use lifecycle::{plugin_lifecycle, LifecycleState};
