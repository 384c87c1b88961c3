pub mod middleware;
pub mod pages;
pub mod resolver;
pub mod stream;

pub use middleware::status_pages;
pub use pages::ConfiguredStatusPages;
pub use resolver::{NoStatusPages, RequestHead, Resolution, StatusPage, StatusPageResolver};
pub use stream::{
    early_error, ForwardHandler, StatusPageStream, StreamCommand, StreamEvent, StreamHandler,
    StreamState, TerminateReason,
};
