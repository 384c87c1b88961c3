pub mod file_logger;
pub mod maintenance;
pub mod request_id;
pub mod response_headers;

pub use file_logger::{FileLoggerPlugin, RequestLogEntry};
pub use maintenance::MaintenancePlugin;
pub use request_id::RequestIdPlugin;
pub use response_headers::ResponseHeadersPlugin;

use crate::models::PluginOptions;

fn option_bool(options: &PluginOptions, key: &str) -> Option<bool> {
    options.get(key).and_then(|v| v.as_bool())
}

fn option_str<'a>(options: &'a PluginOptions, key: &str) -> Option<&'a str> {
    options.get(key).and_then(|v| v.as_str())
}
