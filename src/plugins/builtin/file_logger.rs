use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::option_bool;
use crate::models::{OptionInfo, PluginInfo, PluginOptions};
use crate::plugins::{Plugin, PluginOutcome, RequestState};

const DEFAULT_RETENTION_DAYS: u64 = 30;

/// JSON structure written for every request
#[derive(Debug, Serialize, Deserialize)]
pub struct RequestLogEntry {
    pub request_id: String,
    pub timestamp: i64,
    pub timestamp_iso: String,
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub status_code: Option<u16>,
    pub duration_ms: u64,
    pub response_bytes: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_headers: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<BTreeMap<String, String>>,
}

impl RequestLogEntry {
    pub fn from_state(state: &RequestState, include_headers: bool) -> Self {
        let reply = state.reply.as_ref();
        Self {
            request_id: state.request_id.clone(),
            timestamp: state.timestamp,
            timestamp_iso: state.timestamp_iso.clone(),
            method: state.method.to_string(),
            path: state.path().to_string(),
            query: state.uri.query().map(str::to_string),
            status_code: reply.map(|r| r.status.as_u16()),
            duration_ms: state.elapsed_ms(),
            response_bytes: reply.map(|r| r.body.len()).unwrap_or(0),
            request_headers: include_headers.then(|| header_map(&state.headers)),
            response_headers: reply
                .filter(|_| include_headers)
                .map(|r| header_map(&r.headers)),
        }
    }
}

/// Replaces characters that are unsafe in a file name
fn file_safe(part: &str) -> String {
    part.replace(['/', ':', '.', '?', '*', '\\'], "_")
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
        .collect()
}

/// Post-request plugin that saves one JSON file per request.
///
/// Files land in `<log_dir>/<YYYY-MM-DD>/`. Write errors are logged and never
/// affect the response.
pub struct FileLoggerPlugin {
    /// Base directory for log files
    log_dir: PathBuf,
    /// Retention period in days
    retention_days: u64,
}

impl FileLoggerPlugin {
    pub const NAME: &'static str = "file_logger";

    pub fn new(log_dir: PathBuf) -> Self {
        Self {
            log_dir,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }

    pub fn with_retention_days(mut self, days: u64) -> Self {
        self.retention_days = days;
        self
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Directory for a given day
    fn day_dir(&self, state: &RequestState) -> PathBuf {
        let day = chrono::DateTime::from_timestamp(state.timestamp, 0)
            .unwrap_or_else(chrono::Utc::now)
            .format("%Y-%m-%d")
            .to_string();
        self.log_dir.join(day)
    }

    /// Generate log file name based on timestamp and request info
    fn generate_filename(state: &RequestState) -> String {
        let timestamp = chrono::Utc::now().format("%H%M%S%3f");
        let path = state.path().trim_matches('/');
        let path = if path.is_empty() { "root" } else { path };
        format!(
            "{}_{}_{}_{}.json",
            timestamp,
            file_safe(&state.short_request_id()),
            state.method,
            file_safe(path)
        )
    }

    async fn write_log(&self, state: &RequestState, include_headers: bool) {
        let dir = self.day_dir(state);

        // Ensure directory exists
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            tracing::error!("Failed to create log directory {:?}: {}", dir, e);
            return;
        }

        let filepath = dir.join(Self::generate_filename(state));
        let entry = RequestLogEntry::from_state(state, include_headers);

        match serde_json::to_string_pretty(&entry) {
            Ok(json) => {
                if let Err(e) = tokio::fs::write(&filepath, json).await {
                    tracing::error!("Failed to write log file {:?}: {}", filepath, e);
                } else {
                    tracing::debug!("Request log written: {:?}", filepath);
                }
            }
            Err(e) => {
                tracing::error!("Failed to serialize log entry: {}", e);
            }
        }
    }

    /// Delete files older than the retention period, then empty day directories
    pub async fn cleanup_old_logs(&self) -> u64 {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(self.retention_days as i64);
        let cutoff_timestamp = cutoff.timestamp();

        let mut entries = match tokio::fs::read_dir(&self.log_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("No log directory to clean: {}", e);
                return 0;
            }
        };

        let mut deleted_count = 0u64;
        let mut deleted_dirs = 0u64;

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            let mut day_entries = match tokio::fs::read_dir(&path).await {
                Ok(e) => e,
                Err(_) => continue,
            };

            let mut file_count = 0u64;
            let mut day_deleted = 0u64;

            while let Ok(Some(file_entry)) = day_entries.next_entry().await {
                file_count += 1;
                let file_path = file_entry.path();

                let modified = match tokio::fs::metadata(&file_path)
                    .await
                    .and_then(|m| m.modified())
                {
                    Ok(modified) => modified
                        .duration_since(std::time::UNIX_EPOCH)
                        .map(|d| d.as_secs() as i64)
                        .unwrap_or(0),
                    Err(_) => continue,
                };

                if modified < cutoff_timestamp {
                    if let Err(e) = tokio::fs::remove_file(&file_path).await {
                        tracing::warn!("Failed to delete old log file {:?}: {}", file_path, e);
                    } else {
                        deleted_count += 1;
                        day_deleted += 1;
                    }
                }
            }

            if file_count == day_deleted && file_count > 0 {
                if let Err(e) = tokio::fs::remove_dir(&path).await {
                    tracing::debug!("Failed to remove empty log dir {:?}: {}", path, e);
                } else {
                    deleted_dirs += 1;
                }
            }
        }

        if deleted_count > 0 || deleted_dirs > 0 {
            tracing::info!(
                "Request log cleanup: deleted {} files and {} empty directories (retention: {} days)",
                deleted_count,
                deleted_dirs,
                self.retention_days
            );
        }
        deleted_count
    }
}

#[async_trait]
impl Plugin for FileLoggerPlugin {
    async fn pre_request(&self, state: RequestState, _options: &PluginOptions) -> PluginOutcome {
        PluginOutcome::Continue(state)
    }

    async fn post_request(&self, state: RequestState, options: &PluginOptions) -> PluginOutcome {
        let include_headers = option_bool(options, "include_headers").unwrap_or(false);
        self.write_log(&state, include_headers).await;
        PluginOutcome::Continue(state)
    }

    fn plugin_info(&self) -> PluginInfo {
        PluginInfo {
            title: "File logger".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            author: "plugcast".to_string(),
            description: "Writes a JSON record of every request to the log directory".to_string(),
            options: vec![OptionInfo::new(
                "include_headers",
                "Also record request and response headers (default false)",
            )],
        }
    }
}
