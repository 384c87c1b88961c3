use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::models::{Phase, PluginOptions, DEFAULT_PRIORITY};

const APP_DIR: &str = "plugcast";
const CONFIG_FILE: &str = "config.toml";

/// Application settings, read from TOML.
///
/// Every section is optional; missing keys fall back to the defaults below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    /// Registrations applied when the registry starts
    #[serde(default)]
    pub plugins: Vec<SeedEntry>,
    #[serde(default)]
    pub status_pages: Vec<StatusPageConfig>,

    /// File this config came from; `None` for built-in defaults
    #[serde(skip)]
    pub source: Option<PathBuf>,
    /// Directory of `source`
    #[serde(skip)]
    pub source_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound for buffering a response for post-request plugins
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default)]
    pub cors_permissive: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_body_bytes() -> usize {
    8 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
            cors_permissive: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter; `RUST_LOG` takes precedence
    #[serde(default = "default_level")]
    pub level: String,
    /// Also write a daily rolling log file
    #[serde(default = "default_true")]
    pub file: bool,
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: true,
            dir: None,
        }
    }
}

impl LoggingConfig {
    /// Configured directory, or `<config_dir>/plugcast/logs`
    pub fn log_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| app_dir().join("logs"))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default)]
    pub enabled: bool,
}

/// One registration read from the `plugins` list.
///
/// Accepts either a table (`phase`, `module`, `options`, `priority`) or a
/// tuple `[phase, module]`, `[phase, module, options]` or
/// `[phase, module, options, priority]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSeed")]
pub struct SeedEntry {
    pub phase: Phase,
    pub module: String,
    pub options: PluginOptions,
    pub priority: i32,
}

impl SeedEntry {
    pub fn new(phase: Phase, module: impl Into<String>) -> Self {
        Self {
            phase,
            module: module.into(),
            options: PluginOptions::new(),
            priority: DEFAULT_PRIORITY,
        }
    }

    pub fn with_options(mut self, options: PluginOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSeed {
    Table {
        phase: String,
        module: String,
        #[serde(default)]
        options: PluginOptions,
        #[serde(default)]
        priority: Option<i32>,
    },
    Pair(String, String),
    Triple(String, String, PluginOptions),
    Quad(String, String, PluginOptions, i32),
}

impl TryFrom<RawSeed> for SeedEntry {
    type Error = ConfigError;

    fn try_from(raw: RawSeed) -> Result<Self, Self::Error> {
        let (phase, module, options, priority) = match raw {
            RawSeed::Table {
                phase,
                module,
                options,
                priority,
            } => (phase, module, options, priority),
            RawSeed::Pair(phase, module) => (phase, module, PluginOptions::new(), None),
            RawSeed::Triple(phase, module, options) => (phase, module, options, None),
            RawSeed::Quad(phase, module, options, priority) => {
                (phase, module, options, Some(priority))
            }
        };

        Ok(Self {
            phase: phase.parse()?,
            module,
            options,
            priority: priority.unwrap_or(DEFAULT_PRIORITY),
        })
    }
}

/// A custom page for one intercepted status code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPageConfig {
    pub code: u16,
    /// Status sent instead of `code`; defaults to `code`
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub body: Option<String>,
    /// Read at startup; relative paths are taken from the config file's directory
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_content_type() -> String {
    "text/html; charset=utf-8".to_string()
}

impl StatusPageConfig {
    pub fn inline(code: u16, body: impl Into<String>) -> Self {
        Self {
            code,
            status: None,
            body: Some(body.into()),
            file: None,
            content_type: default_content_type(),
            headers: BTreeMap::new(),
        }
    }
}

fn app_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// `<config_dir>/plugcast/config.toml`
pub fn default_config_path() -> PathBuf {
    app_dir().join(CONFIG_FILE)
}

impl AppConfig {
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&contents)?;
        config.source = Some(path.to_path_buf());
        config.source_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Load from `path`, `PLUGCAST_CONFIG` or the default location, in that
    /// order. A missing default file yields the built-in defaults; an explicit
    /// path that cannot be read is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("PLUGCAST_CONFIG").map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => {
                tracing::info!("Loading config from {:?}", path);
                Self::from_file(&path)?
            }
            None => {
                let path = default_config_path();
                if path.exists() {
                    tracing::info!("Loading config from {:?}", path);
                    Self::from_file(&path)?
                } else {
                    tracing::info!("No config file at {:?}, using defaults", path);
                    Self::default()
                }
            }
        };

        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(port) = std::env::var("PLUGCAST_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!("Ignoring invalid PLUGCAST_PORT value: {}", port),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.max_body_bytes, 8 * 1024 * 1024);
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.file);
        assert!(!config.admin.enabled);
        assert!(config.plugins.is_empty());
        assert!(config.status_pages.is_empty());
        assert!(config.source.is_none());
    }

    #[test]
    fn test_table_and_tuple_seeds_agree() {
        let tables = AppConfig::from_toml(
            r#"
            [[plugins]]
            phase = "pre_request"
            module = "maintenance"

            [[plugins]]
            phase = "post_request"
            module = "response_headers"
            options = { headers = { "x-frame-options" = "DENY" } }

            [[plugins]]
            phase = "post_request"
            module = "file_logger"
            priority = 90
            "#,
        )
        .unwrap();

        let tuples = AppConfig::from_toml(
            r#"
            plugins = [
                ["pre_request", "maintenance"],
                ["post_request", "response_headers", { headers = { "x-frame-options" = "DENY" } }],
                ["post_request", "file_logger", {}, 90],
            ]
            "#,
        )
        .unwrap();

        assert_eq!(tables.plugins, tuples.plugins);

        let headers = json!({ "headers": { "x-frame-options": "DENY" } });
        assert_eq!(
            tuples.plugins,
            vec![
                SeedEntry::new(Phase::PreRequest, "maintenance"),
                SeedEntry::new(Phase::PostRequest, "response_headers")
                    .with_options(headers.as_object().cloned().unwrap()),
                SeedEntry::new(Phase::PostRequest, "file_logger").with_priority(90),
            ]
        );
    }

    #[test]
    fn test_invalid_phase_is_rejected() {
        let err = AppConfig::from_toml(r#"plugins = [["sideways", "maintenance"]]"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("sideways"));
    }

    #[test]
    fn test_status_pages_section() {
        let config = AppConfig::from_toml(
            r#"
            [[status_pages]]
            code = 404
            body = "<h1>{{status}}</h1>"

            [[status_pages]]
            code = 502
            status = 503
            file = "pages/502.html"
            content_type = "text/plain"
            headers = { "cache-control" = "no-store" }
            "#,
        )
        .unwrap();

        assert_eq!(config.status_pages[0], StatusPageConfig::inline(404, "<h1>{{status}}</h1>"));
        let gateway = &config.status_pages[1];
        assert_eq!(gateway.status, Some(503));
        assert_eq!(gateway.file.as_deref(), Some(Path::new("pages/502.html")));
        assert_eq!(gateway.headers["cache-control"], "no-store");
    }

    #[test]
    fn test_from_file_records_source_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[admin]\nenabled = true").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert!(config.admin.enabled);
        assert_eq!(config.source.as_deref(), Some(path.as_path()));
        assert_eq!(config.source_dir.as_deref(), Some(dir.path()));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
