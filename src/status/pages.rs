use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::collections::BTreeMap;
use std::path::Path;

use super::resolver::{RequestHead, Resolution, StatusPage, StatusPageResolver};
use crate::config::StatusPageConfig;
use crate::error::{ConfigError, ResolveError};

#[derive(Debug, Clone)]
struct PageTemplate {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
}

impl PageTemplate {
    fn render(&self, intercepted: u16, request: &RequestHead) -> StatusPage {
        let body = self
            .body
            .replace("{{status}}", self.status.as_str())
            .replace("{{reason}}", self.status.canonical_reason().unwrap_or(""))
            .replace("{{path}}", request.path())
            .replace("{{method}}", request.method.as_str());

        let mut page = StatusPage::new(self.status, body);
        page.headers = self.headers.clone();
        page.metadata.insert("source".into(), "config".into());
        page.metadata.insert("intercepted".into(), intercepted.into());
        page
    }
}

/// Status pages read from the `[[status_pages]]` configuration
#[derive(Debug, Clone, Default)]
pub struct ConfiguredStatusPages {
    pages: BTreeMap<u16, PageTemplate>,
}

impl ConfiguredStatusPages {
    /// Validate every entry and load file bodies. Relative `file` paths are
    /// resolved against `base_dir` when given.
    pub fn from_config(
        configs: &[StatusPageConfig],
        base_dir: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut pages = BTreeMap::new();

        for config in configs {
            let code = parse_status(config.code)?;
            let status = parse_status(config.status.unwrap_or(config.code))?;
            let body = load_body(config, base_dir)?;

            let mut headers = HeaderMap::new();
            headers.insert(header::CONTENT_TYPE, header_value("content-type", &config.content_type)?);
            for (name, value) in &config.headers {
                let header_name =
                    HeaderName::from_bytes(name.as_bytes()).map_err(|e| ConfigError::InvalidHeader {
                        name: name.clone(),
                        reason: e.to_string(),
                    })?;
                headers.insert(header_name, header_value(name, value)?);
            }

            if pages
                .insert(code.as_u16(), PageTemplate { status, headers, body })
                .is_some()
            {
                tracing::warn!("Status page for {} defined twice, keeping the last one", code);
            }
        }

        tracing::info!("Loaded {} status page(s)", pages.len());
        Ok(Self { pages })
    }

    pub fn codes(&self) -> impl Iterator<Item = u16> + '_ {
        self.pages.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

impl StatusPageResolver for ConfiguredStatusPages {
    fn resolve(&self, status: u16, request: &RequestHead) -> Result<Resolution, ResolveError> {
        Ok(match self.pages.get(&status) {
            Some(template) => Resolution::Replace(template.render(status, request)),
            None => Resolution::NoOverride,
        })
    }
}

fn parse_status(code: u16) -> Result<StatusCode, ConfigError> {
    if !(100..=599).contains(&code) {
        return Err(ConfigError::InvalidStatusCode(code));
    }
    StatusCode::from_u16(code).map_err(|_| ConfigError::InvalidStatusCode(code))
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, ConfigError> {
    HeaderValue::from_str(value).map_err(|e| ConfigError::InvalidHeader {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

fn load_body(config: &StatusPageConfig, base_dir: Option<&Path>) -> Result<String, ConfigError> {
    if let Some(file) = &config.file {
        let path = match base_dir {
            Some(dir) if file.is_relative() => dir.join(file),
            _ => file.clone(),
        };
        return std::fs::read_to_string(&path).map_err(|source| ConfigError::Io { path, source });
    }
    Ok(config
        .body
        .clone()
        .unwrap_or_else(|| "{{status}} {{reason}}".to_string()))
}
