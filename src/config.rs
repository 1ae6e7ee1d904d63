//! Configuration.
//!
//! Settings are layered: built-in defaults, then an optional TOML file
//! named by `INDEXER_CONFIG`, then environment variables. The merged
//! [`Config`] is validated once into [`DocsSettings`] or [`BlogSettings`]
//! before anything touches the network; every problem surfaces as a
//! [`ConfigError`].
//!
//! ```toml
//! [store]
//! endpoint = "http://localhost:9200"
//!
//! [docs]
//! repository_handle = "giantswarm/docs"
//! subfolder = "src/content"
//!
//! [blog]
//! index_name = "blog"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

use crate::locator::LocatorOptions;
use crate::models::VERSION_SEPARATOR;

/// Environment variable naming an optional TOML config file.
pub const CONFIG_FILE_ENV: &str = "INDEXER_CONFIG";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {var}: {message}")]
    Invalid { var: &'static str, message: String },
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub docs: DocsConfig,
    #[serde(default)]
    pub openapi: OpenApiConfig,
    #[serde(default)]
    pub blog: BlogConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_startup_delay_secs")]
    pub startup_delay_secs: u64,
    #[serde(default)]
    pub mapping_file: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            startup_delay_secs: default_startup_delay_secs(),
            mapping_file: None,
        }
    }
}

fn default_startup_delay_secs() -> u64 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocsConfig {
    #[serde(default)]
    pub repository_handle: Option<String>,
    #[serde(default)]
    pub repository_path: Option<PathBuf>,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub subfolder: Option<String>,
    #[serde(default)]
    pub github_token: Option<String>,
    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,
    #[serde(default = "default_docs_index_name")]
    pub index_name: String,
    #[serde(default = "default_lowercase_uris")]
    pub lowercase_uris: bool,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            repository_handle: None,
            repository_path: None,
            branch: default_branch(),
            subfolder: None,
            github_token: None,
            github_api_url: default_github_api_url(),
            workdir: default_workdir(),
            index_name: default_docs_index_name(),
            lowercase_uris: default_lowercase_uris(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_branch() -> String {
    "main".to_string()
}
fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_workdir() -> PathBuf {
    PathBuf::from("/home/indexer")
}
fn default_docs_index_name() -> String {
    "docs".to_string()
}
fn default_lowercase_uris() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct OpenApiConfig {
    #[serde(default)]
    pub base_uri: Option<String>,
    #[serde(default)]
    pub base_path: Option<String>,
    #[serde(default)]
    pub spec_files: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BlogConfig {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_hubspot_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_blog_index_name")]
    pub index_name: String,
}

impl Default for BlogConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            endpoint: default_hubspot_endpoint(),
            index_name: default_blog_index_name(),
        }
    }
}

fn default_hubspot_endpoint() -> String {
    "https://api.hubapi.com".to_string()
}
fn default_blog_index_name() -> String {
    "blog".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_rate_limit_max_wait_secs")]
    pub rate_limit_max_wait_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            base_delay_ms: default_base_delay_ms(),
            rate_limit_max_wait_secs: default_rate_limit_max_wait_secs(),
        }
    }
}

fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_rate_limit_max_wait_secs() -> u64 {
    60
}

// ── Validated settings ────────────────────────────────────────────────

/// Search engine connection.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub startup_delay: Duration,
    pub mapping_file: Option<PathBuf>,
}

/// Where the documentation tree comes from.
#[derive(Debug, Clone)]
pub enum RepositorySource {
    /// An already checked-out tree.
    Local(PathBuf),
    /// A GitHub repository cloned into the work directory.
    GitHub(GitHubSettings),
}

#[derive(Debug, Clone)]
pub struct GitHubSettings {
    /// `owner/name`.
    pub handle: String,
    pub branch: String,
    pub token: Option<String>,
    pub api_url: String,
    pub workdir: PathBuf,
}

/// OpenAPI ingestion, enabled only when all three settings are present.
#[derive(Debug, Clone)]
pub struct OpenApiSettings {
    pub base_uri: String,
    pub base_path: String,
    pub spec_files: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DocsSettings {
    pub store: StoreSettings,
    pub http: HttpConfig,
    pub repository: RepositorySource,
    pub subfolder: Option<String>,
    pub index_name: String,
    pub locator: LocatorOptions,
    pub openapi: Option<OpenApiSettings>,
}

#[derive(Debug, Clone)]
pub struct BlogSettings {
    pub store: StoreSettings,
    pub http: HttpConfig,
    pub access_token: String,
    pub endpoint: String,
    pub index_name: String,
}

impl Config {
    /// Load from `INDEXER_CONFIG` (if set) and the process environment.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_FILE_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.merge_env_from(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Apply environment overrides. `lookup` returns a variable's value;
    /// empty values count as unset.
    pub fn merge_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        // Store
        if let Some(v) = get("ELASTICSEARCH_ENDPOINT") {
            self.store.endpoint = Some(v);
        }
        if let Some(v) = get("ELASTICSEARCH_API_KEY") {
            self.store.api_key = Some(v);
        }
        if let Some(v) = get("STARTUP_DELAY_SECS") {
            self.store.startup_delay_secs = parse_number("STARTUP_DELAY_SECS", &v)?;
        }
        if let Some(v) = get("INDEX_MAPPING_FILE") {
            self.store.mapping_file = Some(PathBuf::from(v));
        }

        // Docs
        if let Some(v) = get("REPOSITORY_HANDLE") {
            self.docs.repository_handle = Some(v);
        }
        if let Some(v) = get("REPOSITORY_PATH") {
            self.docs.repository_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("REPOSITORY_BRANCH") {
            self.docs.branch = v;
        }
        if let Some(v) = get("REPOSITORY_SUBFOLDER") {
            self.docs.subfolder = Some(v);
        }
        if let Some(v) = get("GITHUB_TOKEN") {
            self.docs.github_token = Some(v);
        }
        if let Some(v) = get("GITHUB_API_URL") {
            self.docs.github_api_url = v;
        }
        if let Some(v) = get("WORKDIR") {
            self.docs.workdir = PathBuf::from(v);
        }
        if let Some(v) = get("INDEX_NAME") {
            self.docs.index_name = v;
        }
        if let Some(v) = get("LOWERCASE_URIS") {
            self.docs.lowercase_uris = parse_bool("LOWERCASE_URIS", &v)?;
        }

        // OpenAPI
        if let Some(v) = get("APIDOCS_BASE_URI") {
            self.openapi.base_uri = Some(v);
        }
        if let Some(v) = get("APIDOCS_BASE_PATH") {
            self.openapi.base_path = Some(v);
        }
        if let Some(v) = get("API_SPEC_FILES") {
            self.openapi.spec_files = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Blog
        if let Some(v) = get("HUBSPOT_ACCESS_TOKEN") {
            self.blog.access_token = Some(v);
        }
        if let Some(v) = get("HUBSPOT_ENDPOINT") {
            self.blog.endpoint = v;
        }
        if let Some(v) = get("BLOG_INDEX_NAME") {
            self.blog.index_name = v;
        }

        // HTTP
        if let Some(v) = get("HTTP_MAX_RETRIES") {
            self.http.max_retries = parse_number("HTTP_MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("HTTP_TIMEOUT_SECS") {
            self.http.timeout_secs = parse_number("HTTP_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("HTTP_BASE_DELAY_MS") {
            self.http.base_delay_ms = parse_number("HTTP_BASE_DELAY_MS", &v)?;
        }
        if let Some(v) = get("RATE_LIMIT_MAX_WAIT_SECS") {
            self.http.rate_limit_max_wait_secs = parse_number("RATE_LIMIT_MAX_WAIT_SECS", &v)?;
        }

        Ok(())
    }

    /// Validate everything the `docs` command needs.
    pub fn docs_settings(&self) -> Result<DocsSettings, ConfigError> {
        let store = self.store_settings()?;
        let http = self.validated_http()?;
        validate_prefix("INDEX_NAME", &self.docs.index_name)?;

        let repository = match (&self.docs.repository_path, &self.docs.repository_handle) {
            (Some(path), _) => RepositorySource::Local(path.clone()),
            (None, Some(handle)) => {
                validate_handle(handle)?;
                if self.docs.branch.trim().is_empty() {
                    return Err(ConfigError::Invalid {
                        var: "REPOSITORY_BRANCH",
                        message: "must not be empty".to_string(),
                    });
                }
                RepositorySource::GitHub(GitHubSettings {
                    handle: handle.clone(),
                    branch: self.docs.branch.clone(),
                    token: self.docs.github_token.clone(),
                    api_url: self.docs.github_api_url.trim_end_matches('/').to_string(),
                    workdir: self.docs.workdir.clone(),
                })
            }
            (None, None) => return Err(ConfigError::Missing("REPOSITORY_HANDLE")),
        };

        let openapi = match (
            &self.openapi.base_uri,
            &self.openapi.base_path,
            self.openapi.spec_files.is_empty(),
        ) {
            (Some(uri), Some(path), false) => Some(OpenApiSettings {
                base_uri: uri.trim_end_matches('/').to_string(),
                base_path: path.clone(),
                spec_files: self.openapi.spec_files.clone(),
            }),
            _ => None,
        };

        Ok(DocsSettings {
            store,
            http,
            repository,
            subfolder: self.docs.subfolder.clone(),
            index_name: self.docs.index_name.clone(),
            locator: LocatorOptions {
                exclude_globs: self.docs.exclude_globs.clone(),
                lowercase_uris: self.docs.lowercase_uris,
                ..Default::default()
            },
            openapi,
        })
    }

    /// Validate everything the `blog` command needs.
    pub fn blog_settings(&self) -> Result<BlogSettings, ConfigError> {
        let store = self.store_settings()?;
        let http = self.validated_http()?;
        validate_prefix("BLOG_INDEX_NAME", &self.blog.index_name)?;
        let access_token = self
            .blog
            .access_token
            .clone()
            .ok_or(ConfigError::Missing("HUBSPOT_ACCESS_TOKEN"))?;
        validate_url("HUBSPOT_ENDPOINT", &self.blog.endpoint)?;

        Ok(BlogSettings {
            store,
            http,
            access_token,
            endpoint: self.blog.endpoint.trim_end_matches('/').to_string(),
            index_name: self.blog.index_name.clone(),
        })
    }

    fn store_settings(&self) -> Result<StoreSettings, ConfigError> {
        let endpoint = self
            .store
            .endpoint
            .clone()
            .ok_or(ConfigError::Missing("ELASTICSEARCH_ENDPOINT"))?;
        validate_url("ELASTICSEARCH_ENDPOINT", &endpoint)?;
        Ok(StoreSettings {
            endpoint,
            api_key: self.store.api_key.clone(),
            startup_delay: Duration::from_secs(self.store.startup_delay_secs),
            mapping_file: self.store.mapping_file.clone(),
        })
    }

    fn validated_http(&self) -> Result<HttpConfig, ConfigError> {
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "HTTP_TIMEOUT_SECS",
                message: "must be > 0".to_string(),
            });
        }
        Ok(self.http.clone())
    }
}

fn parse_number<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        var,
        message: format!("'{}' is not a non-negative integer", value),
    })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            var,
            message: format!("'{}' is not a boolean", other),
        }),
    }
}

fn validate_prefix(var: &'static str, prefix: &str) -> Result<(), ConfigError> {
    if prefix.is_empty() {
        return Err(ConfigError::Invalid {
            var,
            message: "must not be empty".to_string(),
        });
    }
    if prefix.contains(VERSION_SEPARATOR) {
        return Err(ConfigError::Invalid {
            var,
            message: format!("'{}' must not contain '{}'", prefix, VERSION_SEPARATOR),
        });
    }
    Ok(())
}

fn validate_handle(handle: &str) -> Result<(), ConfigError> {
    let mut parts = handle.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => Ok(()),
        _ => Err(ConfigError::Invalid {
            var: "REPOSITORY_HANDLE",
            message: format!("'{}' is not of the form owner/name", handle),
        }),
    }
}

fn validate_url(var: &'static str, value: &str) -> Result<(), ConfigError> {
    match reqwest::Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => Err(ConfigError::Invalid {
            var,
            message: format!("'{}' is not an http(s) URL", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut config = Config::default();
        config.merge_env_from(|name| env.get(name).cloned())?;
        Ok(config)
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.store.startup_delay_secs, 3);
        assert_eq!(config.docs.branch, "main");
        assert_eq!(config.docs.index_name, "docs");
        assert_eq!(config.blog.index_name, "blog");
        assert_eq!(config.blog.endpoint, "https://api.hubapi.com");
        assert_eq!(config.http.max_retries, 5);
        assert!(config.docs.lowercase_uris);
    }

    #[test]
    fn test_missing_endpoint_is_fatal() {
        let config = config_from(&[("REPOSITORY_HANDLE", "giantswarm/docs")]).unwrap();
        assert_eq!(
            config.docs_settings().unwrap_err(),
            ConfigError::Missing("ELASTICSEARCH_ENDPOINT")
        );
    }

    #[test]
    fn test_docs_requires_repository() {
        let config = config_from(&[("ELASTICSEARCH_ENDPOINT", "http://es:9200")]).unwrap();
        assert_eq!(
            config.docs_settings().unwrap_err(),
            ConfigError::Missing("REPOSITORY_HANDLE")
        );
    }

    #[test]
    fn test_docs_github_settings() {
        let config = config_from(&[
            ("ELASTICSEARCH_ENDPOINT", "http://es:9200"),
            ("REPOSITORY_HANDLE", "giantswarm/docs"),
            ("REPOSITORY_BRANCH", "release"),
            ("REPOSITORY_SUBFOLDER", "src/content"),
            ("LOWERCASE_URIS", "false"),
        ])
        .unwrap();
        let settings = config.docs_settings().unwrap();
        match &settings.repository {
            RepositorySource::GitHub(gh) => {
                assert_eq!(gh.handle, "giantswarm/docs");
                assert_eq!(gh.branch, "release");
                assert_eq!(gh.api_url, "https://api.github.com");
            }
            other => panic!("unexpected repository source {:?}", other),
        }
        assert_eq!(settings.subfolder.as_deref(), Some("src/content"));
        assert!(!settings.locator.lowercase_uris);
        assert!(settings.openapi.is_none());
    }

    #[test]
    fn test_local_path_wins_over_handle() {
        let config = config_from(&[
            ("ELASTICSEARCH_ENDPOINT", "http://es:9200"),
            ("REPOSITORY_HANDLE", "giantswarm/docs"),
            ("REPOSITORY_PATH", "/srv/docs"),
        ])
        .unwrap();
        assert!(matches!(
            config.docs_settings().unwrap().repository,
            RepositorySource::Local(ref p) if p == Path::new("/srv/docs")
        ));
    }

    #[test]
    fn test_prefix_with_separator_is_rejected() {
        let config = config_from(&[
            ("ELASTICSEARCH_ENDPOINT", "http://es:9200"),
            ("REPOSITORY_PATH", "/srv/docs"),
            ("INDEX_NAME", "my-docs"),
        ])
        .unwrap();
        assert!(matches!(
            config.docs_settings().unwrap_err(),
            ConfigError::Invalid { var: "INDEX_NAME", .. }
        ));
    }

    #[test]
    fn test_openapi_requires_all_three() {
        let partial = config_from(&[
            ("ELASTICSEARCH_ENDPOINT", "http://es:9200"),
            ("REPOSITORY_PATH", "/srv/docs"),
            ("APIDOCS_BASE_URI", "https://docs.example.com/api/"),
            ("API_SPEC_FILES", "spec.yaml, defs.yaml"),
        ])
        .unwrap();
        assert!(partial.docs_settings().unwrap().openapi.is_none());

        let full = config_from(&[
            ("ELASTICSEARCH_ENDPOINT", "http://es:9200"),
            ("REPOSITORY_PATH", "/srv/docs"),
            ("APIDOCS_BASE_URI", "https://docs.example.com/api/"),
            ("APIDOCS_BASE_PATH", "/api/"),
            ("API_SPEC_FILES", "spec.yaml, defs.yaml"),
        ])
        .unwrap();
        let openapi = full.docs_settings().unwrap().openapi.unwrap();
        assert_eq!(openapi.base_uri, "https://docs.example.com/api");
        assert_eq!(openapi.spec_files, vec!["spec.yaml", "defs.yaml"]);
    }

    #[test]
    fn test_blog_requires_token() {
        let config = config_from(&[("ELASTICSEARCH_ENDPOINT", "http://es:9200")]).unwrap();
        assert_eq!(
            config.blog_settings().unwrap_err(),
            ConfigError::Missing("HUBSPOT_ACCESS_TOKEN")
        );
        let config = config_from(&[
            ("ELASTICSEARCH_ENDPOINT", "http://es:9200"),
            ("HUBSPOT_ACCESS_TOKEN", "secret"),
        ])
        .unwrap();
        assert_eq!(config.blog_settings().unwrap().index_name, "blog");
    }

    #[test]
    fn test_invalid_numbers_and_urls() {
        assert!(matches!(
            config_from(&[("HTTP_MAX_RETRIES", "many")]).unwrap_err(),
            ConfigError::Invalid { var: "HTTP_MAX_RETRIES", .. }
        ));
        let config = config_from(&[
            ("ELASTICSEARCH_ENDPOINT", "localhost"),
            ("REPOSITORY_PATH", "/srv/docs"),
        ])
        .unwrap();
        assert!(matches!(
            config.docs_settings().unwrap_err(),
            ConfigError::Invalid { var: "ELASTICSEARCH_ENDPOINT", .. }
        ));
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let config = config_from(&[("INDEX_NAME", ""), ("REPOSITORY_BRANCH", "  ")]).unwrap();
        assert_eq!(config.docs.index_name, "docs");
        assert_eq!(config.docs.branch, "main");
    }

    #[test]
    fn test_toml_file_then_env_override() {
        let toml = r#"
            [store]
            endpoint = "http://file:9200"
            startup_delay_secs = 0

            [docs]
            repository_path = "/from/file"
            exclude_globs = ["drafts/**"]
        "#;
        let mut config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.docs.branch, "main");
        let env: HashMap<&str, &str> = [("ELASTICSEARCH_ENDPOINT", "http://env:9200")].into();
        config
            .merge_env_from(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        let settings = config.docs_settings().unwrap();
        assert_eq!(settings.store.endpoint, "http://env:9200");
        assert_eq!(settings.store.startup_delay, Duration::ZERO);
        assert_eq!(settings.locator.exclude_globs, vec!["drafts/**"]);
    }
}
