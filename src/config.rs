// Runtime configuration.
// Values are layered: command-line flags win over environment variables,
// which win over the optional TOML file, which wins over built-in defaults.
// Credentials are never compiled in; a missing admin key is reported when a
// command first needs the remote service.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub const ENV_API_URL: &str = "SYFT_API_URL";
pub const ENV_API_KEY: &str = "SYFT_ADMIN_API_KEY";
pub const ENV_COMPLETION_KEY: &str = "OPENROUTER_API_KEY";
pub const ENV_MODEL: &str = "SYFT_DEPLOY_MODEL";

pub const DEFAULT_API_URL: &str = "http://localhost:8080/api/v1";
pub const DEFAULT_COMPLETION_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "anthropic/claude-3.5-sonnet";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP verb used for partial updates. The service accepts PATCH; PUT is
/// kept for deployments behind proxies that only forward PUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMethod {
    #[default]
    Patch,
    Put,
}

/// Shape of `config.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub update_method: Option<UpdateMethod>,
    pub completion_url: Option<String>,
    pub completion_api_key: Option<String>,
    pub model: Option<String>,
}

impl FileConfig {
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Values given on the command line.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
}

/// Settings for the dataset/endpoint service.
#[derive(Clone)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub update_method: UpdateMethod,
}

/// Settings for the chat completion API used by `generate`.
#[derive(Clone)]
pub struct CompletionConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub remote: RemoteConfig,
    pub completion: CompletionConfig,
}

impl Config {
    /// Load from `path`, or from the per-user config file when `path` is
    /// `None`. An explicit path must exist; the default one may be absent.
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => read_file(path)?,
            None => match default_path() {
                Some(path) if path.exists() => read_file(&path)?,
                _ => FileConfig::default(),
            },
        };
        Self::resolve(file, |key| std::env::var(key).ok(), overrides)
    }

    /// Combine the layers. `env` looks up environment variables; tests pass a
    /// closure over a map.
    pub fn resolve(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
        overrides: &Overrides,
    ) -> Result<Self, ConfigError> {
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        let base_url = non_empty(overrides.api_url.clone())
            .or_else(|| non_empty(env(ENV_API_URL)))
            .or(non_empty(file.api_url))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(base_url));
        }

        let api_key = non_empty(overrides.api_key.clone())
            .or_else(|| non_empty(env(ENV_API_KEY)))
            .or(non_empty(file.api_key));

        let remote = RemoteConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            request_timeout: file
                .request_timeout_secs
                .map_or(DEFAULT_REQUEST_TIMEOUT, Duration::from_secs),
            connect_timeout: file
                .connect_timeout_secs
                .map_or(DEFAULT_CONNECT_TIMEOUT, Duration::from_secs),
            update_method: file.update_method.unwrap_or_default(),
        };

        let completion = CompletionConfig {
            url: non_empty(file.completion_url)
                .unwrap_or_else(|| DEFAULT_COMPLETION_URL.to_string()),
            api_key: non_empty(env(ENV_COMPLETION_KEY)).or(non_empty(file.completion_api_key)),
            model: non_empty(overrides.model.clone())
                .or_else(|| non_empty(env(ENV_MODEL)))
                .or(non_empty(file.model))
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout: DEFAULT_COMPLETION_TIMEOUT,
        };

        Ok(Self { remote, completion })
    }
}

impl RemoteConfig {
    /// The admin key, or the error telling the operator how to provide it.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key.as_deref().ok_or(ConfigError::MissingApiKey)
    }
}

/// `<config dir>/syft-deploy/config.toml`, e.g. `~/.config/syft-deploy/config.toml`.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("syft-deploy").join("config.toml"))
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    FileConfig::parse(&text, path)
}

/// Mask a credential for display: keep the first and last four characters.
pub fn mask_secret(value: &str) -> String {
    let count = value.chars().count();
    if count <= 8 {
        "*".repeat(count)
    } else {
        let head: String = value.chars().take(4).collect();
        let tail: String = value.chars().skip(count - 4).collect();
        format!("{head}...{tail}")
    }
}

fn masked(value: Option<&String>) -> String {
    value.map_or_else(|| "<unset>".to_string(), |v| mask_secret(v))
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &masked(self.api_key.as_ref()))
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("update_method", &self.update_method)
            .finish()
    }
}

impl fmt::Debug for CompletionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionConfig")
            .field("url", &self.url)
            .field("api_key", &masked(self.api_key.as_ref()))
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}
