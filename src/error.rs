// Error types shared by the library modules.
// - `ApiError` classifies every remote failure into the five outcomes the
//   batch driver knows how to react to.
// - `LedgerError` covers reading and writing the progress file.
// - `ConfigError` covers configuration loading.
// The binary wraps all of these in `anyhow` at the command boundary.

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Classified failure of a call to the remote service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("{resource} not found")]
    NotFound { resource: String },
    #[error("{resource} already exists")]
    Conflict { resource: String },
    #[error("unauthorized (HTTP {status}); check the admin API key")]
    Unauthorized { status: u16 },
    #[error("transient failure: {reason}")]
    Transient { reason: String },
    #[error("rejected (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Response bodies are clipped to this many characters in error messages.
const BODY_PREVIEW: usize = 200;

impl ApiError {
    /// Maps a non-success HTTP status and its body to an error class.
    pub fn from_status(status: StatusCode, body: &str, resource: &str) -> Self {
        let code = status.as_u16();
        match code {
            401 | 403 => Self::Unauthorized { status: code },
            404 => Self::NotFound {
                resource: resource.to_string(),
            },
            409 => Self::Conflict {
                resource: resource.to_string(),
            },
            408 | 429 => Self::Transient {
                reason: format!("HTTP {code}"),
            },
            _ if status.is_server_error() => Self::Transient {
                reason: format!("HTTP {code}: {}", preview(body)),
            },
            // The service reports some duplicates as 400/422 with a message.
            _ if status.is_client_error() && body.to_lowercase().contains("already exists") => {
                Self::Conflict {
                    resource: resource.to_string(),
                }
            }
            _ => Self::Rejected {
                status: code,
                body: preview(body),
            },
        }
    }

    /// Classifies a transport-level failure from reqwest.
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_builder() {
            return Self::Rejected {
                status: 0,
                body: error.to_string(),
            };
        }
        if let Some(status) = error.status() {
            return Self::from_status(status, "", "resource");
        }
        let reason = if error.is_timeout() {
            "request timed out".to_string()
        } else {
            error.to_string()
        };
        Self::Transient { reason }
    }

    /// A 2xx response whose body could not be decoded.
    pub fn malformed(status: StatusCode, detail: impl Into<String>) -> Self {
        Self::Rejected {
            status: status.as_u16(),
            body: format!("unreadable response: {}", detail.into()),
        }
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Fatal errors abort the whole run instead of failing one item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

fn preview(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(BODY_PREVIEW) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

/// Failure to load or persist the progress ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("cannot access ledger {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("ledger {path} is corrupt ({source}); fix or move it aside before re-running")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot encode ledger: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure to assemble the runtime configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("no admin API key configured; set SYFT_ADMIN_API_KEY or pass --api-key")]
    MissingApiKey,
    #[error("invalid base URL {0:?}")]
    InvalidBaseUrl(String),
}
