// API client module: a small blocking HTTP client for the Syft Space
// dataset/endpoint service. Every call carries the admin bearer token and a
// bounded timeout, and every failure is classified into an `ApiError` so the
// batch driver can decide between retrying, failing the item or aborting.

use std::fmt;

use anyhow::{Context, Result};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::config::{RemoteConfig, UpdateMethod};
use crate::error::ApiError;

/// The two resource collections the service exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Dataset,
    Endpoint,
}

impl ResourceKind {
    fn collection(self) -> &'static str {
        match self {
            Self::Dataset => "datasets",
            Self::Endpoint => "endpoints",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dataset => "dataset",
            Self::Endpoint => "endpoint",
        })
    }
}

/// A dataset or endpoint as returned by the service. Only the fields this
/// tool reasons about are typed; everything else is kept in `extra` and
/// round-trips untouched.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Resource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "null_as_false")]
    pub published: bool,
    #[serde(default, deserialize_with = "marketplaces")]
    pub published_to: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Resource {
    /// Path key: endpoints are addressed by slug, datasets by name.
    pub fn key(&self) -> &str {
        self.slug.as_deref().unwrap_or(&self.name)
    }

    /// Not published, or flagged published but synced to no marketplace.
    pub fn needs_publish(&self) -> bool {
        !self.published || self.published_to.is_empty()
    }

    /// Dataset id for an endpoint (`dataset.id` or `dataset_id`), or the id
    /// of the resource itself for a dataset.
    pub fn dataset_id(&self) -> Option<Value> {
        self.extra
            .get("dataset")
            .and_then(|d| d.get("id"))
            .or_else(|| self.extra.get("dataset_id"))
            .filter(|v| !v.is_null())
            .cloned()
    }

    pub fn field_str(&self, field: &str) -> Option<&str> {
        self.extra.get(field).and_then(Value::as_str)
    }
}

fn null_as_false<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(d)?.unwrap_or_default())
}

// Marketplaces come back either as plain identifiers or as objects.
fn marketplaces<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let raw = Option::<Vec<Value>>::deserialize(d)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|entry| match entry {
            Value::Null => None,
            Value::String(s) => Some(s),
            Value::Object(map) => ["name", "slug", "id"]
                .iter()
                .find_map(|k| map.get(*k))
                .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string)),
            other => Some(other.to_string()),
        })
        .collect())
}

/// Operations on the remote service. `ApiClient` is the HTTP implementation;
/// tests substitute an in-memory one.
pub trait Remote {
    fn list(&self, kind: ResourceKind) -> Result<Vec<Resource>, ApiError>;
    fn get(&self, kind: ResourceKind, key: &str) -> Result<Resource, ApiError>;
    fn create(&self, kind: ResourceKind, fields: &Value) -> Result<Resource, ApiError>;
    /// Partial update: only the supplied fields are overwritten.
    fn update(&self, kind: ResourceKind, key: &str, fields: &Value) -> Result<Value, ApiError>;
    fn delete(&self, kind: ResourceKind, key: &str) -> Result<(), ApiError>;
    /// Publish an endpoint to every configured marketplace.
    fn publish(&self, slug: &str) -> Result<(), ApiError>;
}

/// Blocking HTTP client holding the base URL and the authorization header.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    update_method: UpdateMethod,
}

impl ApiClient {
    /// Build a client from the remote settings. Fails when no admin key is
    /// configured or the key is not a valid header value.
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let key = config.require_api_key()?;
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {key}"))
            .context("Admin API key contains characters not allowed in a header")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(ApiClient {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            update_method: config.update_method,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check the service with a cheap authenticated GET.
    pub fn check_connection(&self) -> bool {
        let url = self.url("/datasets/types/");
        match self.client.get(&url).send() {
            Ok(res) => res.status().is_success(),
            Err(err) => {
                debug!(%url, error = %err, "connection check failed");
                false
            }
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn item_url(&self, kind: ResourceKind, key: &str) -> String {
        self.url(&format!("/{}/{}", kind.collection(), key))
    }

    fn send(&self, req: RequestBuilder, resource: &str) -> Result<Response, ApiError> {
        let res = req.send().map_err(|e| ApiError::from_reqwest(&e))?;
        let status = res.status();
        debug!(%status, resource, "response");
        if !status.is_success() {
            let txt = res.text().unwrap_or_default();
            return Err(ApiError::from_status(status, &txt, resource));
        }
        Ok(res)
    }

    fn decode<T: DeserializeOwned>(res: Response) -> Result<T, ApiError> {
        let status = res.status();
        let txt = res.text().map_err(|e| ApiError::from_reqwest(&e))?;
        let txt = if txt.trim().is_empty() { "null" } else { txt.as_str() };
        serde_json::from_str(txt).map_err(|e| ApiError::malformed(status, e.to_string()))
    }
}

impl Remote for ApiClient {
    fn list(&self, kind: ResourceKind) -> Result<Vec<Resource>, ApiError> {
        let url = self.url(&format!("/{}/", kind.collection()));
        debug!(%url, "GET");
        let res = self.send(self.client.get(&url), kind.collection())?;
        let items: Option<Vec<Resource>> = Self::decode(res)?;
        Ok(items.unwrap_or_default())
    }

    fn get(&self, kind: ResourceKind, key: &str) -> Result<Resource, ApiError> {
        let url = self.item_url(kind, key);
        debug!(%url, "GET");
        let res = self.send(self.client.get(&url), &format!("{kind} {key}"))?;
        Self::decode(res)
    }

    fn create(&self, kind: ResourceKind, fields: &Value) -> Result<Resource, ApiError> {
        let url = self.url(&format!("/{}/", kind.collection()));
        let label = fields
            .get("slug")
            .or_else(|| fields.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("?");
        debug!(%url, label, "POST");
        let res = self.send(self.client.post(&url).json(fields), &format!("{kind} {label}"))?;
        let created: Option<Resource> = Self::decode(res)?;
        Ok(created.unwrap_or_default())
    }

    fn update(&self, kind: ResourceKind, key: &str, fields: &Value) -> Result<Value, ApiError> {
        let url = self.item_url(kind, key);
        let req = match self.update_method {
            UpdateMethod::Patch => self.client.patch(&url),
            UpdateMethod::Put => self.client.put(&url),
        };
        debug!(%url, method = ?self.update_method, "update");
        let res = self.send(req.json(fields), &format!("{kind} {key}"))?;
        Self::decode(res)
    }

    fn delete(&self, kind: ResourceKind, key: &str) -> Result<(), ApiError> {
        let url = self.item_url(kind, key);
        debug!(%url, "DELETE");
        self.send(self.client.delete(&url), &format!("{kind} {key}"))?;
        Ok(())
    }

    fn publish(&self, slug: &str) -> Result<(), ApiError> {
        let url = self.url(&format!("/endpoints/{slug}/publish"));
        debug!(%url, "POST");
        let body = json!({ "publish_to_all_marketplaces": true });
        self.send(self.client.post(&url).json(&body), &format!("endpoint {slug}"))?;
        Ok(())
    }
}
