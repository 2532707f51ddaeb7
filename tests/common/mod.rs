// In-memory stand-in for the dataset/endpoint service.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};

use serde_json::{json, Value};

use syft_deploy::api::{Remote, Resource, ResourceKind};
use syft_deploy::error::ApiError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List(ResourceKind),
    Get(ResourceKind, String),
    Create(ResourceKind, String),
    Update(ResourceKind, String),
    Delete(ResourceKind, String),
    Publish(String),
}

impl Call {
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Call::List(_) | Call::Get(..))
    }
}

#[derive(Default)]
pub struct MockRemote {
    pub calls: RefCell<Vec<Call>>,
    datasets: RefCell<BTreeMap<String, Resource>>,
    endpoints: RefCell<BTreeMap<String, Resource>>,
    // (method, key) -> errors returned by the next calls, in order
    failures: RefCell<HashMap<(&'static str, String), VecDeque<ApiError>>>,
    next_id: RefCell<u64>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(self, value: Value) -> Self {
        let ep: Resource = serde_json::from_value(value).unwrap();
        self.endpoints.borrow_mut().insert(ep.key().to_string(), ep);
        self
    }

    pub fn with_dataset(self, value: Value) -> Self {
        let ds: Resource = serde_json::from_value(value).unwrap();
        self.datasets.borrow_mut().insert(ds.name.clone(), ds);
        self
    }

    /// Make the next `errors.len()` calls of `method` on `key` fail.
    pub fn fail(&self, method: &'static str, key: &str, errors: Vec<ApiError>) {
        self.failures
            .borrow_mut()
            .entry((method, key.to_string()))
            .or_default()
            .extend(errors);
    }

    pub fn endpoint(&self, slug: &str) -> Option<Resource> {
        self.endpoints.borrow().get(slug).cloned()
    }

    pub fn dataset(&self, name: &str) -> Option<Resource> {
        self.datasets.borrow().get(name).cloned()
    }

    pub fn mutating_calls(&self) -> Vec<Call> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.is_mutating())
            .cloned()
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    fn store(&self, kind: ResourceKind) -> &RefCell<BTreeMap<String, Resource>> {
        match kind {
            ResourceKind::Dataset => &self.datasets,
            ResourceKind::Endpoint => &self.endpoints,
        }
    }

    fn scripted(&self, method: &'static str, key: &str) -> Result<(), ApiError> {
        let mut failures = self.failures.borrow_mut();
        match failures
            .get_mut(&(method, key.to_string()))
            .and_then(VecDeque::pop_front)
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn not_found(kind: ResourceKind, key: &str) -> ApiError {
        ApiError::NotFound {
            resource: format!("{kind} {key}"),
        }
    }
}

impl Remote for MockRemote {
    fn list(&self, kind: ResourceKind) -> Result<Vec<Resource>, ApiError> {
        self.calls.borrow_mut().push(Call::List(kind));
        Ok(self.store(kind).borrow().values().cloned().collect())
    }

    fn get(&self, kind: ResourceKind, key: &str) -> Result<Resource, ApiError> {
        self.calls.borrow_mut().push(Call::Get(kind, key.to_string()));
        self.scripted("get", key)?;
        self.store(kind)
            .borrow()
            .get(key)
            .cloned()
            .ok_or_else(|| Self::not_found(kind, key))
    }

    fn create(&self, kind: ResourceKind, fields: &Value) -> Result<Resource, ApiError> {
        let key_field = match kind {
            ResourceKind::Dataset => "name",
            ResourceKind::Endpoint => "slug",
        };
        let key = fields[key_field].as_str().unwrap_or_default().to_string();
        self.calls.borrow_mut().push(Call::Create(kind, key.clone()));
        self.scripted("create", &key)?;

        let mut store = self.store(kind).borrow_mut();
        if store.contains_key(&key) {
            return Err(ApiError::Conflict {
                resource: format!("{kind} {key}"),
            });
        }
        let mut created: Resource = serde_json::from_value(fields.clone()).unwrap();
        let mut next_id = self.next_id.borrow_mut();
        *next_id += 1;
        created.id = Some(json!(*next_id));
        store.insert(key, created.clone());
        Ok(created)
    }

    fn update(&self, kind: ResourceKind, key: &str, fields: &Value) -> Result<Value, ApiError> {
        self.calls
            .borrow_mut()
            .push(Call::Update(kind, key.to_string()));
        self.scripted("update", key)?;
        let mut store = self.store(kind).borrow_mut();
        let existing = store.get_mut(key).ok_or_else(|| Self::not_found(kind, key))?;
        if let Value::Object(map) = fields {
            for (k, v) in map {
                existing.extra.insert(k.clone(), v.clone());
            }
        }
        Ok(serde_json::to_value(&*existing).unwrap())
    }

    fn delete(&self, kind: ResourceKind, key: &str) -> Result<(), ApiError> {
        self.calls
            .borrow_mut()
            .push(Call::Delete(kind, key.to_string()));
        self.scripted("delete", key)?;
        self.store(kind)
            .borrow_mut()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(kind, key))
    }

    fn publish(&self, slug: &str) -> Result<(), ApiError> {
        self.calls.borrow_mut().push(Call::Publish(slug.to_string()));
        self.scripted("publish", slug)?;
        let mut endpoints = self.endpoints.borrow_mut();
        let ep = endpoints
            .get_mut(slug)
            .ok_or_else(|| Self::not_found(ResourceKind::Endpoint, slug))?;
        ep.published = true;
        ep.published_to = vec!["syfthub".into()];
        Ok(())
    }
}

/// Endpoint JSON the way the service lists it.
pub fn endpoint_json(slug: &str, name: &str, published: bool, published_to: &[&str]) -> Value {
    json!({
        "id": slug,
        "name": name,
        "slug": slug,
        "description": format!("About {name}"),
        "summary": format!("Summary of {name}"),
        "dataset": { "id": 1, "name": "ds" },
        "response_type": "both",
        "tags": "open-access",
        "published": published,
        "published_to": published_to,
    })
}
