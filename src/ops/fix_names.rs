//! `fix-names`: endpoint names cannot be changed in place, so an endpoint
//! whose name contains a space is deleted and recreated under its slug.
//!
//! Between the delete and the create the endpoint exists only in the ledger.
//! The recreate payload is persisted as an unconfirmed intent before the
//! delete is sent and confirmed once the delete returns. A resumed run that
//! finds a confirmed entry goes straight to create; an unconfirmed one is
//! looked up first, because the delete may or may not have happened.

use std::thread;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::api::{Remote, Resource, ResourceKind};
use crate::batch::{ItemError, ItemOperation, Outcome, TargetItem};
use crate::ledger::{Ledger, LedgerFile, Recreate};
use crate::slug::{is_valid_name, sanitize};

/// Fields copied from the current endpoint into the recreate payload.
const CARRIED_FIELDS: [&str; 4] = ["description", "summary", "tags", "model"];

pub fn needs_name_fix(endpoint: &Resource) -> bool {
    endpoint.name.contains(' ')
}

/// Body that recreates `endpoint` with a name equal to its sanitized slug.
pub fn recreate_payload(endpoint: &Resource) -> Value {
    let slug = endpoint.key();
    let mut payload = Map::new();
    payload.insert("name".into(), json!(sanitize(slug)));
    payload.insert("slug".into(), json!(slug));
    for field in CARRIED_FIELDS {
        if let Some(value) = endpoint.extra.get(field).filter(|v| !v.is_null()) {
            payload.insert(field.into(), value.clone());
        }
    }
    if let Some(id) = endpoint.dataset_id() {
        payload.insert("dataset_id".into(), id);
    }
    let response_type = endpoint.field_str("response_type").unwrap_or("both");
    payload.insert("response_type".into(), json!(response_type));
    Value::Object(payload)
}

/// Endpoints left deleted by an earlier run come first (they no longer show
/// up in the listing), then listed endpoints with a space in their name.
pub fn fix_name_targets(endpoints: &[Resource], ledger: &Ledger) -> Vec<TargetItem> {
    let mut items: Vec<TargetItem> = ledger
        .deleted_entries()
        .map(|(slug, recreate)| {
            let name = recreate
                .payload
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(slug)
                .to_string();
            TargetItem::new(slug).named(name, slug)
        })
        .collect();
    for ep in endpoints.iter().filter(|ep| needs_name_fix(ep)) {
        if items.iter().any(|item| item.identifier == ep.key()) {
            continue;
        }
        items.push(TargetItem::for_resource(ep).named(sanitize(ep.key()), ep.key()));
    }
    items
}

pub struct FixNamesOp<'a> {
    remote: &'a dyn Remote,
    /// Pause between the delete, create and publish calls of one item.
    pause: Duration,
}

impl<'a> FixNamesOp<'a> {
    pub fn new(remote: &'a dyn Remote) -> Self {
        Self {
            remote,
            pause: Duration::ZERO,
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    fn pause(&self) {
        if !self.pause.is_zero() {
            thread::sleep(self.pause);
        }
    }

    /// Current definition from the service, or the listing snapshot when the
    /// endpoint has vanished since it was listed.
    fn current(&self, item: &TargetItem) -> Result<Resource, ItemError> {
        match self.remote.get(ResourceKind::Endpoint, &item.identifier) {
            Ok(found) => Ok(found),
            Err(err) if err.is_not_found() => item
                .payload
                .as_ref()
                .and_then(|p| serde_json::from_value(p.clone()).ok())
                .ok_or_else(|| {
                    ItemError::Invalid(format!(
                        "{} is gone and no definition was recorded",
                        item.identifier
                    ))
                }),
            Err(err) => Err(err.into()),
        }
    }

    fn recreate(&self, slug: &str, recreate: &Recreate) -> Result<String, ItemError> {
        let state = match self.remote.create(ResourceKind::Endpoint, &recreate.payload) {
            Ok(_) => "recreated",
            Err(err) if err.is_conflict() => "already recreated",
            Err(err) => return Err(err.into()),
        };
        if !recreate.republish {
            return Ok(state.to_string());
        }
        self.pause();
        match self.remote.publish(slug) {
            Ok(()) => Ok(format!("{state}, republished")),
            Err(err) if err.is_fatal() => Err(err.into()),
            Err(err) => {
                warn!(endpoint = slug, error = %err, "republish failed");
                Ok(format!("{state}, republish failed: {err}"))
            }
        }
    }
}

impl ItemOperation for FixNamesOp<'_> {
    fn name(&self) -> &'static str {
        "fix-names"
    }

    fn plan(&self, item: &TargetItem, ledger: &Ledger) -> Vec<String> {
        match ledger.deleted(&item.identifier) {
            Some(pending) if pending.confirmed => {
                return vec![format!(
                    "recreate {} as {:?} (deleted by an earlier run)",
                    item.identifier, item.desired_name
                )]
            }
            Some(_) => {
                return vec![format!(
                    "finish interrupted rename of {} to {:?}",
                    item.identifier, item.desired_name
                )]
            }
            None => {}
        }
        let old = item
            .payload
            .as_ref()
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("?");
        vec![
            format!("delete endpoint {} (name {old:?})", item.identifier),
            format!("recreate it with name {:?}", item.desired_name),
        ]
    }

    fn execute(&mut self, item: &TargetItem, ledger: &mut LedgerFile) -> Result<Outcome, ItemError> {
        let slug = item.identifier.as_str();

        if let Some(pending) = ledger.ledger().deleted(slug).cloned() {
            if pending.confirmed {
                info!(endpoint = slug, "resuming recreate of deleted endpoint");
                return self.recreate(slug, &pending).map(Outcome::Done);
            }
            return self.resume_interrupted(slug, pending, ledger);
        }

        let current = self.current(item)?;
        if !needs_name_fix(&current) {
            return Ok(Outcome::Skipped(format!("name {:?} already clean", current.name)));
        }
        let payload = recreate_payload(&current);
        let new_name = payload.get("name").and_then(Value::as_str).unwrap_or_default();
        if !is_valid_name(new_name) {
            return Err(ItemError::Invalid(format!(
                "slug {slug:?} does not give a usable name"
            )));
        }

        let intent = Recreate {
            payload,
            republish: current.published,
            deleted_at: Utc::now(),
            confirmed: false,
        };
        ledger.record_deleted(slug, intent.clone())?;
        self.delete_then_recreate(slug, intent, ledger)
    }
}

impl FixNamesOp<'_> {
    fn delete_then_recreate(
        &self,
        slug: &str,
        mut recreate: Recreate,
        ledger: &mut LedgerFile,
    ) -> Result<Outcome, ItemError> {
        match self.remote.delete(ResourceKind::Endpoint, slug) {
            Ok(()) => {}
            Err(err) if err.is_not_found() => info!(endpoint = slug, "already deleted"),
            Err(err) => return Err(err.into()),
        }
        recreate.confirmed = true;
        recreate.deleted_at = Utc::now();
        ledger.record_deleted(slug, recreate.clone())?;
        self.pause();

        self.recreate(slug, &recreate).map(Outcome::Done)
    }

    /// An earlier run recorded the intent but stopped before confirming the
    /// delete. If the endpoint is still there, delete it now; otherwise the
    /// delete went through and only the create is left.
    fn resume_interrupted(
        &self,
        slug: &str,
        mut pending: Recreate,
        ledger: &mut LedgerFile,
    ) -> Result<Outcome, ItemError> {
        match self.remote.get(ResourceKind::Endpoint, slug) {
            Ok(_) => {
                info!(endpoint = slug, "interrupted rename, endpoint still present");
                self.delete_then_recreate(slug, pending, ledger)
            }
            Err(err) if err.is_not_found() => {
                info!(endpoint = slug, "interrupted rename, endpoint already deleted");
                pending.confirmed = true;
                ledger.record_deleted(slug, pending.clone())?;
                self.recreate(slug, &pending).map(Outcome::Done)
            }
            Err(err) => Err(err.into()),
        }
    }
}
