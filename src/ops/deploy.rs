//! `deploy`: one dataset plus one endpoint per local dataset directory.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::api::{Remote, ResourceKind};
use crate::batch::{ItemError, ItemOperation, Outcome, TargetItem};
use crate::describe::Describer;
use crate::discovery::{read_description_file, write_description_file};
use crate::ledger::{Ledger, LedgerFile};
use crate::slug::{
    display_name, is_valid_name, render, sanitize, sanitize_with, template_suffix, MAX_SLUG_LEN,
};

#[derive(Debug, Clone)]
pub struct DeploySettings {
    /// Host directory holding one subdirectory per dataset.
    pub source_dir: PathBuf,
    /// The same directory as seen from inside the service container.
    pub container_dir: String,
    pub name_template: String,
    pub slug_template: String,
    pub summary_template: String,
    pub tags: String,
    pub response_type: String,
    pub file_types: Vec<String>,
    pub publish: bool,
    /// Pause between the dataset, endpoint and publish calls of one item.
    pub pause: Duration,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("."),
            container_dir: "/root/datasets".into(),
            name_template: "{name}".into(),
            slug_template: "{name}-oa".into(),
            summary_template: "Open access articles: {name}".into(),
            tags: "open-access".into(),
            response_type: "both".into(),
            file_types: vec![".pdf".into(), ".json".into()],
            publish: false,
            pause: Duration::ZERO,
        }
    }
}

/// Items for the discovered directory names, with sanitized dataset names
/// and endpoint slugs. A slug that has to be shortened keeps whatever the
/// slug template adds after `{name}`.
pub fn deploy_targets(names: &[String], settings: &DeploySettings) -> Vec<TargetItem> {
    let suffix = template_suffix(&settings.slug_template);
    names
        .iter()
        .map(|name| {
            TargetItem::new(name.as_str()).named(
                sanitize(&render(&settings.name_template, name)),
                sanitize_with(
                    &render(&settings.slug_template, name),
                    MAX_SLUG_LEN,
                    suffix.as_deref(),
                ),
            )
        })
        .collect()
}

pub struct DeployOp<'a> {
    remote: &'a dyn Remote,
    settings: DeploySettings,
    descriptions: BTreeMap<String, String>,
    generator: Option<Describer>,
}

impl<'a> DeployOp<'a> {
    pub fn new(remote: &'a dyn Remote, settings: DeploySettings) -> Self {
        Self {
            remote,
            settings,
            descriptions: BTreeMap::new(),
            generator: None,
        }
    }

    /// Fallback descriptions keyed by directory name.
    pub fn with_descriptions(mut self, descriptions: BTreeMap<String, String>) -> Self {
        self.descriptions = descriptions;
        self
    }

    /// Generate descriptions that are neither on disk nor in the map.
    pub fn with_generator(mut self, generator: Describer) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn dataset_payload(&self, item: &TargetItem) -> Value {
        let name = &item.identifier;
        json!({
            "name": item.desired_name,
            "dtype": "local_file",
            "configuration": {
                "filePaths": [{
                    "path": format!("{}/{}", self.settings.container_dir.trim_end_matches('/'), name),
                    "description": name,
                }],
                "ingestFileTypeOptions": self.settings.file_types,
            },
            "summary": render(&self.settings.summary_template, &display_name(name)),
            "tags": self.settings.tags,
        })
    }

    pub fn endpoint_payload(
        &self,
        item: &TargetItem,
        description: &str,
        dataset_id: Option<Value>,
    ) -> Value {
        let mut payload = json!({
            "name": item.desired_slug,
            "slug": item.desired_slug,
            "description": description,
            "summary": render(&self.settings.summary_template, &display_name(&item.identifier)),
            "response_type": self.settings.response_type,
            "published": self.settings.publish,
            "tags": self.settings.tags,
        });
        if let Some(id) = dataset_id {
            payload["dataset_id"] = id;
        }
        payload
    }

    /// Description file in the directory, then the descriptions map, then
    /// the generator. Generation problems never fail the deploy.
    fn resolve_description(&self, name: &str) -> String {
        let dir = self.settings.source_dir.join(name);
        if let Some(text) = read_description_file(&dir) {
            return text;
        }
        if let Some(text) = self.descriptions.get(name) {
            return text.clone();
        }
        let Some(generator) = &self.generator else {
            return String::new();
        };
        match generator.describe(name, &dir) {
            Ok(text) => {
                if let Err(err) = write_description_file(&dir, &text) {
                    warn!(dataset = name, error = %err, "could not save generated description");
                }
                info!(dataset = name, chars = text.len(), "generated description");
                text
            }
            Err(err) => {
                warn!(dataset = name, error = %err, "description generation failed");
                String::new()
            }
        }
    }

    fn pause(&self) {
        if !self.settings.pause.is_zero() {
            thread::sleep(self.settings.pause);
        }
    }
}

impl ItemOperation for DeployOp<'_> {
    fn name(&self) -> &'static str {
        "deploy"
    }

    fn plan(&self, item: &TargetItem, _ledger: &Ledger) -> Vec<String> {
        let mut actions = vec![
            format!(
                "create dataset {} from {}/{}",
                item.desired_name, self.settings.container_dir, item.identifier
            ),
            format!("create endpoint {}", item.desired_slug),
        ];
        if self.settings.publish {
            actions.push(format!("publish {} to marketplaces", item.desired_slug));
        }
        actions
    }

    fn execute(&mut self, item: &TargetItem, _ledger: &mut LedgerFile) -> Result<Outcome, ItemError> {
        // A directory name with nothing alphanumeric leaves only the
        // template's fixed text, which is not a slug of its own.
        if sanitize(&item.identifier).is_empty()
            || item.desired_name.is_empty()
            || item.desired_slug.is_empty()
        {
            return Err(ItemError::Invalid("empty slug".into()));
        }
        for candidate in [&item.desired_name, &item.desired_slug] {
            if !is_valid_name(candidate) {
                return Err(ItemError::Invalid(format!(
                    "{:?} is not a usable name (empty, too long or contains spaces)",
                    candidate
                )));
            }
        }

        let description = self.resolve_description(&item.identifier);

        let dataset = match self
            .remote
            .create(ResourceKind::Dataset, &self.dataset_payload(item))
        {
            Ok(created) => created,
            Err(err) if err.is_conflict() => {
                info!(dataset = %item.desired_name, "dataset exists, reusing");
                self.remote.get(ResourceKind::Dataset, &item.desired_name)?
            }
            Err(err) => return Err(err.into()),
        };
        self.pause();

        let payload = self.endpoint_payload(item, &description, dataset.id.clone());
        let endpoint_state = match self.remote.create(ResourceKind::Endpoint, &payload) {
            Ok(_) => "created",
            Err(err) if err.is_conflict() => "already existed",
            Err(err) => return Err(err.into()),
        };

        let mut detail = format!(
            "dataset {}, endpoint {} {endpoint_state}",
            item.desired_name, item.desired_slug
        );
        if self.settings.publish {
            self.pause();
            match self.remote.publish(&item.desired_slug) {
                Ok(()) => detail.push_str(", published"),
                Err(err) if err.is_fatal() => return Err(err.into()),
                Err(err) => {
                    warn!(endpoint = %item.desired_slug, error = %err, "publish failed");
                    detail.push_str(&format!(", publish failed: {err}"));
                }
            }
        }
        Ok(Outcome::Done(detail))
    }
}
