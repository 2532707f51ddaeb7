//! `update`: refresh endpoint descriptions (and optionally summaries).

use std::collections::BTreeMap;

use serde_json::json;

use crate::api::{Remote, ResourceKind};
use crate::batch::{ItemError, ItemOperation, Outcome, TargetItem};
use crate::ledger::{Ledger, LedgerFile};
use crate::slug::{display_name, render, strip_known_suffix};

pub struct UpdateOp<'a> {
    remote: &'a dyn Remote,
    descriptions: BTreeMap<String, String>,
    summary_template: Option<String>,
}

impl<'a> UpdateOp<'a> {
    pub fn new(remote: &'a dyn Remote, descriptions: BTreeMap<String, String>) -> Self {
        Self {
            remote,
            descriptions,
            summary_template: None,
        }
    }

    pub fn with_summary_template(mut self, template: Option<String>) -> Self {
        self.summary_template = template;
        self
    }

    /// Description keyed by the slug itself, or by the dataset name the slug
    /// was derived from (`acta-numerica-oa` -> `acta-numerica`).
    pub fn lookup(&self, slug: &str) -> Option<&str> {
        self.descriptions
            .get(slug)
            .or_else(|| self.descriptions.get(strip_known_suffix(slug)))
            .map(String::as_str)
    }
}

impl ItemOperation for UpdateOp<'_> {
    fn name(&self) -> &'static str {
        "update"
    }

    fn plan(&self, item: &TargetItem, _ledger: &Ledger) -> Vec<String> {
        match self.lookup(&item.identifier) {
            Some(text) => vec![format!("update description ({} chars)", text.len())],
            None => vec!["no description available, would skip".into()],
        }
    }

    fn execute(&mut self, item: &TargetItem, _ledger: &mut LedgerFile) -> Result<Outcome, ItemError> {
        let slug = &item.identifier;
        let Some(description) = self.lookup(slug) else {
            return Ok(Outcome::Skipped("no description".into()));
        };
        let chars = description.len();
        let mut fields = json!({ "description": description });
        if let Some(template) = &self.summary_template {
            let name = display_name(strip_known_suffix(slug));
            fields["summary"] = json!(render(template, &name));
        }
        self.remote.update(ResourceKind::Endpoint, slug, &fields)?;
        Ok(Outcome::Done(format!("description updated ({chars} chars)")))
    }
}
