//! `publish`: push endpoints that are not synced to any marketplace.

use crate::api::{Remote, Resource};
use crate::batch::{ItemError, ItemOperation, Outcome, TargetItem};
use crate::ledger::{Ledger, LedgerFile};

/// Endpoints needing a publish, minus those `done` already records as fixed.
pub fn publish_targets(endpoints: &[Resource], done: Option<&Ledger>) -> Vec<TargetItem> {
    endpoints
        .iter()
        .filter(|ep| ep.needs_publish())
        .filter(|ep| done.map_or(true, |ledger| !ledger.is_fixed(ep.key())))
        .map(TargetItem::for_resource)
        .collect()
}

pub struct PublishOp<'a> {
    remote: &'a dyn Remote,
}

impl<'a> PublishOp<'a> {
    pub fn new(remote: &'a dyn Remote) -> Self {
        Self { remote }
    }
}

impl ItemOperation for PublishOp<'_> {
    fn name(&self) -> &'static str {
        "publish"
    }

    fn plan(&self, item: &TargetItem, _ledger: &Ledger) -> Vec<String> {
        vec![format!("publish {} to all marketplaces", item.identifier)]
    }

    fn execute(&mut self, item: &TargetItem, _ledger: &mut LedgerFile) -> Result<Outcome, ItemError> {
        self.remote.publish(&item.identifier)?;
        Ok(Outcome::Done("published".into()))
    }
}
