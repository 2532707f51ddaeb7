//! `delete`: remove endpoints and/or datasets. Endpoints go first so no
//! endpoint is left pointing at a deleted dataset.

use crate::api::{Remote, Resource, ResourceKind};
use crate::batch::{ItemError, ItemOperation, Outcome, TargetItem};
use crate::ledger::{Ledger, LedgerFile};

/// Ledger identifiers are namespaced so one file can track both kinds.
pub fn target_id(kind: ResourceKind, key: &str) -> String {
    format!("{kind}:{key}")
}

/// Inverse of [`target_id`].
pub fn parse_target_id(id: &str) -> Option<(ResourceKind, &str)> {
    let (kind, key) = id.split_once(':')?;
    let kind = match kind {
        "dataset" => ResourceKind::Dataset,
        "endpoint" => ResourceKind::Endpoint,
        _ => return None,
    };
    (!key.is_empty()).then_some((kind, key))
}

pub fn delete_targets(endpoints: &[Resource], datasets: &[Resource]) -> Vec<TargetItem> {
    let endpoints = endpoints
        .iter()
        .map(|r| (ResourceKind::Endpoint, r));
    let datasets = datasets.iter().map(|r| (ResourceKind::Dataset, r));
    endpoints
        .chain(datasets)
        .map(|(kind, r)| TargetItem::new(target_id(kind, r.key())).named(r.name.clone(), r.key()))
        .collect()
}

pub struct DeleteOp<'a> {
    remote: &'a dyn Remote,
}

impl<'a> DeleteOp<'a> {
    pub fn new(remote: &'a dyn Remote) -> Self {
        Self { remote }
    }
}

impl ItemOperation for DeleteOp<'_> {
    fn name(&self) -> &'static str {
        "delete"
    }

    fn plan(&self, item: &TargetItem, _ledger: &Ledger) -> Vec<String> {
        match parse_target_id(&item.identifier) {
            Some((kind, key)) => vec![format!("delete {kind} {key}")],
            None => vec![format!("cannot parse {}", item.identifier)],
        }
    }

    fn execute(&mut self, item: &TargetItem, _ledger: &mut LedgerFile) -> Result<Outcome, ItemError> {
        let (kind, key) = parse_target_id(&item.identifier)
            .ok_or_else(|| ItemError::Invalid(format!("unrecognized item {}", item.identifier)))?;
        match self.remote.delete(kind, key) {
            Ok(()) => Ok(Outcome::Done("deleted".into())),
            Err(err) if err.is_not_found() => Ok(Outcome::Done("already gone".into())),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_ids_round_trip() {
        let id = target_id(ResourceKind::Endpoint, "acta-numerica-oa");
        assert_eq!(id, "endpoint:acta-numerica-oa");
        assert_eq!(
            parse_target_id(&id),
            Some((ResourceKind::Endpoint, "acta-numerica-oa"))
        );
        assert_eq!(parse_target_id("widget:x"), None);
        assert_eq!(parse_target_id("dataset:"), None);
    }
}
