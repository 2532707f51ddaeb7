//! Progress ledger: the on-disk record of which items a batch command has
//! finished, which failed, and which endpoints were deleted by `fix-names`
//! but not yet recreated.
//!
//! The file is pretty-printed JSON so an operator can read and edit it. Every
//! write goes through a temp file in the same directory followed by a rename,
//! so an interrupted process leaves either the previous or the next state on
//! disk, never a torn file.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::LedgerError;

/// What is needed to recreate an endpoint after it has been deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recreate {
    /// Body for `POST /endpoints/`.
    pub payload: Value,
    /// Publish again once recreated.
    #[serde(default)]
    pub republish: bool,
    pub deleted_at: DateTime<Utc>,
    /// False while only the intent to delete is recorded: the process may
    /// have stopped before or after the service removed the endpoint.
    #[serde(default = "delete_confirmed")]
    pub confirmed: bool,
}

// Entries written before the intent state existed were only written after
// the delete had gone through.
fn delete_confirmed() -> bool {
    true
}

/// Keys older progress files used for finished items, per command.
fn legacy_fixed_keys(operation: &str) -> &'static [&'static str] {
    match operation {
        "deploy" => &["deployed", "completed"],
        "update" => &["updated"],
        _ => &[],
    }
}

/// Rename the finished-items key of an older progress file to `fixed`.
/// Files that already have `fixed` are left alone, and other commands'
/// keys are ignored.
fn migrate_legacy_keys(raw: &mut Value, operation: &str) {
    let Some(map) = raw.as_object_mut() else {
        return;
    };
    if map.contains_key("fixed") {
        return;
    }
    for key in legacy_fixed_keys(operation) {
        if let Some(done) = map.remove(*key) {
            debug!(key = *key, operation, "reading legacy progress key");
            map.insert("fixed".into(), done);
            return;
        }
    }
}

/// Outcome record of one batch command.
///
/// An identifier is in at most one of `fixed` and `failed`. Identifiers in
/// `fixed` are skipped by resuming runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub operation: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub runs: u32,
    #[serde(default)]
    fixed: BTreeSet<String>,
    #[serde(default)]
    failed: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    reasons: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    deleted: BTreeMap<String, Recreate>,
}

impl Ledger {
    pub fn new(operation: &str) -> Self {
        let now = Utc::now();
        Self {
            operation: operation.to_string(),
            created_at: now,
            updated_at: now,
            runs: 0,
            fixed: BTreeSet::new(),
            failed: BTreeSet::new(),
            reasons: BTreeMap::new(),
            deleted: BTreeMap::new(),
        }
    }

    /// Read a ledger. A missing file is an empty ledger; an unreadable or
    /// unparsable one is an error.
    pub fn load(path: &Path, operation: &str) -> Result<Self, LedgerError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no ledger yet, starting empty");
                return Ok(Self::new(operation));
            }
            Err(source) => {
                return Err(LedgerError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let corrupt = |source: serde_json::Error| LedgerError::Corrupt {
            path: path.to_path_buf(),
            source,
        };
        let mut raw: Value = serde_json::from_str(&text).map_err(corrupt)?;
        migrate_legacy_keys(&mut raw, operation);
        let mut ledger: Self = serde_json::from_value(raw).map_err(corrupt)?;
        if ledger.operation.is_empty() {
            ledger.operation = operation.to_string();
        } else if ledger.operation != operation {
            warn!(
                path = %path.display(),
                recorded = %ledger.operation,
                requested = operation,
                "ledger was written by a different command"
            );
        }
        // A hand-edited file may list an id in both sets; success wins.
        let overlap: Vec<String> = ledger.fixed.intersection(&ledger.failed).cloned().collect();
        for id in overlap {
            ledger.failed.remove(&id);
            ledger.reasons.remove(&id);
        }
        Ok(ledger)
    }

    /// Write atomically: temp file in the target directory, then rename.
    pub fn save(&self, path: &Path) -> Result<(), LedgerError> {
        let io_err = |source: std::io::Error| LedgerError::Io {
            path: path.to_path_buf(),
            source,
        };
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(io_err)?;

        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');

        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
        tmp.write_all(text.as_bytes()).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    pub fn is_fixed(&self, id: &str) -> bool {
        self.fixed.contains(id)
    }

    pub fn is_failed(&self, id: &str) -> bool {
        self.failed.contains(id)
    }

    pub fn fixed(&self) -> &BTreeSet<String> {
        &self.fixed
    }

    pub fn failed(&self) -> &BTreeSet<String> {
        &self.failed
    }

    pub fn reason(&self, id: &str) -> Option<&str> {
        self.reasons.get(id).map(String::as_str)
    }

    /// Recreate record for an endpoint deleted but not yet recreated.
    pub fn deleted(&self, id: &str) -> Option<&Recreate> {
        self.deleted.get(id)
    }

    pub fn deleted_entries(&self) -> impl Iterator<Item = (&str, &Recreate)> {
        self.deleted.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Identifiers from `items` that are neither fixed nor failed.
    pub fn pending<'a>(&self, items: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
        items
            .into_iter()
            .filter(|id| !self.fixed.contains(*id) && !self.failed.contains(*id))
            .collect()
    }

    pub fn record_success(&mut self, id: &str) {
        self.failed.remove(id);
        self.reasons.remove(id);
        self.deleted.remove(id);
        self.fixed.insert(id.to_string());
        self.updated_at = Utc::now();
    }

    pub fn record_failure(&mut self, id: &str, reason: &str) {
        self.fixed.remove(id);
        self.failed.insert(id.to_string());
        self.reasons.insert(id.to_string(), reason.to_string());
        self.updated_at = Utc::now();
    }

    pub fn record_deleted(&mut self, id: &str, recreate: Recreate) {
        self.deleted.insert(id.to_string(), recreate);
        self.updated_at = Utc::now();
    }
}

/// A ledger bound to its file. Every mutation is flushed before returning;
/// an unbound ledger (`detached`) only lives in memory.
#[derive(Debug)]
pub struct LedgerFile {
    path: Option<PathBuf>,
    ledger: Ledger,
}

impl LedgerFile {
    pub fn open(path: impl Into<PathBuf>, operation: &str) -> Result<Self, LedgerError> {
        let path = path.into();
        let ledger = Ledger::load(&path, operation)?;
        Ok(Self {
            path: Some(path),
            ledger,
        })
    }

    pub fn detached(ledger: Ledger) -> Self {
        Self { path: None, ledger }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn into_ledger(self) -> Ledger {
        self.ledger
    }

    pub fn begin_run(&mut self) -> Result<(), LedgerError> {
        self.ledger.runs += 1;
        self.ledger.updated_at = Utc::now();
        self.flush()
    }

    pub fn record_success(&mut self, id: &str) -> Result<(), LedgerError> {
        self.ledger.record_success(id);
        self.flush()
    }

    pub fn record_failure(&mut self, id: &str, reason: &str) -> Result<(), LedgerError> {
        self.ledger.record_failure(id, reason);
        self.flush()
    }

    pub fn record_deleted(&mut self, id: &str, recreate: Recreate) -> Result<(), LedgerError> {
        self.ledger.record_deleted(id, recreate);
        self.flush()
    }

    pub fn flush(&self) -> Result<(), LedgerError> {
        match &self.path {
            Some(path) => self.ledger.save(path),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_empty_ledger() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::load(&dir.path().join("absent.json"), "deploy").unwrap();
        assert!(ledger.fixed().is_empty());
        assert!(ledger.failed().is_empty());
        assert_eq!(ledger.operation, "deploy");
        assert!(!dir.path().join("absent.json").exists());
    }

    #[test]
    fn corrupt_file_fails_fast() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        fs::write(&path, "{ not json").unwrap();
        let err = Ledger::load(&path, "deploy").unwrap_err();
        assert!(matches!(err, LedgerError::Corrupt { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn save_then_load_preserves_state_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        let mut ledger = Ledger::new("fix-names");
        ledger.record_success("a");
        ledger.record_failure("b", "HTTP 500");
        ledger.record_deleted(
            "c",
            Recreate {
                payload: json!({ "slug": "c", "name": "c" }),
                republish: true,
                deleted_at: Utc::now(),
                confirmed: false,
            },
        );
        ledger.save(&path).unwrap();

        let loaded = Ledger::load(&path, "fix-names").unwrap();
        assert_eq!(loaded, ledger);
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn success_clears_failure_and_deleted_state() {
        let mut ledger = Ledger::new("fix-names");
        ledger.record_failure("x", "boom");
        ledger.record_deleted(
            "x",
            Recreate {
                payload: json!({}),
                republish: false,
                deleted_at: Utc::now(),
                confirmed: true,
            },
        );
        ledger.record_success("x");
        assert!(ledger.is_fixed("x"));
        assert!(!ledger.is_failed("x"));
        assert!(ledger.reason("x").is_none());
        assert!(ledger.deleted("x").is_none());
    }

    #[test]
    fn failure_moves_out_of_fixed() {
        let mut ledger = Ledger::new("deploy");
        ledger.record_success("x");
        ledger.record_failure("x", "rejected");
        assert!(!ledger.is_fixed("x"));
        assert!(ledger.is_failed("x"));
        assert_eq!(ledger.reason("x"), Some("rejected"));
    }

    #[test]
    fn pending_excludes_fixed_and_failed() {
        let mut ledger = Ledger::new("deploy");
        ledger.record_success("a");
        ledger.record_failure("b", "r");
        assert_eq!(ledger.pending(["a", "b", "c", "d"]), vec!["c", "d"]);
    }

    #[test]
    fn loads_legacy_progress_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.json");
        fs::write(
            &path,
            r#"{"deployed": ["a", "b"], "failed": ["c", "a"], "in_progress": null}"#,
        )
        .unwrap();
        let ledger = Ledger::load(&path, "deploy").unwrap();
        assert!(ledger.is_fixed("a") && ledger.is_fixed("b"));
        assert!(ledger.is_failed("c"));
        assert!(!ledger.is_failed("a"));
    }

    #[test]
    fn legacy_keys_belong_to_their_own_command() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.json");
        fs::write(&path, r#"{"deployed": ["a"], "updated": ["b"], "failed": []}"#).unwrap();

        let update = Ledger::load(&path, "update").unwrap();
        assert!(update.is_fixed("b"));
        assert!(!update.is_fixed("a"));

        let publish = Ledger::load(&path, "publish").unwrap();
        assert!(publish.fixed().is_empty());
    }

    #[test]
    fn fixed_key_wins_over_legacy_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.json");
        fs::write(&path, r#"{"fixed": ["new"], "deployed": ["old"], "failed": []}"#).unwrap();

        let ledger = Ledger::load(&path, "deploy").unwrap();
        assert!(ledger.is_fixed("new"));
        assert!(!ledger.is_fixed("old"));
    }

    #[test]
    fn deleted_entries_without_state_count_as_confirmed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fix-names.json");
        fs::write(
            &path,
            r#"{"fixed": [], "failed": [], "deleted": {"x": {"payload": {"slug": "x"}, "deleted_at": "2026-01-05T10:00:00Z"}}}"#,
        )
        .unwrap();

        let ledger = Ledger::load(&path, "fix-names").unwrap();
        assert!(ledger.deleted("x").unwrap().confirmed);
    }

    #[test]
    fn detached_ledger_never_touches_disk() {
        let mut file = LedgerFile::detached(Ledger::new("publish"));
        file.record_success("a").unwrap();
        assert!(file.path().is_none());
        assert!(file.ledger().is_fixed("a"));
    }

    #[test]
    fn ledger_file_flushes_every_mutation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("ledger.json");
        let mut file = LedgerFile::open(&path, "update").unwrap();
        file.record_failure("a", "HTTP 422").unwrap();
        let on_disk = Ledger::load(&path, "update").unwrap();
        assert!(on_disk.is_failed("a"));
    }
}
