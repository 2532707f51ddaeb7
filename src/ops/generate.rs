//! `generate`: write an AI description for each dataset directory, both as
//! `journal_description.md` inside the directory and into a descriptions JSON
//! file that `deploy` and `update` read.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::batch::{ItemError, ItemOperation, Outcome, TargetItem};
use crate::describe::Describer;
use crate::discovery::{save_descriptions, write_description_file, DESCRIPTION_FILENAME};
use crate::ledger::{Ledger, LedgerFile};

pub struct GenerateOp {
    describer: Describer,
    source_dir: PathBuf,
    output: PathBuf,
    descriptions: BTreeMap<String, String>,
}

impl GenerateOp {
    /// `existing` is the current content of `output`; new entries are merged in.
    pub fn new(
        describer: Describer,
        source_dir: PathBuf,
        output: PathBuf,
        existing: BTreeMap<String, String>,
    ) -> Self {
        Self {
            describer,
            source_dir,
            output,
            descriptions: existing,
        }
    }

    pub fn descriptions(&self) -> &BTreeMap<String, String> {
        &self.descriptions
    }
}

impl ItemOperation for GenerateOp {
    fn name(&self) -> &'static str {
        "generate"
    }

    fn plan(&self, item: &TargetItem, _ledger: &Ledger) -> Vec<String> {
        vec![format!(
            "generate {}/{}/{DESCRIPTION_FILENAME}",
            self.source_dir.display(),
            item.identifier
        )]
    }

    fn execute(&mut self, item: &TargetItem, _ledger: &mut LedgerFile) -> Result<Outcome, ItemError> {
        let name = &item.identifier;
        let dir = self.source_dir.join(name);
        let text = self.describer.describe(name, &dir)?;

        write_description_file(&dir, &text).map_err(|e| ItemError::Invalid(format!("{e:#}")))?;
        self.descriptions.insert(name.clone(), text.clone());
        save_descriptions(&self.output, &self.descriptions)
            .map_err(|e| ItemError::Invalid(format!("{e:#}")))?;
        Ok(Outcome::Done(format!("{} chars", text.len())))
    }
}
