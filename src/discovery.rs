// Local dataset discovery: every non-hidden subdirectory of the source
// directory is one dataset. Also reads and writes the description files that
// `generate` produces and `deploy`/`update` consume.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Per-dataset description written by `generate`.
pub const DESCRIPTION_FILENAME: &str = "journal_description.md";

/// Used when no file types can be detected.
pub const FALLBACK_FILE_TYPES: &[&str] = &[".pdf", ".json"];

/// Sorted names of the non-hidden subdirectories of `source_dir`.
pub fn discover_datasets(source_dir: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(source_dir)
        .with_context(|| format!("Failed to read source directory {}", source_dir.display()))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.context("Failed to read directory entry")?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Lower-cased file extensions (with the dot) found in the first dataset
/// directory, looking at no more than `sample_limit` entries.
pub fn detect_file_types(source_dir: &Path, sample_limit: usize) -> Result<Vec<String>> {
    let datasets = discover_datasets(source_dir)?;
    let Some(first) = datasets.first() else {
        return Ok(Vec::new());
    };

    let mut found = BTreeSet::new();
    let mut stack: Vec<PathBuf> = vec![source_dir.join(first)];
    let mut seen = 0usize;
    'walk: while let Some(dir) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            if seen >= sample_limit {
                break 'walk;
            }
            seen += 1;
            let path = entry.path();
            match entry.file_type() {
                Ok(t) if t.is_dir() => stack.push(path),
                Ok(t) if t.is_file() => {
                    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                        found.insert(format!(".{}", ext.to_lowercase()));
                    }
                }
                _ => {}
            }
        }
    }
    Ok(found.into_iter().collect())
}

/// Split a comma-separated `--file-types` value: `pdf, .JSON` -> `.pdf`, `.json`.
pub fn parse_file_types(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| format!(".{}", t.trim_start_matches('.').to_lowercase()))
        .collect()
}

/// Contents of `<dataset_dir>/journal_description.md`, if present and non-empty.
pub fn read_description_file(dataset_dir: &Path) -> Option<String> {
    let text = fs::read_to_string(dataset_dir.join(DESCRIPTION_FILENAME)).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

pub fn write_description_file(dataset_dir: &Path, description: &str) -> Result<()> {
    let path = dataset_dir.join(DESCRIPTION_FILENAME);
    fs::write(&path, description).with_context(|| format!("Failed to write {}", path.display()))
}

/// Descriptions JSON: object mapping dataset name (or endpoint slug) to text.
/// A missing file loads as empty.
pub fn load_descriptions(path: &Path) -> Result<BTreeMap<String, String>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read descriptions {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Descriptions file {} is not a JSON object of strings", path.display()))
}

/// Write the descriptions JSON atomically.
pub fn save_descriptions(path: &Path, descriptions: &BTreeMap<String, String>) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create {}", parent.display()))?;
    let text = serde_json::to_string_pretty(descriptions).context("Failed to encode descriptions")?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent).context("Failed to create temp file")?;
    tmp.write_all(text.as_bytes())
        .and_then(|()| tmp.write_all(b"\n"))
        .context("Failed to write descriptions")?;
    tmp.persist(path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
