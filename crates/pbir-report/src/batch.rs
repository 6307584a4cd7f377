//! Batch rename of table and column references across every JSON file of a project.

use std::path::{Path, PathBuf};

use pbir_fs::JsonFileError;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::json_rewrite::{rewrite_entities, rewrite_properties};
use crate::layout::files_named;
use crate::mapping::{build_rename_mapping, load_mapping_csv, RenameMapping};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub dry_run: bool,
    pub files_scanned: usize,
    pub changed: Vec<PathBuf>,
    /// Files that could not be read, parsed or written, with the cause.
    pub failed: Vec<(PathBuf, String)>,
}

/// Rename references in one JSON document on disk.
///
/// Entities are rewritten before properties so column keys resolve against the new table
/// names. Returns whether the document changed (and was written, unless `dry_run`).
pub fn update_component(
    path: impl AsRef<Path>,
    mapping: &RenameMapping,
    dry_run: bool,
) -> Result<bool, JsonFileError> {
    let path = path.as_ref();
    let mut doc: Value = pbir_fs::read_json(path)?;
    let entities = rewrite_entities(&mut doc, &mapping.tables);
    let properties = rewrite_properties(&mut doc, &mapping.columns);
    let changed = entities || properties;
    if changed && !dry_run {
        pbir_fs::write_json(path, &doc)?;
    }
    Ok(changed)
}

/// Apply the renames in `csv_path` to every `*.json` file below `dir`.
///
/// A CSV without the required columns fails before any file is touched. Individual files that
/// cannot be processed are logged, listed in [`BatchReport::failed`] and skipped.
pub fn batch_update_project(
    dir: impl AsRef<Path>,
    csv_path: impl AsRef<Path>,
    dry_run: bool,
) -> Result<BatchReport> {
    let rows = load_mapping_csv(csv_path)?;
    let mapping = build_rename_mapping(&rows);
    Ok(apply_mapping(dir.as_ref(), &mapping, dry_run))
}

/// [`batch_update_project`] with an already built mapping.
pub fn apply_mapping(dir: &Path, mapping: &RenameMapping, dry_run: bool) -> BatchReport {
    let mut report = BatchReport {
        dry_run,
        ..BatchReport::default()
    };
    if mapping.is_empty() {
        log::info!("mapping is empty; nothing to rename");
        return report;
    }

    for path in files_named(dir, |name| name.ends_with(".json")) {
        report.files_scanned += 1;
        match update_component(&path, mapping, dry_run) {
            Ok(true) => {
                log::info!(
                    "{} {}",
                    if dry_run { "would update" } else { "updated" },
                    path.display()
                );
                report.changed.push(path);
            }
            Ok(false) => {}
            Err(err) => {
                log::warn!("skipping {}: {err}", path.display());
                report.failed.push((path, err.to_string()));
            }
        }
    }

    log::info!(
        "scanned {} file(s) under {}: {} changed, {} failed",
        report.files_scanned,
        dir.display(),
        report.changed.len(),
        report.failed.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::MappingRow;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::fs;

    #[test]
    fn component_update_renames_table_then_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("visual.json");
        fs::write(
            &path,
            json!({"field": {"Column": {
                "Expression": {"SourceRef": {"Entity": "T"}},
                "Property": "C"
            }}})
            .to_string(),
        )
        .unwrap();
        let rows = [MappingRow::new("T", "C", "T2", "C2")];
        let mapping = build_rename_mapping(&rows);

        assert!(update_component(&path, &mapping, true).unwrap());
        assert!(fs::read_to_string(&path).unwrap().contains("\"T\""));

        assert!(update_component(&path, &mapping, false).unwrap());
        let doc: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            doc,
            json!({"field": {"Column": {
                "Expression": {"SourceRef": {"Entity": "T2"}},
                "Property": "C2"
            }}})
        );
        assert!(!update_component(&path, &mapping, false).unwrap());
    }

    #[test]
    fn malformed_files_are_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.json"), "{ nope").unwrap();
        fs::write(
            dir.path().join("good.json"),
            json!({"Entity": "Old"}).to_string(),
        )
        .unwrap();
        let rows = [MappingRow::new("Old", "", "New", "")];
        let report = apply_mapping(dir.path(), &build_rename_mapping(&rows), false);

        assert_eq!(report.files_scanned, 2);
        assert_eq!(report.changed, vec![dir.path().join("good.json")]);
        assert_eq!(report.failed.len(), 1);
    }
}
