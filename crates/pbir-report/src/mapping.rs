//! Rename mappings: CSV input rows and the table/column maps built from them.

use std::io;
use std::path::{Path, PathBuf};

use pbir_dax::{ColumnMap, TableMap};

/// Header names a mapping CSV must carry (in any order, extra columns allowed).
pub const MAPPING_COLUMNS: [&str; 4] = ["old_tbl", "old_col", "new_tbl", "new_col"];

#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("unable to open mapping CSV `{path}`: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("mapping CSV must contain the columns {}; missing: {}", MAPPING_COLUMNS.join(", "), .missing.join(", "))]
    MissingColumns { missing: Vec<String> },
    #[error("malformed mapping CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// One accepted line of a mapping CSV. Empty cells are empty strings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MappingRow {
    pub old_tbl: String,
    pub old_col: String,
    pub new_tbl: String,
    pub new_col: String,
}

impl MappingRow {
    pub fn new(
        old_tbl: impl Into<String>,
        old_col: impl Into<String>,
        new_tbl: impl Into<String>,
        new_col: impl Into<String>,
    ) -> Self {
        Self {
            old_tbl: old_tbl.into(),
            old_col: old_col.into(),
            new_tbl: new_tbl.into(),
            new_col: new_col.into(),
        }
    }

    /// A row says something only when it names a table and either renames that table or
    /// renames one of its columns.
    pub fn is_actionable(&self) -> bool {
        !self.old_tbl.is_empty()
            && (!self.new_tbl.is_empty() || (!self.old_col.is_empty() && !self.new_col.is_empty()))
    }
}

/// The read-only rename state shared by every file of a batch run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenameMapping {
    pub tables: TableMap,
    pub columns: ColumnMap,
}

impl RenameMapping {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.columns.is_empty()
    }
}

/// Build the table and column maps for a batch of rows.
///
/// Column keys use the effective table name: when a row renames both the table and a column,
/// the column is keyed under the NEW table name because property rewriting runs after entity
/// rewriting.
pub fn build_rename_mapping<'a>(rows: impl IntoIterator<Item = &'a MappingRow>) -> RenameMapping {
    let mut mapping = RenameMapping::default();
    for row in rows {
        if !row.new_tbl.is_empty() && row.new_tbl != row.old_tbl {
            mapping.tables.insert(row.old_tbl.as_str(), row.new_tbl.as_str());
        }
        if !row.old_col.is_empty() && !row.new_col.is_empty() {
            let effective = mapping.tables.effective(&row.old_tbl).to_string();
            mapping
                .columns
                .insert(effective, row.old_col.as_str(), row.new_col.as_str());
        }
    }
    mapping
}

/// Load and filter a mapping CSV from disk.
pub fn load_mapping_csv(path: impl AsRef<Path>) -> Result<Vec<MappingRow>, MappingError> {
    let path = path.as_ref();
    let reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|source| MappingError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    read_rows(reader)
}

/// Load and filter mapping rows from any reader (header row first).
pub fn load_mapping_reader<R: io::Read>(reader: R) -> Result<Vec<MappingRow>, MappingError> {
    let reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    read_rows(reader)
}

fn read_rows<R: io::Read>(mut reader: csv::Reader<R>) -> Result<Vec<MappingRow>, MappingError> {
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let name = if idx == 0 {
                name.trim_start_matches('\u{feff}')
            } else {
                name
            };
            name.to_string()
        })
        .collect();

    let mut indices = [0usize; 4];
    let mut missing = Vec::new();
    for (slot, column) in indices.iter_mut().zip(MAPPING_COLUMNS) {
        match headers.iter().position(|h| h == column) {
            Some(idx) => *slot = idx,
            None => missing.push(column.to_string()),
        }
    }
    if !missing.is_empty() {
        return Err(MappingError::MissingColumns { missing });
    }

    let [old_tbl, old_col, new_tbl, new_col] = indices;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let cell = |idx: usize| record.get(idx).unwrap_or_default().to_string();
        let row = MappingRow {
            old_tbl: cell(old_tbl),
            old_col: cell(old_col),
            new_tbl: cell(new_tbl),
            new_col: cell(new_col),
        };
        if row.is_actionable() {
            rows.push(row);
        } else {
            log::debug!("ignoring mapping row without a rename: {row:?}");
        }
    }
    Ok(rows)
}
