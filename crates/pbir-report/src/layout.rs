use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{PbirError, Result};

pub const REPORT_JSON: &str = "report.json";
pub const REPORT_EXTENSIONS_JSON: &str = "reportExtensions.json";
pub const PAGES_JSON: &str = "pages.json";
pub const PAGE_JSON: &str = "page.json";
pub const VISUAL_JSON: &str = "visual.json";
pub const BOOKMARKS_JSON: &str = "bookmarks.json";
pub const BOOKMARK_SUFFIX: &str = ".bookmark.json";

/// Paths inside a PBIR report folder (`<Name>.Report/definition/...`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportLayout {
    root: PathBuf,
}

impl ReportLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Like [`ReportLayout::new`] but insists on a `definition` directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let layout = Self::new(root);
        if !layout.definition().is_dir() {
            return Err(PbirError::NotAReport { path: layout.root });
        }
        Ok(layout)
    }

    /// Resolve `dir` to report folders: `dir` itself when it is a report, otherwise every
    /// `*.Report` child folder (optionally only those named in `only`, with or without the
    /// `.Report` suffix). Results are sorted by path.
    pub fn discover(dir: impl AsRef<Path>, only: Option<&[String]>) -> Result<Vec<Self>> {
        let dir = dir.as_ref();
        let itself = Self::new(dir);
        if itself.report_json().is_file() {
            return Ok(vec![itself]);
        }

        let entries = fs::read_dir(dir).map_err(PbirError::io(dir))?;
        let mut reports = Vec::new();
        for entry in entries {
            let entry = entry.map_err(PbirError::io(dir))?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(stem) = name.strip_suffix(".Report") else {
                continue;
            };
            if let Some(only) = only {
                if !only.iter().any(|wanted| wanted == name || wanted == stem) {
                    continue;
                }
            }
            let layout = Self::new(&path);
            if layout.report_json().is_file() {
                reports.push(layout);
            }
        }
        reports.sort_by(|a, b| a.root.cmp(&b.root));
        Ok(reports)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder name without the `.Report` suffix.
    pub fn name(&self) -> String {
        let name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root.display().to_string());
        match name.strip_suffix(".Report") {
            Some(stem) => stem.to_string(),
            None => name,
        }
    }

    pub fn definition(&self) -> PathBuf {
        self.root.join("definition")
    }

    pub fn report_json(&self) -> PathBuf {
        self.definition().join(REPORT_JSON)
    }

    pub fn report_extensions_json(&self) -> PathBuf {
        self.definition().join(REPORT_EXTENSIONS_JSON)
    }

    pub fn pages_dir(&self) -> PathBuf {
        self.definition().join("pages")
    }

    pub fn pages_json(&self) -> PathBuf {
        self.pages_dir().join(PAGES_JSON)
    }

    pub fn page_dir(&self, page: &str) -> PathBuf {
        self.pages_dir().join(page)
    }

    pub fn page_json(&self, page: &str) -> PathBuf {
        self.page_dir(page).join(PAGE_JSON)
    }

    pub fn visuals_dir(&self, page: &str) -> PathBuf {
        self.page_dir(page).join("visuals")
    }

    pub fn bookmarks_dir(&self) -> PathBuf {
        self.definition().join("bookmarks")
    }

    pub fn bookmarks_json(&self) -> PathBuf {
        self.bookmarks_dir().join(BOOKMARKS_JSON)
    }

    /// Sub-directory names of `pages/`, sorted.
    pub fn page_dirs_on_disk(&self) -> Vec<String> {
        list_dirs(&self.pages_dir())
    }

    /// Every `*.bookmark.json` in the bookmarks folder, sorted by path.
    pub fn bookmark_files(&self) -> Vec<PathBuf> {
        files_named(&self.bookmarks_dir(), |name| name.ends_with(BOOKMARK_SUFFIX))
    }
}

fn list_dirs(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .collect();
    names.sort();
    names
}

pub(crate) fn files_named(dir: &Path, matches: impl Fn(&str) -> bool) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                log::warn!("skipping unreadable entry under {}: {err}", dir.display());
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.file_name().to_str().is_some_and(&matches))
        .map(|entry| entry.into_path())
        .collect()
}

/// Whether `dir` is missing or has no entries at all.
pub(crate) fn dir_is_empty(dir: &Path) -> bool {
    match fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_accepts_a_report_or_a_folder_of_reports() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["A.Report", "B.Report", "Model.SemanticModel"] {
            let definition = dir.path().join(name).join("definition");
            fs::create_dir_all(&definition).unwrap();
            fs::write(definition.join(REPORT_JSON), "{}").unwrap();
        }

        let all = ReportLayout::discover(dir.path(), None).unwrap();
        let names: Vec<String> = all.iter().map(ReportLayout::name).collect();
        assert_eq!(names, vec!["A".to_string(), "B".to_string()]);

        let only = vec!["B".to_string()];
        let some = ReportLayout::discover(dir.path(), Some(only.as_slice())).unwrap();
        assert_eq!(some.len(), 1);
        assert_eq!(some[0].name(), "B");

        let single = ReportLayout::discover(dir.path().join("A.Report"), None).unwrap();
        assert_eq!(single, vec![ReportLayout::new(dir.path().join("A.Report"))]);
    }

    #[test]
    fn open_rejects_folders_without_definition() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ReportLayout::open(dir.path()),
            Err(PbirError::NotAReport { .. })
        ));
    }
}
