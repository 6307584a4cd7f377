//! Typed, read-only snapshot of a report folder.
//!
//! Documents are kept as raw JSON next to the few typed accessors the analyses need. Missing
//! optional files load as `None`; malformed files are logged and skipped, never fatal.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::layout::{self, ReportLayout};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PageBinding {
    ReportSection,
    Tooltip,
    Drillthrough,
    Other(String),
}

impl PageBinding {
    fn parse(kind: &str) -> Self {
        match kind {
            "ReportSection" => PageBinding::ReportSection,
            "Tooltip" => PageBinding::Tooltip,
            "Drillthrough" => PageBinding::Drillthrough,
            other => PageBinding::Other(other.to_string()),
        }
    }
}

pub const HIDDEN_IN_VIEW_MODE: &str = "HiddenInViewMode";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum FieldKind {
    Column,
    Measure,
    /// Name recovered from a `queryRef`/`nativeQueryRef` string.
    QueryRef,
}

/// A table/column/measure reference found in a visual.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FieldRef {
    pub kind: FieldKind,
    pub table: Option<String>,
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct Visual {
    /// Folder name under `visuals/`.
    pub id: String,
    pub path: PathBuf,
    pub doc: Value,
}

impl Visual {
    /// The `name` recorded in `visual.json`, falling back to the folder name.
    pub fn name(&self) -> &str {
        self.doc
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(&self.id)
    }

    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(&self.path)
    }

    pub fn visual_type(&self) -> Option<&str> {
        self.doc.pointer("/visual/visualType").and_then(Value::as_str)
    }

    pub fn parent_group(&self) -> Option<&str> {
        self.doc.get("parentGroupName").and_then(Value::as_str)
    }

    pub fn is_hidden(&self) -> bool {
        self.doc
            .get("isHidden")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Group containers carry a `visualGroup` object instead of a `visual`.
    pub fn is_group(&self) -> bool {
        self.doc.get("visualGroup").is_some()
    }

    /// Field references used anywhere in the visual, sorted and de-duplicated.
    pub fn fields(&self) -> Vec<FieldRef> {
        let mut fields = Vec::new();
        collect_fields(&self.doc, &mut fields);
        fields.sort();
        fields.dedup();
        fields
    }
}

fn collect_fields(value: &Value, out: &mut Vec<FieldRef>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                match (key.as_str(), child) {
                    ("Column" | "Measure", Value::Object(binding)) => {
                        if let Some(name) = binding.get("Property").and_then(Value::as_str) {
                            out.push(FieldRef {
                                kind: if key.as_str() == "Column" {
                                    FieldKind::Column
                                } else {
                                    FieldKind::Measure
                                },
                                table: child
                                    .pointer("/Expression/SourceRef/Entity")
                                    .and_then(Value::as_str)
                                    .map(str::to_string),
                                name: name.to_string(),
                            });
                        }
                    }
                    ("queryRef", Value::String(query_ref)) if !query_ref.contains('(') => {
                        let (table, name) = match query_ref.split_once('.') {
                            Some((table, name)) => (Some(table.to_string()), name),
                            None => (None, query_ref.as_str()),
                        };
                        out.push(FieldRef {
                            kind: FieldKind::QueryRef,
                            table,
                            name: name.to_string(),
                        });
                    }
                    ("nativeQueryRef", Value::String(name)) => out.push(FieldRef {
                        kind: FieldKind::QueryRef,
                        table: None,
                        name: name.clone(),
                    }),
                    _ => collect_fields(child, out),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_fields(item, out);
            }
        }
        _ => {}
    }
}

#[derive(Clone, Debug)]
pub struct Page {
    /// Folder name under `pages/`.
    pub id: String,
    pub dir: PathBuf,
    /// `page.json`, when present and well-formed.
    pub doc: Option<Value>,
    /// Position in `pages.json` `pageOrder`.
    pub ordinal: Option<usize>,
    pub visuals: Vec<Visual>,
}

impl Page {
    pub fn display_name(&self) -> Option<&str> {
        self.doc.as_ref()?.get("displayName")?.as_str()
    }

    /// Display name when set, folder name otherwise.
    pub fn label(&self) -> &str {
        self.display_name().unwrap_or(&self.id)
    }

    pub fn binding(&self) -> Option<PageBinding> {
        let kind = self.doc.as_ref()?.pointer("/pageBinding/type")?.as_str()?;
        Some(PageBinding::parse(kind))
    }

    pub fn is_hidden(&self) -> bool {
        self.doc
            .as_ref()
            .and_then(|doc| doc.get("visibility"))
            .and_then(Value::as_str)
            == Some(HIDDEN_IN_VIEW_MODE)
    }

    pub fn visual(&self, name: &str) -> Option<&Visual> {
        self.visuals.iter().find(|visual| visual.name() == name)
    }

    /// Visuals without a parent group, or whose parent group is not on this page.
    pub fn root_visuals(&self) -> Vec<&Visual> {
        self.visuals
            .iter()
            .filter(|visual| match visual.parent_group() {
                None => true,
                Some(parent) => self.visual(parent).is_none(),
            })
            .collect()
    }

    pub fn children_of(&self, group: &str) -> Vec<&Visual> {
        self.visuals
            .iter()
            .filter(|visual| visual.parent_group() == Some(group))
            .collect()
    }

    /// `(source, target)` pairs from `visualInteractions`.
    pub fn interactions(&self) -> Vec<(&str, &str)> {
        let Some(items) = self
            .doc
            .as_ref()
            .and_then(|doc| doc.get("visualInteractions"))
            .and_then(Value::as_array)
        else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| {
                let source = item.get("source")?.as_str()?;
                let target = item.get("target")?.as_str()?;
                Some((source, target))
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Measure {
    pub name: String,
    pub entity: String,
    pub expression: String,
}

/// A visual container override inside a bookmark section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerRef<'a> {
    pub section: &'a str,
    pub visual: &'a str,
    /// `false` when the container carries a `singleVisual.display` override.
    pub shown: bool,
}

#[derive(Clone, Debug)]
pub struct BookmarkFile {
    pub path: PathBuf,
    pub doc: Value,
}

impl BookmarkFile {
    pub fn name(&self) -> Option<&str> {
        self.doc.get("name").and_then(Value::as_str)
    }

    pub fn active_section(&self) -> Option<&str> {
        self.doc
            .pointer("/explorationState/activeSection")
            .and_then(Value::as_str)
    }

    pub fn sections(&self) -> Option<&Map<String, Value>> {
        self.doc
            .pointer("/explorationState/sections")
            .and_then(Value::as_object)
    }

    pub fn containers(&self) -> Vec<ContainerRef<'_>> {
        let Some(sections) = self.sections() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (section, body) in sections {
            let Some(containers) = body.get("visualContainers").and_then(Value::as_object) else {
                continue;
            };
            for (visual, container) in containers {
                out.push(ContainerRef {
                    section,
                    visual,
                    shown: container.pointer("/singleVisual/display").is_none(),
                });
            }
        }
        out
    }
}

#[derive(Clone, Debug)]
pub struct ReportTree {
    pub layout: ReportLayout,
    pub report: Option<Value>,
    pub extensions: Option<Value>,
    pub pages_meta: Option<Value>,
    /// Every folder under `pages/`, `pageOrder` entries first (in order), then the rest by name.
    pub pages: Vec<Page>,
    pub bookmarks_meta: Option<Value>,
    pub bookmarks: Vec<BookmarkFile>,
}

impl ReportTree {
    pub fn load(root: impl Into<PathBuf>) -> Self {
        Self::from_layout(ReportLayout::new(root))
    }

    pub fn from_layout(layout: ReportLayout) -> Self {
        let report = load_optional(&layout.report_json());
        let extensions = load_optional(&layout.report_extensions_json());
        let pages_meta = load_optional(&layout.pages_json());
        let page_order = string_list(pages_meta.as_ref(), "pageOrder");

        let mut pages: Vec<Page> = layout
            .page_dirs_on_disk()
            .into_iter()
            .map(|id| {
                let ordinal = page_order.iter().position(|p| *p == id);
                load_page(&layout, id, ordinal)
            })
            .collect();
        pages.sort_by(|a, b| {
            (a.ordinal.unwrap_or(usize::MAX), &a.id).cmp(&(b.ordinal.unwrap_or(usize::MAX), &b.id))
        });

        let bookmarks_meta = load_optional(&layout.bookmarks_json());
        let bookmarks: Vec<BookmarkFile> = layout
            .bookmark_files()
            .into_iter()
            .filter_map(|path| {
                let doc = pbir_fs::load_json_lenient(&path)?;
                Some(BookmarkFile { path, doc })
            })
            .collect();

        log::debug!(
            "loaded report {} ({} pages, {} bookmark files)",
            layout.root().display(),
            pages.len(),
            bookmarks.len(),
        );

        Self {
            layout,
            report,
            extensions,
            pages_meta,
            pages,
            bookmarks_meta,
            bookmarks,
        }
    }

    pub fn page_order(&self) -> Vec<String> {
        string_list(self.pages_meta.as_ref(), "pageOrder")
    }

    pub fn active_page(&self) -> Option<&str> {
        self.pages_meta
            .as_ref()?
            .get("activePageName")?
            .as_str()
    }

    pub fn page(&self, id: &str) -> Option<&Page> {
        self.pages.iter().find(|page| page.id == id)
    }

    pub fn visuals(&self) -> impl Iterator<Item = (&Page, &Visual)> {
        self.pages
            .iter()
            .flat_map(|page| page.visuals.iter().map(move |visual| (page, visual)))
    }

    /// Measures from `reportExtensions.json`, in document order.
    pub fn measures(&self) -> Vec<Measure> {
        let Some(entities) = self
            .extensions
            .as_ref()
            .and_then(|doc| doc.get("entities"))
            .and_then(Value::as_array)
        else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for entity in entities {
            let entity_name = entity.get("name").and_then(Value::as_str).unwrap_or_default();
            let Some(measures) = entity.get("measures").and_then(Value::as_array) else {
                continue;
            };
            for measure in measures {
                let Some(name) = measure.get("name").and_then(Value::as_str) else {
                    continue;
                };
                out.push(Measure {
                    name: name.to_string(),
                    entity: entity_name.to_string(),
                    expression: measure
                        .get("expression")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                });
            }
        }
        out
    }
}

fn load_page(layout: &ReportLayout, id: String, ordinal: Option<usize>) -> Page {
    let dir = layout.page_dir(&id);
    let doc = load_optional(&layout.page_json(&id));

    let visuals_dir = layout.visuals_dir(&id);
    let mut visuals = Vec::new();
    if let Ok(entries) = fs::read_dir(&visuals_dir) {
        let mut ids: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();
        ids.sort();
        for visual_id in ids {
            let path = visuals_dir.join(&visual_id).join(layout::VISUAL_JSON);
            if let Some(doc) = load_optional(&path) {
                visuals.push(Visual {
                    id: visual_id,
                    path,
                    doc,
                });
            }
        }
    }

    Page {
        id,
        dir,
        doc,
        ordinal,
        visuals,
    }
}

/// Missing files are expected and silent; unreadable or malformed ones are logged.
pub(crate) fn load_optional(path: &Path) -> Option<Value> {
    if !path.is_file() {
        return None;
    }
    pbir_fs::load_json_lenient(path)
}

fn string_list(doc: Option<&Value>, key: &str) -> Vec<String> {
    doc.and_then(|doc| doc.get(key))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
