//! Bulk edits of the visual interaction matrix stored in each `page.json`.

use std::path::Path;
use std::str::FromStr;

use serde_json::{json, Value};

use crate::error::{PbirError, Result};
use crate::model::{Page, ReportTree};
use crate::progress::{ActionReport, ActionRun, NoProgress, ProgressSink};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpdateType {
    /// Replace the whole list with the computed pairs.
    Overwrite,
    /// Update pairs that exist, add the ones that don't.
    #[default]
    Upsert,
    /// Only add missing pairs.
    Insert,
}

impl FromStr for UpdateType {
    type Err = PbirError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "Overwrite" => Ok(UpdateType::Overwrite),
            "Upsert" => Ok(UpdateType::Upsert),
            "Insert" => Ok(UpdateType::Insert),
            other => Err(PbirError::UnknownValue {
                kind: "update type",
                value: other.to_string(),
                expected: "Overwrite, Upsert, Insert",
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InteractionKind {
    Default,
    Filter,
    Highlight,
    #[default]
    NoFilter,
}

impl InteractionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InteractionKind::Default => "Default",
            InteractionKind::Filter => "Filter",
            InteractionKind::Highlight => "Highlight",
            InteractionKind::NoFilter => "NoFilter",
        }
    }
}

impl FromStr for InteractionKind {
    type Err = PbirError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "Default" => Ok(InteractionKind::Default),
            "Filter" => Ok(InteractionKind::Filter),
            "Highlight" => Ok(InteractionKind::Highlight),
            "NoFilter" => Ok(InteractionKind::NoFilter),
            other => Err(PbirError::UnknownValue {
                kind: "interaction type",
                value: other.to_string(),
                expected: "Default, Filter, Highlight, NoFilter",
            }),
        }
    }
}

/// Which pairs to touch and how. `None` selectors mean "all".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InteractionUpdate {
    /// Page display names or folder names.
    pub pages: Option<Vec<String>>,
    pub source_ids: Option<Vec<String>>,
    pub source_types: Option<Vec<String>>,
    pub target_ids: Option<Vec<String>>,
    pub target_types: Option<Vec<String>>,
    pub update_type: UpdateType,
    pub interaction: InteractionKind,
}

/// Apply one update to an existing `visualInteractions` list.
///
/// Every ordered pair `(source, target)` with `source != target` is affected.
pub fn update_interactions(
    existing: &[Value],
    sources: &[&str],
    targets: &[&str],
    update_type: UpdateType,
    interaction: InteractionKind,
) -> Vec<Value> {
    let pairs: Vec<(&str, &str)> = sources
        .iter()
        .flat_map(|source| targets.iter().map(move |target| (*source, *target)))
        .filter(|(source, target)| source != target)
        .collect();
    let entry = |source: &str, target: &str| {
        json!({"source": source, "target": target, "type": interaction.as_str()})
    };

    if update_type == UpdateType::Overwrite {
        return pairs.iter().map(|&(s, t)| entry(s, t)).collect();
    }

    let mut result = existing.to_vec();
    for (source, target) in pairs {
        match result.iter().position(|item| is_pair(item, source, target)) {
            Some(index) => {
                if update_type == UpdateType::Upsert {
                    result[index]["type"] = Value::from(interaction.as_str());
                }
            }
            None => result.push(entry(source, target)),
        }
    }
    result
}

fn is_pair(item: &Value, source: &str, target: &str) -> bool {
    item.get("source").and_then(Value::as_str) == Some(source)
        && item.get("target").and_then(Value::as_str) == Some(target)
}

/// Visual names on `page` (group containers excluded), narrowed by ids and types.
fn select_visuals<'p>(
    page: &'p Page,
    ids: Option<&[String]>,
    types: Option<&[String]>,
) -> Vec<&'p str> {
    page.visuals
        .iter()
        .filter(|visual| !visual.is_group())
        .filter(|visual| ids.map_or(true, |ids| ids.iter().any(|id| id == visual.name())))
        .filter(|visual| {
            types.map_or(true, |types| {
                visual
                    .visual_type()
                    .is_some_and(|kind| types.iter().any(|t| t == kind))
            })
        })
        .map(|visual| visual.name())
        .collect()
}

/// Rewrite `visualInteractions` on the selected pages of the report at `root`.
pub fn disable_visual_interactions(
    root: impl AsRef<Path>,
    update: &InteractionUpdate,
    dry_run: bool,
) -> Result<ActionReport> {
    disable_visual_interactions_with_progress(root, update, dry_run, &mut NoProgress)
}

pub fn disable_visual_interactions_with_progress(
    root: impl AsRef<Path>,
    update: &InteractionUpdate,
    dry_run: bool,
    sink: &mut dyn ProgressSink,
) -> Result<ActionReport> {
    let mut run = ActionRun::start("disable_visual_interactions", dry_run, sink);
    let tree = ReportTree::load(root.as_ref());
    let verb = run.verb("Updated", "Would update");

    let mut changed = false;
    for page in &tree.pages {
        if let Some(wanted) = &update.pages {
            let matches = wanted
                .iter()
                .any(|name| name == &page.id || Some(name.as_str()) == page.display_name());
            if !matches {
                continue;
            }
        }
        let Some(doc) = &page.doc else {
            log::warn!("page {} has no readable page.json; skipped", page.id);
            continue;
        };

        let sources = select_visuals(
            page,
            update.source_ids.as_deref(),
            update.source_types.as_deref(),
        );
        let targets = select_visuals(
            page,
            update.target_ids.as_deref(),
            update.target_types.as_deref(),
        );
        let existing: Vec<Value> = doc
            .get("visualInteractions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let updated = update_interactions(
            &existing,
            &sources,
            &targets,
            update.update_type,
            update.interaction,
        );
        if updated == existing {
            continue;
        }

        run.step(format!(
            "{verb} visual interactions on page {} ({} entries)",
            page.label(),
            updated.len()
        ));
        let mut doc = doc.clone();
        if let Some(map) = doc.as_object_mut() {
            map.insert("visualInteractions".to_string(), Value::Array(updated));
        }
        if !run.dry_run() {
            pbir_fs::write_json(tree.layout.page_json(&page.id), &doc)?;
        }
        changed = true;
    }
    Ok(run.finish(changed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn overwrite_replaces_everything() {
        let existing = vec![json!({"source": "x", "target": "y", "type": "Filter"})];
        let result = update_interactions(
            &existing,
            &["s1"],
            &["t1"],
            UpdateType::Overwrite,
            InteractionKind::NoFilter,
        );
        assert_eq!(
            result,
            vec![json!({"source": "s1", "target": "t1", "type": "NoFilter"})]
        );
    }

    #[test]
    fn upsert_updates_and_adds() {
        let existing = vec![json!({"source": "s1", "target": "t1", "type": "Filter"})];
        let result = update_interactions(
            &existing,
            &["s1"],
            &["t1", "t2"],
            UpdateType::Upsert,
            InteractionKind::NoFilter,
        );
        assert_eq!(
            result,
            vec![
                json!({"source": "s1", "target": "t1", "type": "NoFilter"}),
                json!({"source": "s1", "target": "t2", "type": "NoFilter"}),
            ]
        );
    }

    #[test]
    fn insert_leaves_existing_pairs_alone() {
        let existing = vec![json!({"source": "s1", "target": "t1", "type": "Filter"})];
        let result = update_interactions(
            &existing,
            &["s1"],
            &["t1", "t2"],
            UpdateType::Insert,
            InteractionKind::NoFilter,
        );
        assert_eq!(result[0]["type"], json!("Filter"));
        assert_eq!(result[1]["target"], json!("t2"));
    }

    #[test]
    fn self_pairs_are_skipped() {
        let result = update_interactions(
            &[],
            &["v1"],
            &["v1", "v2"],
            UpdateType::Upsert,
            InteractionKind::NoFilter,
        );
        assert_eq!(result.len(), 1);
    }
}
