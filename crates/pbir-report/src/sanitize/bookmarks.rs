use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde_json::Value;

use crate::error::{PbirError, Result};
use crate::model::ReportTree;
use crate::progress::{ActionReport, ActionRun, ProgressSink};

use super::{file_label, persist_or_skip};

const NAVIGATOR: &str = "bookmarkNavigator";

/// Which bookmarks the report's visuals can reach.
#[derive(Debug, PartialEq, Eq)]
enum BookmarkUsage {
    /// A navigator without a group filter (no `bookmarks` objects, an empty list, or a group
    /// with an empty or missing literal) exposes every bookmark.
    All,
    Named(BTreeSet<String>),
}

impl BookmarkUsage {
    fn scan(tree: &ReportTree) -> Self {
        let mut named = BTreeSet::new();
        for (_, visual) in tree.visuals() {
            if visual.visual_type() == Some(NAVIGATOR) {
                let groups = visual
                    .doc
                    .pointer("/visual/objects/bookmarks")
                    .and_then(Value::as_array);
                let Some(groups) = groups.filter(|groups| !groups.is_empty()) else {
                    return BookmarkUsage::All;
                };
                for group in groups {
                    let literal = group
                        .pointer("/properties/bookmarkGroup/expr/Literal/Value")
                        .and_then(Value::as_str);
                    match literal.map(unquote) {
                        None | Some("") => return BookmarkUsage::All,
                        Some(name) => {
                            named.insert(name.replace("''", "'"));
                        }
                    }
                }
            }

            let links = visual
                .doc
                .pointer("/visual/visualContainerObjects/visualLink")
                .and_then(Value::as_array);
            for link in links.into_iter().flatten() {
                if let Some(name) = link
                    .pointer("/properties/bookmark/expr/Literal/Value")
                    .and_then(Value::as_str)
                {
                    named.insert(unquote(name).replace("''", "'"));
                }
            }
        }
        BookmarkUsage::Named(named)
    }

    fn is_used(&self, name: &str) -> bool {
        match self {
            BookmarkUsage::All => true,
            BookmarkUsage::Named(names) => names.contains(name),
        }
    }
}

/// Strip one pair of surrounding single quotes from a DAX string literal.
fn unquote(literal: &str) -> &str {
    literal
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
        .unwrap_or(literal)
}

fn item_name(item: &Value) -> Option<&str> {
    item.get("name").and_then(Value::as_str)
}

fn item_children(item: &Value) -> Option<Vec<&str>> {
    item.get("children")
        .and_then(Value::as_array)
        .map(|children| children.iter().filter_map(Value::as_str).collect())
}

/// Drop bookmarks that no navigator or visual link can reach.
///
/// A used group keeps all of its children; an unused group survives with only its used
/// children. Bookmark files outside the retained set are deleted, and the whole bookmarks
/// folder goes when nothing is retained.
pub fn remove_unused_bookmarks(
    root: &Path,
    dry_run: bool,
    sink: &mut dyn ProgressSink,
) -> Result<ActionReport> {
    let mut run = ActionRun::start("remove_unused_bookmarks", dry_run, sink);
    let tree = ReportTree::load(root);
    let Some(mut meta) = tree.bookmarks_meta.clone() else {
        run.note("No bookmarks found");
        return Ok(run.finish(false));
    };
    let Some(items) = meta.get("items").and_then(Value::as_array).cloned() else {
        run.note("No bookmarks found");
        return Ok(run.finish(false));
    };

    let usage = BookmarkUsage::scan(&tree);
    let verb = run.verb("Removed", "Would remove");
    let mut retained: BTreeSet<String> = BTreeSet::new();
    let mut kept_items = Vec::new();
    for mut item in items.iter().cloned() {
        let Some(name) = item_name(&item).map(str::to_string) else {
            kept_items.push(item);
            continue;
        };
        let children: Vec<String> = item_children(&item)
            .unwrap_or_default()
            .into_iter()
            .map(str::to_string)
            .collect();

        if usage.is_used(&name) {
            retained.insert(name);
            retained.extend(children);
            kept_items.push(item);
            continue;
        }

        let used_children: Vec<String> = children
            .iter()
            .filter(|child| usage.is_used(child))
            .cloned()
            .collect();
        if used_children.is_empty() {
            run.step(format!("{verb} unused bookmark: {name}"));
            continue;
        }
        for child in children.iter().filter(|child| !usage.is_used(child)) {
            run.step(format!("{verb} unused bookmark {child} from group {name}"));
        }
        item["children"] = Value::from(used_children.clone());
        retained.insert(name);
        retained.extend(used_children);
        kept_items.push(item);
    }

    let items_changed = kept_items != items;
    let bookmarks_dir = tree.layout.bookmarks_dir();

    if kept_items.is_empty() {
        run.step(format!("{verb} bookmarks folder (no bookmarks in use)"));
        if !run.dry_run() {
            pbir_fs::remove_dir_if_exists(&bookmarks_dir).map_err(PbirError::io(&bookmarks_dir))?;
        }
        return Ok(run.finish(true));
    }

    let mut files_removed = false;
    for bookmark in &tree.bookmarks {
        let Some(name) = bookmark.name() else {
            continue;
        };
        if retained.contains(name) {
            continue;
        }
        run.step(format!("{verb} bookmark file: {}", file_label(&bookmark.path)));
        files_removed = true;
        if !run.dry_run() {
            if let Err(err) = pbir_fs::remove_file_if_exists(&bookmark.path) {
                log::warn!("failed to remove {}: {err}", bookmark.path.display());
            }
        }
    }

    if items_changed && !run.dry_run() {
        meta["items"] = Value::Array(kept_items);
        pbir_fs::write_json(tree.layout.bookmarks_json(), &meta)?;
    }

    Ok(run.finish(items_changed || files_removed))
}

/// Drop bookmarks that point at missing pages and prune references to missing visuals.
pub fn cleanup_invalid_bookmarks(
    root: &Path,
    dry_run: bool,
    sink: &mut dyn ProgressSink,
) -> Result<ActionReport> {
    let mut run = ActionRun::start("cleanup_invalid_bookmarks", dry_run, sink);
    let tree = ReportTree::load(root);
    if !tree.layout.bookmarks_dir().is_dir() {
        run.note("No bookmarks directory");
        return Ok(run.finish(false));
    }

    // Page folder -> names (and folder ids) of its visuals.
    let pages: BTreeMap<&str, BTreeSet<&str>> = tree
        .pages
        .iter()
        .map(|page| {
            let visuals = page
                .visuals
                .iter()
                .flat_map(|visual| [visual.name(), visual.id.as_str()])
                .collect();
            (page.id.as_str(), visuals)
        })
        .collect();

    let verb = run.verb("Removed", "Would remove");
    let mut changed = false;
    let mut dropped: BTreeSet<String> = BTreeSet::new();

    for bookmark in &tree.bookmarks {
        let label = bookmark
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| file_label(&bookmark.path));

        if let Some(section) = bookmark.active_section() {
            if !pages.contains_key(section) {
                run.step(format!(
                    "{verb} bookmark {label}: active page {section} does not exist"
                ));
                changed = true;
                if let Some(name) = bookmark.name() {
                    dropped.insert(name.to_string());
                }
                if !run.dry_run() {
                    if let Err(err) = pbir_fs::remove_file_if_exists(&bookmark.path) {
                        log::warn!("failed to remove {}: {err}", bookmark.path.display());
                    }
                }
                continue;
            }
        }

        let mut doc = bookmark.doc.clone();
        let mut pruned = Vec::new();
        if let Some(sections) = doc
            .pointer_mut("/explorationState/sections")
            .and_then(Value::as_object_mut)
        {
            sections.retain(|section, _| {
                let keep = pages.contains_key(section.as_str());
                if !keep {
                    pruned.push(format!("section {section}"));
                }
                keep
            });
            for (section, body) in sections.iter_mut() {
                let Some(visuals) = pages.get(section.as_str()) else {
                    continue;
                };
                let Some(containers) = body
                    .get_mut("visualContainers")
                    .and_then(Value::as_object_mut)
                else {
                    continue;
                };
                containers.retain(|visual, _| {
                    let keep = visuals.contains(visual.as_str());
                    if !keep {
                        pruned.push(format!("visual {visual}"));
                    }
                    keep
                });
            }
        }

        if pruned.is_empty() {
            continue;
        }
        for what in &pruned {
            run.step(format!("{verb} {what} from bookmark {label}"));
        }
        if persist_or_skip(&mut run, &bookmark.path, &doc) {
            changed = true;
        }
    }

    if !dropped.is_empty() {
        if let Some(mut meta) = tree.bookmarks_meta.clone() {
            if prune_items(&mut meta, &dropped) {
                run.step(format!("Updated bookmarks.json ({} dropped)", dropped.len()));
                if !run.dry_run() {
                    pbir_fs::write_json(tree.layout.bookmarks_json(), &meta)?;
                }
            }
        }
    }

    Ok(run.finish(changed))
}

/// Remove `dropped` names from `items` and from group children. Groups that lose every child
/// are dropped too.
fn prune_items(meta: &mut Value, dropped: &BTreeSet<String>) -> bool {
    let Some(items) = meta.get_mut("items").and_then(Value::as_array_mut) else {
        return false;
    };
    let before = items.clone();
    items.retain_mut(|item| {
        if item_name(item).is_some_and(|name| dropped.contains(name)) {
            return false;
        }
        let Some(children) = item.get_mut("children").and_then(Value::as_array_mut) else {
            return true;
        };
        let had_children = !children.is_empty();
        children.retain(|child| child.as_str().map_or(true, |name| !dropped.contains(name)));
        !(had_children && children.is_empty())
    });
    *items != before
}
