use std::collections::BTreeSet;
use std::path::Path;

use serde_json::Value;

use crate::error::Result;
use crate::graph::UsageGraph;
use crate::model::ReportTree;
use crate::progress::{ActionReport, ActionRun, ProgressSink};

use super::{file_label, persist_or_skip, remove_dir_or_skip};

/// Drop `publicCustomVisuals` entries that no visual instantiates.
pub fn remove_unused_custom_visuals(
    root: &Path,
    dry_run: bool,
    sink: &mut dyn ProgressSink,
) -> Result<ActionReport> {
    let mut run = ActionRun::start("remove_unused_custom_visuals", dry_run, sink);
    let tree = ReportTree::load(root);
    let Some(mut report) = tree.report.clone() else {
        run.note("No report.json found");
        return Ok(run.finish(false));
    };
    let declared: Vec<String> = report
        .get("publicCustomVisuals")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if declared.is_empty() {
        run.note("No custom visuals found");
        return Ok(run.finish(false));
    }

    let used: BTreeSet<&str> = tree
        .visuals()
        .filter_map(|(_, visual)| visual.visual_type())
        .collect();
    let (kept, unused): (Vec<String>, Vec<String>) = declared
        .into_iter()
        .partition(|name| used.contains(name.as_str()));
    if unused.is_empty() {
        return Ok(run.finish(false));
    }

    let verb = run.verb("Removed", "Would remove");
    for name in &unused {
        run.step(format!("{verb} unused custom visual: {name}"));
    }
    if let Some(map) = report.as_object_mut() {
        if kept.is_empty() {
            map.remove("publicCustomVisuals");
        } else {
            map.insert("publicCustomVisuals".to_string(), Value::from(kept));
        }
    }
    if !run.dry_run() {
        pbir_fs::write_json(tree.layout.report_json(), &report)?;
    }
    Ok(run.finish(true))
}

/// Remove every `showAll` key, at any depth, from every visual.
pub fn disable_show_items_with_no_data(
    root: &Path,
    dry_run: bool,
    sink: &mut dyn ProgressSink,
) -> Result<ActionReport> {
    let mut run = ActionRun::start("disable_show_items_with_no_data", dry_run, sink);
    let tree = ReportTree::load(root);
    let verb = run.verb("Disabled", "Would disable");

    let mut changed = false;
    for (page, visual) in tree.visuals() {
        let mut doc = visual.doc.clone();
        if !strip_show_all(&mut doc) {
            continue;
        }
        run.step(format!(
            "{verb} 'Show items with no data' on visual {} (page {})",
            visual.name(),
            page.label()
        ));
        if persist_or_skip(&mut run, &visual.path, &doc) {
            changed = true;
        }
    }
    Ok(run.finish(changed))
}

fn strip_show_all(value: &mut Value) -> bool {
    match value {
        Value::Object(map) => {
            let mut changed = map.remove("showAll").is_some();
            for child in map.values_mut() {
                changed |= strip_show_all(child);
            }
            changed
        }
        Value::Array(items) => items
            .iter_mut()
            .fold(false, |changed, item| strip_show_all(item) | changed),
        _ => false,
    }
}

/// Delete hidden visuals that no bookmark ever shows, then prune interactions and bookmark
/// containers that name them.
pub fn remove_hidden_visuals_never_shown(
    root: &Path,
    dry_run: bool,
    sink: &mut dyn ProgressSink,
) -> Result<ActionReport> {
    let mut run = ActionRun::start("remove_hidden_visuals_never_shown", dry_run, sink);
    let tree = ReportTree::load(root);
    let graph = UsageGraph::build(&tree);
    let shown = graph.shown_by_bookmarks();

    let doomed: Vec<_> = tree
        .visuals()
        .filter(|(_, visual)| visual.is_hidden() && !shown.contains(visual.name()))
        .collect();
    if doomed.is_empty() {
        run.note("No hidden visuals to remove");
        return Ok(run.finish(false));
    }

    let verb = run.verb("Removed", "Would remove");
    let mut names: BTreeSet<&str> = BTreeSet::new();
    for (page, visual) in &doomed {
        if !remove_dir_or_skip(&mut run, visual.dir()) {
            continue;
        }
        run.step(format!(
            "{verb} hidden visual never shown: {} (page {})",
            visual.name(),
            page.label()
        ));
        names.insert(visual.name());
    }
    if names.is_empty() {
        return Ok(run.finish(false));
    }

    let touched_pages: BTreeSet<&str> = names
        .iter()
        .flat_map(|name| graph.interactions_involving(*name))
        .map(|(page, _, _)| page.as_str())
        .collect();
    for page in tree.pages.iter().filter(|page| touched_pages.contains(page.id.as_str())) {
        let Some(mut doc) = page.doc.clone() else {
            continue;
        };
        let Some(interactions) = doc
            .get_mut("visualInteractions")
            .and_then(Value::as_array_mut)
        else {
            continue;
        };
        let before = interactions.len();
        interactions.retain(|entry| {
            let names_doomed = |key: &str| {
                entry
                    .get(key)
                    .and_then(Value::as_str)
                    .is_some_and(|name| names.contains(name))
            };
            !(names_doomed("source") || names_doomed("target"))
        });
        let removed = before - interactions.len();
        run.step(format!(
            "{verb} {removed} interaction(s) from page {}",
            page.label()
        ));
        persist_or_skip(&mut run, &tree.layout.page_json(&page.id), &doc);
    }

    for bookmark in &tree.bookmarks {
        if !bookmark
            .containers()
            .iter()
            .any(|container| names.contains(container.visual))
        {
            continue;
        }
        let mut doc = bookmark.doc.clone();
        if let Some(sections) = doc
            .pointer_mut("/explorationState/sections")
            .and_then(Value::as_object_mut)
        {
            for body in sections.values_mut() {
                if let Some(containers) = body
                    .get_mut("visualContainers")
                    .and_then(Value::as_object_mut)
                {
                    containers.retain(|visual, _| !names.contains(visual.as_str()));
                }
            }
        }
        run.step(format!(
            "{verb} hidden visuals from bookmark {}",
            file_label(&bookmark.path)
        ));
        persist_or_skip(&mut run, &bookmark.path, &doc);
    }

    Ok(run.finish(true))
}
