use std::path::Path;

use serde_json::Value;

use crate::error::Result;
use crate::layout::dir_is_empty;
use crate::model::{PageBinding, ReportTree, HIDDEN_IN_VIEW_MODE};
use crate::progress::{ActionReport, ActionRun, ProgressSink};

use super::{persist_or_skip, remove_dir_or_skip};

/// Hide tooltip and drillthrough pages in view mode.
pub fn hide_tooltip_drillthrough_pages(
    root: &Path,
    dry_run: bool,
    sink: &mut dyn ProgressSink,
) -> Result<ActionReport> {
    let mut run = ActionRun::start("hide_tooltip_drillthrough_pages", dry_run, sink);
    let tree = ReportTree::load(root);
    let verb = run.verb("Hid", "Would hide");

    let mut changed = false;
    for page in &tree.pages {
        let Some(doc) = &page.doc else {
            continue;
        };
        let kind = match page.binding() {
            Some(PageBinding::Tooltip) => "tooltip",
            Some(PageBinding::Drillthrough) => "drillthrough",
            _ => continue,
        };
        if page.is_hidden() {
            continue;
        }

        let mut doc = doc.clone();
        doc["visibility"] = Value::from(HIDDEN_IN_VIEW_MODE);
        run.step(format!("{verb} {kind} page: {}", page.label()));
        if persist_or_skip(&mut run, &tree.layout.page_json(&page.id), &doc) {
            changed = true;
        }
    }

    if !changed {
        run.note("No tooltip or drillthrough pages to hide");
    }
    Ok(run.finish(changed))
}

/// Make the first page in `pageOrder` the active page.
pub fn set_first_page_as_active(
    root: &Path,
    dry_run: bool,
    sink: &mut dyn ProgressSink,
) -> Result<ActionReport> {
    let mut run = ActionRun::start("set_first_page_as_active", dry_run, sink);
    let tree = ReportTree::load(root);
    let Some(mut meta) = tree.pages_meta.clone() else {
        run.note("No pages.json found");
        return Ok(run.finish(false));
    };
    let order = tree.page_order();
    let Some(first) = order.first() else {
        run.note("pageOrder is empty");
        return Ok(run.finish(false));
    };
    if tree.active_page() == Some(first.as_str()) {
        return Ok(run.finish(false));
    }

    let label = tree.page(first).map(|page| page.label()).unwrap_or(first);
    let verb = run.verb("Set", "Would set");
    run.step(format!("{verb} active page to {label}"));
    meta["activePageName"] = Value::from(first.as_str());
    if !run.dry_run() {
        pbir_fs::write_json(tree.layout.pages_json(), &meta)?;
    }
    Ok(run.finish(true))
}

/// Drop pages without visuals from `pageOrder` and delete their folders, along with any page
/// folder that `pageOrder` does not list at all.
///
/// When every listed page is empty the first one stays as a placeholder.
pub fn remove_empty_pages(
    root: &Path,
    dry_run: bool,
    sink: &mut dyn ProgressSink,
) -> Result<ActionReport> {
    let mut run = ActionRun::start("remove_empty_pages", dry_run, sink);
    let tree = ReportTree::load(root);
    let Some(mut meta) = tree.pages_meta.clone() else {
        run.note("No pages.json found");
        return Ok(run.finish(false));
    };
    let order = tree.page_order();
    if order.is_empty() {
        run.note("pageOrder is empty");
        return Ok(run.finish(false));
    }

    let non_empty: Vec<String> = order
        .iter()
        .filter(|page| !dir_is_empty(&tree.layout.visuals_dir(page)))
        .cloned()
        .collect();
    let all_empty = non_empty.is_empty();
    let kept = if all_empty {
        vec![order[0].clone()]
    } else {
        non_empty
    };
    let active = match tree.active_page() {
        Some(active) if kept.iter().any(|page| page == active) => active.to_string(),
        _ => kept[0].clone(),
    };

    let verb = run.verb("Removed", "Would remove");
    let mut changed = false;
    if kept != order || tree.active_page() != Some(active.as_str()) {
        if all_empty && order.len() > 1 {
            run.step("All pages are empty; keeping the first page as a placeholder");
        }
        for page in order.iter().filter(|page| !kept.contains(page)) {
            run.step(format!("{verb} empty page: {page}"));
        }
        if tree.active_page() != Some(active.as_str()) {
            let set = run.verb("Set", "Would set");
            run.step(format!("{set} active page to {active}"));
        }
        meta["pageOrder"] = Value::from(kept.clone());
        meta["activePageName"] = Value::from(active);
        if !run.dry_run() {
            pbir_fs::write_json(tree.layout.pages_json(), &meta)?;
        }
        changed = true;
    }

    for page in tree.layout.page_dirs_on_disk() {
        if kept.contains(&page) {
            continue;
        }
        if !order.contains(&page) {
            run.step(format!("{verb} rogue page folder: {page}"));
        }
        changed |= remove_dir_or_skip(&mut run, &tree.layout.page_dir(&page));
    }

    Ok(run.finish(changed))
}
