//! Report-level measure tools: removal and dependency reports.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;

use serde_json::Value;

use crate::error::Result;
use crate::graph::UsageGraph;
use crate::model::ReportTree;
use crate::progress::{ActionReport, ActionRun, NoProgress, ProgressSink};

/// Which measures [`remove_measures`] considers, and whether usage protects them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeasureRemoval {
    /// Candidate measure names; `None` means every measure in the report.
    pub names: Option<Vec<String>>,
    /// Keep candidates that a visual uses, directly or through a dependent measure.
    pub check_visual_usage: bool,
}

impl Default for MeasureRemoval {
    fn default() -> Self {
        Self {
            names: None,
            check_visual_usage: true,
        }
    }
}

/// Remove measures from `reportExtensions.json`.
///
/// With usage checking, candidates that are neither used by a visual nor depended upon by a
/// used measure are dropped. Without it, only explicitly named candidates are dropped.
pub fn remove_measures(
    root: impl AsRef<Path>,
    options: &MeasureRemoval,
    dry_run: bool,
) -> Result<ActionReport> {
    run_removal("remove_measures", root.as_ref(), options, dry_run, &mut NoProgress)
}

/// Sanitize action: every measure, usage checked.
pub fn remove_unused_measures(
    root: &Path,
    dry_run: bool,
    sink: &mut dyn ProgressSink,
) -> Result<ActionReport> {
    run_removal(
        "remove_unused_measures",
        root,
        &MeasureRemoval::default(),
        dry_run,
        sink,
    )
}

fn run_removal(
    action: &'static str,
    root: &Path,
    options: &MeasureRemoval,
    dry_run: bool,
    sink: &mut dyn ProgressSink,
) -> Result<ActionReport> {
    let mut run = ActionRun::start(action, dry_run, sink);
    let tree = ReportTree::load(root);
    let Some(mut extensions) = tree.extensions.clone() else {
        run.note("no reportExtensions.json; nothing to remove");
        return Ok(run.finish(false));
    };

    let graph = UsageGraph::build(&tree);
    let candidates: BTreeSet<&str> = match &options.names {
        Some(names) => names.iter().map(String::as_str).collect(),
        None if options.check_visual_usage => graph.measures().map(|m| m.name.as_str()).collect(),
        None => BTreeSet::new(),
    };
    let doomed: BTreeSet<&str> = if options.check_visual_usage {
        let retained = graph.retained_measures();
        candidates
            .into_iter()
            .filter(|name| !retained.contains(name))
            .collect()
    } else {
        candidates
    };

    let mut removed = Vec::new();
    if let Some(entities) = extensions.get_mut("entities").and_then(Value::as_array_mut) {
        for entity in entities {
            let Some(measures) = entity.get_mut("measures").and_then(Value::as_array_mut) else {
                continue;
            };
            measures.retain(|measure| {
                let name = measure.get("name").and_then(Value::as_str);
                match name {
                    Some(name) if doomed.contains(name) => {
                        removed.push(name.to_string());
                        false
                    }
                    _ => true,
                }
            });
        }
    }

    if removed.is_empty() {
        run.note("no measures to remove");
        return Ok(run.finish(false));
    }

    let verb = run.verb("Removed", "Would remove");
    for name in &removed {
        run.step(format!("{verb} measure: {name}"));
    }
    if !run.dry_run() {
        pbir_fs::write_json(tree.layout.report_extensions_json(), &extensions)?;
    }
    Ok(run.finish(true))
}

/// Text report of dependency paths for `names` (or every measure).
///
/// Each measure gets a `Dependencies for <name>:` header followed by one line per path
/// through its dependents, joined with ` > `. With `include_visual_ids` every measure on a path
/// is suffixed with the visuals that use it.
pub fn measure_dependencies_report(
    root: impl AsRef<Path>,
    names: Option<&[String]>,
    include_visual_ids: bool,
) -> String {
    let tree = ReportTree::load(root.as_ref());
    let graph = UsageGraph::build(&tree);
    dependencies_report(&graph, names, include_visual_ids)
}

pub(crate) fn dependencies_report(
    graph: &UsageGraph,
    names: Option<&[String]>,
    include_visual_ids: bool,
) -> String {
    let targets: Vec<&str> = match names {
        Some(names) => names.iter().map(String::as_str).collect(),
        None => graph.measures().map(|m| m.name.as_str()).collect(),
    };

    let label = |name: &str| -> String {
        if !include_visual_ids {
            return name.to_string();
        }
        let visuals: Vec<&str> = graph
            .visuals_using(name)
            .into_iter()
            .map(|(_, visual)| visual.as_str())
            .collect();
        if visuals.is_empty() {
            name.to_string()
        } else {
            format!("{name} [Visual IDs: {}]", visuals.join(", "))
        }
    };

    let mut out = String::new();
    for name in targets {
        if graph.measure(name).is_none() {
            let _ = writeln!(out, "Measure not found: {name}");
            out.push('\n');
            continue;
        }
        let _ = writeln!(out, "Dependencies for {}:", label(name));
        let paths: Vec<Vec<String>> = graph
            .trace_paths(name)
            .into_iter()
            .filter(|path| path.len() > 1)
            .collect();
        if paths.is_empty() {
            out.push_str("  (no dependent measures)\n");
        }
        for path in paths {
            let line: Vec<String> = path.iter().map(|step| label(step)).collect();
            let _ = writeln!(out, "  {}", line.join(" > "));
        }
        out.push('\n');
    }
    out
}
