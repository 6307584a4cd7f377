//! Sanitize actions and the driver that runs a list of them.
//!
//! Every action scans the on-disk tree, decides what to change, and then either reports the
//! decision (dry run) or applies and persists it. Running an action twice in a row is a no-op
//! the second time.

mod bookmarks;
mod pages;
mod visuals;

use std::fmt;
use std::io;
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::layout::ReportLayout;
use crate::measures::remove_unused_measures;
use crate::progress::{ActionReport, ActionRun, ProgressEvent, ProgressSink};

pub use bookmarks::{cleanup_invalid_bookmarks, remove_unused_bookmarks};
pub use pages::{hide_tooltip_drillthrough_pages, remove_empty_pages, set_first_page_as_active};
pub use visuals::{
    disable_show_items_with_no_data, remove_hidden_visuals_never_shown,
    remove_unused_custom_visuals,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SanitizeAction {
    RemoveUnusedMeasures,
    RemoveUnusedBookmarks,
    RemoveUnusedCustomVisuals,
    DisableShowItemsWithNoData,
    HideTooltipDrillthroughPages,
    SetFirstPageAsActive,
    RemoveEmptyPages,
    RemoveHiddenVisualsNeverShown,
    CleanupInvalidBookmarks,
}

impl SanitizeAction {
    /// Every built-in action, in the order `sanitize` runs them by default.
    pub const ALL: [SanitizeAction; 9] = [
        SanitizeAction::RemoveUnusedMeasures,
        SanitizeAction::RemoveUnusedBookmarks,
        SanitizeAction::RemoveUnusedCustomVisuals,
        SanitizeAction::DisableShowItemsWithNoData,
        SanitizeAction::HideTooltipDrillthroughPages,
        SanitizeAction::SetFirstPageAsActive,
        SanitizeAction::RemoveEmptyPages,
        SanitizeAction::RemoveHiddenVisualsNeverShown,
        SanitizeAction::CleanupInvalidBookmarks,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SanitizeAction::RemoveUnusedMeasures => "remove_unused_measures",
            SanitizeAction::RemoveUnusedBookmarks => "remove_unused_bookmarks",
            SanitizeAction::RemoveUnusedCustomVisuals => "remove_unused_custom_visuals",
            SanitizeAction::DisableShowItemsWithNoData => "disable_show_items_with_no_data",
            SanitizeAction::HideTooltipDrillthroughPages => "hide_tooltip_drillthrough_pages",
            SanitizeAction::SetFirstPageAsActive => "set_first_page_as_active",
            SanitizeAction::RemoveEmptyPages => "remove_empty_pages",
            SanitizeAction::RemoveHiddenVisualsNeverShown => "remove_hidden_visuals_never_shown",
            SanitizeAction::CleanupInvalidBookmarks => "cleanup_invalid_bookmarks",
        }
    }

    /// Human-readable title, used as the default rule name in validation.
    pub fn title(self) -> &'static str {
        match self {
            SanitizeAction::RemoveUnusedMeasures => "Remove unused measures",
            SanitizeAction::RemoveUnusedBookmarks => "Remove unused bookmarks",
            SanitizeAction::RemoveUnusedCustomVisuals => "Remove unused custom visuals",
            SanitizeAction::DisableShowItemsWithNoData => "Disable 'Show items with no data'",
            SanitizeAction::HideTooltipDrillthroughPages => "Hide tooltip and drillthrough pages",
            SanitizeAction::SetFirstPageAsActive => "Set first page as active",
            SanitizeAction::RemoveEmptyPages => "Remove empty pages",
            SanitizeAction::RemoveHiddenVisualsNeverShown => {
                "Remove hidden visuals never shown by bookmarks"
            }
            SanitizeAction::CleanupInvalidBookmarks => "Clean up invalid bookmarks",
        }
    }

    pub fn run(
        self,
        root: &Path,
        dry_run: bool,
        sink: &mut dyn ProgressSink,
    ) -> Result<ActionReport> {
        match self {
            SanitizeAction::RemoveUnusedMeasures => remove_unused_measures(root, dry_run, sink),
            SanitizeAction::RemoveUnusedBookmarks => remove_unused_bookmarks(root, dry_run, sink),
            SanitizeAction::RemoveUnusedCustomVisuals => {
                remove_unused_custom_visuals(root, dry_run, sink)
            }
            SanitizeAction::DisableShowItemsWithNoData => {
                disable_show_items_with_no_data(root, dry_run, sink)
            }
            SanitizeAction::HideTooltipDrillthroughPages => {
                hide_tooltip_drillthrough_pages(root, dry_run, sink)
            }
            SanitizeAction::SetFirstPageAsActive => set_first_page_as_active(root, dry_run, sink),
            SanitizeAction::RemoveEmptyPages => remove_empty_pages(root, dry_run, sink),
            SanitizeAction::RemoveHiddenVisualsNeverShown => {
                remove_hidden_visuals_never_shown(root, dry_run, sink)
            }
            SanitizeAction::CleanupInvalidBookmarks => {
                cleanup_invalid_bookmarks(root, dry_run, sink)
            }
        }
    }
}

impl fmt::Display for SanitizeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown sanitize action `{0}`")]
pub struct UnknownAction(pub String);

impl FromStr for SanitizeAction {
    type Err = UnknownAction;

    fn from_str(name: &str) -> std::result::Result<Self, Self::Err> {
        SanitizeAction::ALL
            .into_iter()
            .find(|action| action.as_str() == name)
            .ok_or_else(|| UnknownAction(name.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActionFailure {
    pub action: String,
    pub error: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SanitizeSummary {
    pub dry_run: bool,
    pub reports: Vec<ActionReport>,
    /// Names that are not built-in actions.
    pub skipped: Vec<String>,
    pub failed: Vec<ActionFailure>,
}

impl SanitizeSummary {
    pub fn changed(&self) -> bool {
        self.reports.iter().any(|report| report.changed)
    }

    pub fn report(&self, action: SanitizeAction) -> Option<&ActionReport> {
        self.reports
            .iter()
            .find(|report| report.action == action.as_str())
    }
}

/// Run `actions` (by name) against the report at `root`, in order.
///
/// Unknown names are reported as skipped and a failing action is recorded without stopping the
/// remaining ones. Only a `root` that is not a report folder is an error.
pub fn sanitize_report<S: AsRef<str>>(
    root: impl AsRef<Path>,
    actions: &[S],
    dry_run: bool,
    sink: &mut dyn ProgressSink,
) -> Result<SanitizeSummary> {
    let layout = ReportLayout::open(root.as_ref())?;
    let mut summary = SanitizeSummary {
        dry_run,
        ..SanitizeSummary::default()
    };

    for name in actions {
        let name = name.as_ref();
        let action = match name.parse::<SanitizeAction>() {
            Ok(action) => action,
            Err(err) => {
                log::warn!("{err}; skipped");
                sink.emit(ProgressEvent::Skipped {
                    action: name.to_string(),
                    reason: "unknown action".to_string(),
                });
                summary.skipped.push(name.to_string());
                continue;
            }
        };

        match action.run(layout.root(), dry_run, sink) {
            Ok(report) => summary.reports.push(report),
            Err(err) => {
                log::error!("{action} failed: {err}");
                summary.failed.push(ActionFailure {
                    action: action.as_str().to_string(),
                    error: err.to_string(),
                });
            }
        }
    }

    log::info!(
        "sanitized {}: {} action(s) run, {} skipped, {} failed",
        layout.root().display(),
        summary.reports.len(),
        summary.skipped.len(),
        summary.failed.len()
    );
    Ok(summary)
}

/// Write `doc` unless dry-running. A failed write is logged and reported as a detail, and the
/// file counts as unchanged.
pub(crate) fn persist_or_skip(run: &mut ActionRun<'_>, path: &Path, doc: &Value) -> bool {
    if run.dry_run() {
        return true;
    }
    match pbir_fs::write_json(path, doc) {
        Ok(()) => true,
        Err(err) => {
            log::warn!("{err}");
            run.step(format!("Skipped {}: {err}", path.display()));
            false
        }
    }
}

/// Delete `dir` unless dry-running. A failed removal is logged and reported as a detail, and
/// the folder counts as kept.
pub(crate) fn remove_dir_or_skip(run: &mut ActionRun<'_>, dir: &Path) -> bool {
    if run.dry_run() {
        return true;
    }
    skip_failed_removal(run, dir, pbir_fs::remove_dir_if_exists(dir))
}

fn skip_failed_removal(run: &mut ActionRun<'_>, dir: &Path, removal: io::Result<bool>) -> bool {
    match removal {
        Ok(_) => true,
        Err(err) => {
            log::warn!("unable to remove {}: {err}", dir.display());
            run.step(format!("Skipped {}: {err}", dir.display()));
            false
        }
    }
}

/// File name for messages.
pub(crate) fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::CollectSink;

    #[test]
    fn failed_removal_is_recorded_and_not_fatal() {
        let mut sink = CollectSink::new();
        let mut run = ActionRun::start("demo", false, &mut sink);
        let dir = Path::new("pages/Page1/visuals/v1");

        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert!(!skip_failed_removal(&mut run, dir, Err(denied)));
        assert!(skip_failed_removal(&mut run, dir, Ok(false)));

        let report = run.finish(false);
        assert_eq!(report.details.len(), 1);
        assert!(report.details[0].starts_with("Skipped pages/Page1/visuals/v1"));
    }

    #[test]
    fn action_names_round_trip() {
        for action in SanitizeAction::ALL {
            assert_eq!(action.as_str().parse::<SanitizeAction>(), Ok(action));
        }
        assert_eq!(
            "tidy_everything".parse::<SanitizeAction>(),
            Err(UnknownAction("tidy_everything".to_string()))
        );
    }
}
