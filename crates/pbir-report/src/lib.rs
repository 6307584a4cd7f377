//! Reference rewriting, usage graphs and sanitizers for Power BI PBIR report folders.
//!
//! A report folder is a tree of JSON documents (`definition/report.json`, `pages/*/page.json`,
//! `visuals/*/visual.json`, bookmarks, measures). This crate loads that tree leniently, renames
//! table and column references across it, works out which measures, bookmarks, visuals and
//! pages are still reachable, and prunes the rest. Every mutating entry point has a dry-run
//! mode that computes and reports the same decisions without writing.
//!
//! ```no_run
//! use pbir_report::{sanitize_report, LogSink};
//!
//! # fn main() -> Result<(), pbir_report::PbirError> {
//! let summary = sanitize_report(
//!     "Sales.Report",
//!     &["remove_unused_bookmarks", "remove_empty_pages"],
//!     true,
//!     &mut LogSink,
//! )?;
//! for report in &summary.reports {
//!     println!("{}: {:?}", report.action, report.details);
//! }
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod filters;
pub mod graph;
pub mod interactions;
pub mod json_rewrite;
pub mod layout;
pub mod mapping;
pub mod measures;
pub mod model;
pub mod progress;
pub mod rules;
pub mod sanitize;

pub use batch::{apply_mapping, batch_update_project, update_component, BatchReport};
pub use config::{PbirConfig, CONFIG_FILE_NAME};
pub use error::{PbirError, Result};
pub use filters::{
    sort_report_filters, update_report_filters, validate_filters, FilterOutcome, FilterSortOrder,
    FilterSpec, FilterValue,
};
pub use graph::UsageGraph;
pub use interactions::{
    disable_visual_interactions, disable_visual_interactions_with_progress, InteractionKind,
    InteractionUpdate, UpdateType,
};
pub use json_rewrite::{rewrite_entities, rewrite_properties};
pub use layout::ReportLayout;
pub use mapping::{
    build_rename_mapping, load_mapping_csv, load_mapping_reader, MappingError, MappingRow,
    RenameMapping,
};
pub use measures::{measure_dependencies_report, remove_measures, MeasureRemoval};
pub use model::ReportTree;
pub use pbir_dax::{rewrite_expression, ColumnMap, TableMap};
pub use progress::{
    ActionReport, CollectSink, LogSink, NoProgress, ProgressEvent, ProgressSink,
};
pub use rules::{
    default_rules, validate_report, RuleSpec, Severity, ValidateOptions, ValidationError,
    ValidationResult, Violation,
};
pub use sanitize::{sanitize_report, SanitizeAction, SanitizeSummary};
