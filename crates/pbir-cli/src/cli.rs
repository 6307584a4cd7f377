use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use pbir_report::{
    batch_update_project, disable_visual_interactions_with_progress, measure_dependencies_report,
    remove_measures, sanitize_report, sort_report_filters, update_report_filters,
    validate_report, ActionReport, BatchReport, FilterOutcome, FilterSortOrder, FilterSpec,
    InteractionKind, InteractionUpdate, LogSink, MeasureRemoval, PbirConfig, SanitizeSummary,
    Severity, UpdateType, ValidateOptions, ValidationError, ValidationResult,
};

use crate::logger;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Utilities for Power BI PBIR report folders.
#[derive(Parser)]
#[command(name = "pbir", version)]
pub struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output format for the command's report.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Compute and report every change without writing anything.
    #[arg(long, global = true)]
    dry_run: bool,

    /// Configuration file (default: `pbir-utils.json` next to or above the report).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Debug logging (overrides `--quiet`).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Rename tables and columns across every JSON file under a folder, driven by a CSV with
    /// `old_tbl,old_col,new_tbl,new_col` columns.
    BatchUpdate {
        /// Folder to walk (a report, a semantic model or a whole project).
        dir: PathBuf,
        /// Mapping CSV.
        csv: PathBuf,
    },

    /// Run sanitize actions against a report.
    Sanitize {
        /// `<Name>.Report` folder.
        report: PathBuf,
        /// Actions to run, in order (comma separated or repeated). Defaults to the configured
        /// list, or every built-in action.
        #[arg(long, value_delimiter = ',')]
        actions: Vec<String>,
        /// Actions to leave out.
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,
    },

    /// Remove measures from `reportExtensions.json`.
    RemoveMeasures {
        report: PathBuf,
        /// Measures to consider (repeatable). Defaults to every measure.
        #[arg(long = "measure")]
        measures: Vec<String>,
        /// Remove the named measures even when a visual still uses them.
        #[arg(long)]
        no_usage_check: bool,
    },

    /// Print the dependency paths of report measures.
    MeasureDependencies {
        report: PathBuf,
        /// Measures to trace (repeatable). Defaults to every measure.
        #[arg(long = "measure")]
        measures: Vec<String>,
        /// Annotate measures with the visuals that use them.
        #[arg(long)]
        include_visual_ids: bool,
    },

    /// Set the interaction type between visuals on report pages.
    DisableInteractions {
        report: PathBuf,
        /// Page display names or folder names (repeatable). Defaults to every page.
        #[arg(long = "page")]
        pages: Vec<String>,
        #[arg(long = "source-id")]
        source_ids: Vec<String>,
        #[arg(long = "source-type")]
        source_types: Vec<String>,
        #[arg(long = "target-id")]
        target_ids: Vec<String>,
        #[arg(long = "target-type")]
        target_types: Vec<String>,
        /// Overwrite, Upsert or Insert.
        #[arg(long, default_value = "Upsert")]
        update_type: String,
        /// Default, Filter, Highlight or NoFilter.
        #[arg(long, default_value = "NoFilter")]
        interaction: String,
    },

    /// Set or clear report-level filters.
    UpdateFilters {
        /// A report folder, or a folder of `*.Report` folders.
        dir: PathBuf,
        /// JSON list of `{Table, Column, Condition, Values}`, inline or as a file path.
        #[arg(long)]
        filters: String,
        /// Only these reports (repeatable).
        #[arg(long = "report")]
        reports: Vec<String>,
    },

    /// Reorder the report-level filter pane.
    SortFilters {
        /// A report folder, or a folder of `*.Report` folders.
        dir: PathBuf,
        /// Ascending, Descending, SelectedFilterTop or Custom.
        #[arg(long, default_value = "SelectedFilterTop")]
        order: String,
        /// Field names for `Custom`, in order (comma separated or repeated).
        #[arg(long, value_delimiter = ',')]
        custom_order: Vec<String>,
        /// Only these reports (repeatable).
        #[arg(long = "report")]
        reports: Vec<String>,
    },

    /// Check a report against the configured rules.
    Validate {
        report: PathBuf,
        /// Exit with status 1 when errors (or, with `failOnWarning`, warnings) are found.
        #[arg(long)]
        strict: bool,
        /// Treat warnings as failures in strict mode.
        #[arg(long)]
        fail_on_warning: bool,
        /// Skip rules below this severity (info, warning, error).
        #[arg(long)]
        severity: Option<String>,
        /// Only evaluate these rule ids (comma separated or repeated).
        #[arg(long, value_delimiter = ',')]
        rules: Vec<String>,
    },
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    run_with_args(args)
}

pub fn run_with_args(args: Args) -> Result<()> {
    logger::init_logger(args.verbose, args.quiet);
    let format = args.format;
    let dry_run = args.dry_run;

    match args.command {
        Command::BatchUpdate { dir, csv } => {
            let report = batch_update_project(&dir, &csv, dry_run)
                .with_context(|| format!("batch update of {}", dir.display()))?;
            emit(format, &report, print_batch)?;
            if !report.failed.is_empty() {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Sanitize {
            report,
            actions,
            exclude,
        } => {
            let config = PbirConfig::discover(args.config.as_deref(), Some(report.as_path()))?;
            let actions: Vec<String> = if actions.is_empty() {
                config.sanitize_actions()
            } else {
                actions
            }
            .into_iter()
            .filter(|action| !exclude.contains(action))
            .collect();

            let summary = sanitize_report(&report, &actions, dry_run, &mut LogSink)
                .with_context(|| format!("sanitize {}", report.display()))?;
            emit(format, &summary, print_sanitize)?;
            if !summary.failed.is_empty() {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::RemoveMeasures {
            report,
            measures,
            no_usage_check,
        } => {
            let options = MeasureRemoval {
                names: non_empty(measures),
                check_visual_usage: !no_usage_check,
            };
            let outcome = remove_measures(&report, &options, dry_run)
                .with_context(|| format!("remove measures from {}", report.display()))?;
            emit(format, &outcome, print_action)
        }
        Command::MeasureDependencies {
            report,
            measures,
            include_visual_ids,
        } => {
            let names = non_empty(measures);
            let text =
                measure_dependencies_report(&report, names.as_deref(), include_visual_ids);
            emit(format, &JsonText { report: &text }, |out| print!("{}", out.report))
        }
        Command::DisableInteractions {
            report,
            pages,
            source_ids,
            source_types,
            target_ids,
            target_types,
            update_type,
            interaction,
        } => {
            let update = InteractionUpdate {
                pages: non_empty(pages),
                source_ids: non_empty(source_ids),
                source_types: non_empty(source_types),
                target_ids: non_empty(target_ids),
                target_types: non_empty(target_types),
                update_type: update_type.parse::<UpdateType>()?,
                interaction: interaction.parse::<InteractionKind>()?,
            };
            let outcome =
                disable_visual_interactions_with_progress(&report, &update, dry_run, &mut LogSink)
                    .with_context(|| format!("update interactions in {}", report.display()))?;
            emit(format, &outcome, print_action)
        }
        Command::UpdateFilters {
            dir,
            filters,
            reports,
        } => {
            let specs = load_filter_specs(&filters)?;
            let reports = non_empty(reports);
            let outcomes = update_report_filters(&dir, &specs, reports.as_deref(), dry_run)
                .with_context(|| format!("update filters under {}", dir.display()))?;
            emit(format, &outcomes, |outcomes| print_filters(outcomes))
        }
        Command::SortFilters {
            dir,
            order,
            custom_order,
            reports,
        } => {
            let order = order.parse::<FilterSortOrder>()?;
            let reports = non_empty(reports);
            let outcomes =
                sort_report_filters(&dir, reports.as_deref(), order, &custom_order, dry_run)
                    .with_context(|| format!("sort filters under {}", dir.display()))?;
            emit(format, &outcomes, |outcomes| print_filters(outcomes))
        }
        Command::Validate {
            report,
            strict,
            fail_on_warning,
            severity,
            rules,
        } => {
            let config = PbirConfig::discover(args.config.as_deref(), Some(report.as_path()))?;
            let options = ValidateOptions {
                rules: Some(config.rules()),
                only: non_empty(rules),
                min_severity: severity.as_deref().map(str::parse::<Severity>).transpose()?,
                strict,
                fail_on_warning: fail_on_warning || config.fail_on_warning,
            };
            match validate_report(&report, &options) {
                Ok(result) => emit(format, &result, print_validation),
                Err(ValidationError::Failed {
                    message, result, ..
                }) => {
                    emit(format, &result, print_validation)?;
                    log::error!("{message}");
                    std::process::exit(1);
                }
                Err(ValidationError::Report(err)) => {
                    Err(err).with_context(|| format!("validate {}", report.display()))
                }
            }
        }
    }
}

#[derive(Serialize)]
struct JsonText<'a> {
    report: &'a str,
}

fn non_empty(values: Vec<String>) -> Option<Vec<String>> {
    (!values.is_empty()).then_some(values)
}

/// Filter specs from a JSON file, or from the argument itself when it is not a file.
fn load_filter_specs(input: &str) -> Result<Vec<FilterSpec>> {
    let path = Path::new(input);
    let text = if path.is_file() {
        fs::read_to_string(path).with_context(|| format!("read filter file {}", path.display()))?
    } else {
        input.to_string()
    };
    serde_json::from_str(&text).context("parse filter specs")
}

/// Print `value` as one JSON line, or through `text` for human output.
fn emit<T: Serialize + ?Sized>(format: OutputFormat, value: &T, text: impl FnOnce(&T)) -> Result<()> {
    match format {
        OutputFormat::Text => {
            text(value);
            Ok(())
        }
        OutputFormat::Json => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            serde_json::to_writer(&mut handle, value)?;
            handle.write_all(b"\n")?;
            Ok(())
        }
    }
}

fn print_action(report: &ActionReport) {
    let status = if report.changed { "changed" } else { "no changes" };
    println!("{}: {status}", report.action);
    for detail in &report.details {
        println!("  {detail}");
    }
}

fn print_sanitize(summary: &SanitizeSummary) {
    if summary.dry_run {
        println!("Dry run: nothing was written.");
    }
    for report in &summary.reports {
        print_action(report);
    }
    for name in &summary.skipped {
        println!("{name}: skipped (unknown action)");
    }
    for failure in &summary.failed {
        println!("{}: failed ({})", failure.action, failure.error);
    }
}

fn print_batch(report: &BatchReport) {
    let verb = if report.dry_run { "would change" } else { "changed" };
    println!(
        "Scanned {} file(s); {} {verb}, {} failed.",
        report.files_scanned,
        report.changed.len(),
        report.failed.len()
    );
    for path in &report.changed {
        println!("  {}", path.display());
    }
    for (path, error) in &report.failed {
        println!("  failed: {} ({error})", path.display());
    }
}

fn print_filters(outcomes: &[FilterOutcome]) {
    if outcomes.is_empty() {
        println!("No reports found.");
    }
    for outcome in outcomes {
        let status = if outcome.changed { "changed" } else { "no changes" };
        println!("{}: {status}", outcome.report);
        for detail in &outcome.details {
            println!("  {detail}");
        }
    }
}

fn print_validation(result: &ValidationResult) {
    println!("Validation of {}", result.report);
    for rule in &result.results {
        let tag = if rule.passed {
            "PASS".to_string()
        } else {
            rule.severity.as_str().to_uppercase()
        };
        println!("  [{tag}] {}", rule.rule_name);
        for violation in result
            .violations
            .iter()
            .filter(|violation| violation.rule_id == rule.rule_id)
        {
            println!("      {}", violation.message);
        }
    }
    println!();
    println!("Summary: {result}");
}
