//! Rule-based validation.
//!
//! Every rule is backed by a sanitize action: the rule fails when the action, run in dry-run
//! mode, would change the report. The would-be changes become the rule's violations.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::PbirError;
use crate::layout::ReportLayout;
use crate::progress::NoProgress;
use crate::sanitize::SanitizeAction;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = PbirError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            other => Err(PbirError::UnknownValue {
                kind: "severity",
                value: other.to_string(),
                expected: "info, warning, error",
            }),
        }
    }
}

fn default_severity() -> Severity {
    Severity::Warning
}

fn enabled() -> bool {
    true
}

/// One configured rule. `id` names the sanitize action that backs it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSpec {
    pub id: String,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default = "enabled")]
    pub enabled: bool,
}

impl RuleSpec {
    pub fn new(action: SanitizeAction, severity: Severity) -> Self {
        Self {
            id: action.as_str().to_string(),
            severity,
            description: None,
            display_name: None,
            enabled: true,
        }
    }

    pub fn display_name(&self) -> &str {
        if let Some(name) = &self.display_name {
            return name;
        }
        match self.id.parse::<SanitizeAction>() {
            Ok(action) => action.title(),
            Err(_) => &self.id,
        }
    }
}

/// The built-in rule set: one rule per sanitize action.
pub fn default_rules() -> Vec<RuleSpec> {
    SanitizeAction::ALL
        .into_iter()
        .map(|action| {
            let severity = match action {
                SanitizeAction::CleanupInvalidBookmarks => Severity::Error,
                SanitizeAction::DisableShowItemsWithNoData
                | SanitizeAction::SetFirstPageAsActive => Severity::Info,
                _ => Severity::Warning,
            };
            RuleSpec::new(action, severity)
        })
        .collect()
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidateOptions {
    /// Rule set to evaluate; `None` uses [`default_rules`].
    pub rules: Option<Vec<RuleSpec>>,
    /// Only evaluate these rule ids.
    pub only: Option<Vec<String>>,
    pub min_severity: Option<Severity>,
    /// Turn failing violations into [`ValidationError::Failed`].
    pub strict: bool,
    /// In strict mode, warnings fail too.
    pub fail_on_warning: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub rule_id: String,
    pub rule_name: String,
    pub severity: Severity,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RuleOutcome {
    pub rule_id: String,
    pub rule_name: String,
    pub severity: Severity,
    pub passed: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub report: String,
    pub results: Vec<RuleOutcome>,
    pub violations: Vec<Violation>,
}

impl ValidationResult {
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|rule| rule.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }

    fn count(&self, severity: Severity) -> usize {
        self.violations
            .iter()
            .filter(|violation| violation.severity == severity)
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    pub fn info_count(&self) -> usize {
        self.count(Severity::Info)
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} passed, {} errors, {} warnings, {} info",
            self.passed(),
            self.error_count(),
            self.warning_count(),
            self.info_count()
        )
    }
}

#[derive(Serialize)]
struct Summary {
    passed: usize,
    failed: usize,
    errors: usize,
    warnings: usize,
    info: usize,
}

impl Serialize for ValidationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ValidationResult", 4)?;
        state.serialize_field("report", &self.report)?;
        state.serialize_field("results", &self.results)?;
        state.serialize_field(
            "summary",
            &Summary {
                passed: self.passed(),
                failed: self.failed(),
                errors: self.error_count(),
                warnings: self.warning_count(),
                info: self.info_count(),
            },
        )?;
        state.serialize_field("violations", &self.violations)?;
        state.end()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// Strict mode found violations at a failing severity.
    #[error("{message}")]
    Failed {
        message: String,
        violations: Vec<Violation>,
        result: ValidationResult,
    },
    #[error(transparent)]
    Report(#[from] PbirError),
}

/// Violation messages for `rule`; empty when it passes.
fn evaluate(rule: &RuleSpec, root: &Path) -> Vec<String> {
    let action = match rule.id.parse::<SanitizeAction>() {
        Ok(action) => action,
        Err(err) => return vec![format!("rule evaluation failed: {err}")],
    };
    match action.run(root, true, &mut NoProgress) {
        Ok(report) if report.changed => {
            if report.details.is_empty() {
                vec![rule
                    .description
                    .clone()
                    .unwrap_or_else(|| format!("{} would make changes", rule.display_name()))]
            } else {
                report.details
            }
        }
        Ok(_) => Vec::new(),
        Err(err) => vec![format!("rule evaluation failed: {err}")],
    }
}

/// Run the selected rules against the report at `root`.
pub fn validate_report(
    root: impl AsRef<Path>,
    options: &ValidateOptions,
) -> Result<ValidationResult, ValidationError> {
    let layout = ReportLayout::open(root.as_ref())?;
    let rules = options.rules.clone().unwrap_or_else(default_rules);

    let mut result = ValidationResult {
        report: layout.name(),
        ..ValidationResult::default()
    };
    for rule in rules.iter().filter(|rule| rule.enabled) {
        if let Some(only) = &options.only {
            if !only.contains(&rule.id) {
                continue;
            }
        }
        if options.min_severity.is_some_and(|min| rule.severity < min) {
            continue;
        }

        let messages = evaluate(rule, layout.root());
        let passed = messages.is_empty();
        if passed {
            log::info!("[PASS] {}", rule.display_name());
        } else {
            log::info!(
                "[{}] {} ({} violation(s))",
                rule.severity.as_str().to_uppercase(),
                rule.display_name(),
                messages.len()
            );
        }
        result.results.push(RuleOutcome {
            rule_id: rule.id.clone(),
            rule_name: rule.display_name().to_string(),
            severity: rule.severity,
            passed,
        });
        result
            .violations
            .extend(messages.into_iter().map(|message| Violation {
                rule_id: rule.id.clone(),
                rule_name: rule.display_name().to_string(),
                severity: rule.severity,
                message,
            }));
    }

    log::info!("validated {}: {result}", result.report);

    if options.strict {
        let failing: Vec<Violation> = result
            .violations
            .iter()
            .filter(|violation| {
                violation.severity == Severity::Error
                    || (options.fail_on_warning && violation.severity == Severity::Warning)
            })
            .cloned()
            .collect();
        if !failing.is_empty() {
            return Err(ValidationError::Failed {
                message: format!("Validation failed with {} violation(s)", failing.len()),
                violations: failing,
                result,
            });
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn severities_are_ordered() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert_eq!("warning".parse::<Severity>().ok(), Some(Severity::Warning));
        assert!("fatal".parse::<Severity>().is_err());
    }

    #[test]
    fn rule_spec_defaults() {
        let rule: RuleSpec = serde_json::from_value(json!({"id": "remove_empty_pages"})).unwrap();
        assert_eq!(rule.severity, Severity::Warning);
        assert!(rule.enabled);
        assert_eq!(rule.display_name(), "Remove empty pages");
    }

    #[test]
    fn result_json_carries_a_summary() {
        let result = ValidationResult {
            report: "R".into(),
            results: vec![RuleOutcome {
                rule_id: "a".into(),
                rule_name: "A".into(),
                severity: Severity::Error,
                passed: false,
            }],
            violations: vec![Violation {
                rule_id: "a".into(),
                rule_name: "A".into(),
                severity: Severity::Error,
                message: "m".into(),
            }],
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value["summary"],
            json!({"passed": 0, "failed": 1, "errors": 1, "warnings": 0, "info": 0})
        );
        assert_eq!(value["violations"][0]["severity"], json!("error"));
    }
}
