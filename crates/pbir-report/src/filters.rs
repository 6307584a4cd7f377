//! Report-level filter rules: build filter conditions from simple specs and reorder the filter
//! pane.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{PbirError, Result};
use crate::layout::ReportLayout;
use crate::model::load_optional;

/// One requested filter, as written in a filter file:
/// `{"Table": "Sales", "Column": "Region", "Condition": "In", "Values": ["EU"]}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilterSpec {
    pub table: String,
    pub column: String,
    pub condition: String,
    /// `None` or empty clears the filter.
    #[serde(default)]
    pub values: Option<Vec<FilterValue>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<&str> for FilterValue {
    fn from(text: &str) -> Self {
        FilterValue::Text(text.to_string())
    }
}

impl From<i64> for FilterValue {
    fn from(n: i64) -> Self {
        FilterValue::Int(n)
    }
}

impl FilterValue {
    /// DAX literal as stored in `Literal.Value`.
    pub fn to_literal(&self) -> String {
        match self {
            FilterValue::Bool(b) => b.to_string(),
            FilterValue::Int(n) => format!("{n}L"),
            FilterValue::Float(x) => format!("{x:?}D"),
            FilterValue::Text(text) => match parse_date(text) {
                Some(date) => format!("datetime'{}'", date.format("%Y-%m-%dT00:00:00")),
                None => format!("'{}'", text.replace('\'', "''")),
            },
        }
    }
}

/// `dd-Mon-yyyy`, e.g. `01-Jan-2023`.
fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%d-%b-%Y").ok()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterCondition {
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Between,
    In,
    NotIn,
    Contains,
    StartsWith,
    EndsWith,
    NotContains,
    NotStartsWith,
    NotEndsWith,
}

impl FilterCondition {
    const ALL: [FilterCondition; 13] = [
        FilterCondition::GreaterThan,
        FilterCondition::GreaterThanOrEqual,
        FilterCondition::LessThan,
        FilterCondition::LessThanOrEqual,
        FilterCondition::Between,
        FilterCondition::In,
        FilterCondition::NotIn,
        FilterCondition::Contains,
        FilterCondition::StartsWith,
        FilterCondition::EndsWith,
        FilterCondition::NotContains,
        FilterCondition::NotStartsWith,
        FilterCondition::NotEndsWith,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FilterCondition::GreaterThan => "GreaterThan",
            FilterCondition::GreaterThanOrEqual => "GreaterThanOrEqual",
            FilterCondition::LessThan => "LessThan",
            FilterCondition::LessThanOrEqual => "LessThanOrEqual",
            FilterCondition::Between => "Between",
            FilterCondition::In => "In",
            FilterCondition::NotIn => "NotIn",
            FilterCondition::Contains => "Contains",
            FilterCondition::StartsWith => "StartsWith",
            FilterCondition::EndsWith => "EndsWith",
            FilterCondition::NotContains => "NotContains",
            FilterCondition::NotStartsWith => "NotStartsWith",
            FilterCondition::NotEndsWith => "NotEndsWith",
        }
    }

    fn comparison_kind(self) -> Option<u8> {
        match self {
            FilterCondition::GreaterThan => Some(1),
            FilterCondition::GreaterThanOrEqual => Some(2),
            FilterCondition::LessThan => Some(3),
            FilterCondition::LessThanOrEqual => Some(4),
            _ => None,
        }
    }

    /// Text operator and whether it is negated.
    fn text_operator(self) -> Option<(&'static str, bool)> {
        match self {
            FilterCondition::Contains => Some(("Contains", false)),
            FilterCondition::StartsWith => Some(("StartsWith", false)),
            FilterCondition::EndsWith => Some(("EndsWith", false)),
            FilterCondition::NotContains => Some(("Contains", true)),
            FilterCondition::NotStartsWith => Some(("StartsWith", true)),
            FilterCondition::NotEndsWith => Some(("EndsWith", true)),
            _ => None,
        }
    }

    /// Why `values` cannot be used with this condition, if they cannot.
    fn check_values(self, values: &[FilterValue]) -> Option<&'static str> {
        if self.comparison_kind().is_some() {
            return (values.len() != 1).then_some("requires exactly one value");
        }
        if self.text_operator().is_some() {
            return match values {
                [FilterValue::Text(_)] => None,
                [_] => Some("requires a string value"),
                _ => Some("requires exactly one value"),
            };
        }
        match self {
            FilterCondition::Between => (values.len() != 2).then_some("requires exactly two values"),
            _ => None,
        }
    }
}

impl fmt::Display for FilterCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterCondition {
    type Err = PbirError;

    fn from_str(name: &str) -> Result<Self> {
        FilterCondition::ALL
            .into_iter()
            .find(|condition| condition.as_str() == name)
            .ok_or_else(|| PbirError::UnknownValue {
                kind: "filter condition",
                value: name.to_string(),
                expected: "GreaterThan, GreaterThanOrEqual, LessThan, LessThanOrEqual, Between, \
                           In, NotIn, Contains, StartsWith, EndsWith, NotContains, \
                           NotStartsWith, NotEndsWith",
            })
    }
}

/// A filter spec that passed validation.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidFilter {
    pub table: String,
    pub column: String,
    pub action: FilterAction,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FilterAction {
    Clear,
    Apply {
        condition: FilterCondition,
        values: Vec<FilterValue>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct IgnoredFilter {
    pub spec: FilterSpec,
    pub reason: String,
}

/// Split `specs` into usable filters and ignored ones (with the reason).
pub fn validate_filters(specs: &[FilterSpec]) -> (Vec<ValidFilter>, Vec<IgnoredFilter>) {
    let mut valid = Vec::new();
    let mut ignored = Vec::new();
    for spec in specs {
        let values = spec.values.as_deref().unwrap_or_default();
        if values.is_empty() {
            valid.push(ValidFilter {
                table: spec.table.clone(),
                column: spec.column.clone(),
                action: FilterAction::Clear,
            });
            continue;
        }
        let condition = match spec.condition.parse::<FilterCondition>() {
            Ok(condition) => condition,
            Err(err) => {
                ignored.push(IgnoredFilter {
                    spec: spec.clone(),
                    reason: err.to_string(),
                });
                continue;
            }
        };
        if let Some(reason) = condition.check_values(values) {
            ignored.push(IgnoredFilter {
                spec: spec.clone(),
                reason: format!("{condition} {reason}"),
            });
            continue;
        }
        valid.push(ValidFilter {
            table: spec.table.clone(),
            column: spec.column.clone(),
            action: FilterAction::Apply {
                condition,
                values: values.to_vec(),
            },
        });
    }
    (valid, ignored)
}

fn column_expr(column: &str, source: &str) -> Value {
    json!({"Column": {"Expression": {"SourceRef": {"Source": source}}, "Property": column}})
}

fn literal(value: &FilterValue) -> Value {
    json!({"Literal": {"Value": value.to_literal()}})
}

fn comparison(kind: u8, column: &str, source: &str, value: &FilterValue) -> Value {
    json!({"Comparison": {
        "ComparisonKind": kind,
        "Left": column_expr(column, source),
        "Right": literal(value),
    }})
}

/// The `Condition` object for `condition` on `column`, bound to the `From` alias `source`.
///
/// `values` must already satisfy the condition's arity (see [`validate_filters`]).
pub fn create_condition(
    condition: FilterCondition,
    column: &str,
    values: &[FilterValue],
    source: &str,
) -> Value {
    if let (Some(kind), [value]) = (condition.comparison_kind(), values) {
        return comparison(kind, column, source, value);
    }
    if let (Some((operator, negated)), [value]) = (condition.text_operator(), values) {
        let test = json!({operator: {"Left": column_expr(column, source), "Right": literal(value)}});
        return if negated {
            json!({"Not": {"Expression": test}})
        } else {
            test
        };
    }
    match (condition, values) {
        (FilterCondition::Between, [low, high]) => json!({"And": {
            "Left": comparison(2, column, source, low),
            "Right": comparison(4, column, source, high),
        }}),
        (FilterCondition::NotIn, _) => {
            json!({"Not": {"Expression": in_condition(column, source, values)}})
        }
        _ => in_condition(column, source, values),
    }
}

fn in_condition(column: &str, source: &str, values: &[FilterValue]) -> Value {
    let values: Vec<Value> = values.iter().map(|value| json!([literal(value)])).collect();
    json!({"In": {"Expressions": [column_expr(column, source)], "Values": values}})
}

/// Full `filter` object for a report-level filter card.
pub fn build_filter(
    table: &str,
    column: &str,
    condition: FilterCondition,
    values: &[FilterValue],
) -> Value {
    let source = table
        .chars()
        .next()
        .map(|c| c.to_lowercase().to_string())
        .unwrap_or_else(|| "t".to_string());
    json!({
        "Version": 2,
        "From": [{"Name": source, "Entity": table, "Type": 0}],
        "Where": [{"Condition": create_condition(condition, column, values, &source)}],
    })
}

/// What happened to one report.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FilterOutcome {
    pub report: String,
    pub changed: bool,
    pub details: Vec<String>,
}

/// `(table, column)` of a filter card's `Column`/`Measure` field.
fn filter_field(filter: &Value) -> Option<(&str, &str)> {
    let field = filter.get("field")?;
    let binding = field.get("Column").or_else(|| field.get("Measure"))?;
    let table = binding
        .pointer("/Expression/SourceRef/Entity")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let column = binding.get("Property")?.as_str()?;
    Some((table, column))
}

fn filter_name(filter: &Value) -> String {
    filter_field(filter)
        .map(|(_, column)| column.to_string())
        .unwrap_or_default()
}

/// Apply `specs` to the report-level filters of every report under `dir`.
///
/// Invalid specs are logged and ignored. A report is written only when one of its filter cards
/// actually changed.
pub fn update_report_filters(
    dir: impl AsRef<Path>,
    specs: &[FilterSpec],
    reports: Option<&[String]>,
    dry_run: bool,
) -> Result<Vec<FilterOutcome>> {
    let (valid, ignored) = validate_filters(specs);
    for ignored in &ignored {
        log::warn!(
            "ignoring filter on {}[{}]: {}",
            ignored.spec.table,
            ignored.spec.column,
            ignored.reason
        );
    }

    let mut outcomes = Vec::new();
    for layout in ReportLayout::discover(dir, reports)? {
        let mut outcome = FilterOutcome {
            report: layout.name(),
            ..FilterOutcome::default()
        };
        let Some(mut doc) = load_optional(&layout.report_json()) else {
            outcomes.push(outcome);
            continue;
        };
        let Some(filters) = doc
            .pointer_mut("/filterConfig/filters")
            .and_then(Value::as_array_mut)
        else {
            log::debug!("{}: no report filters", outcome.report);
            outcomes.push(outcome);
            continue;
        };

        for card in filters.iter_mut() {
            let Some((table, column)) = filter_field(card) else {
                continue;
            };
            let Some(spec) = valid
                .iter()
                .find(|spec| spec.table == table && spec.column == column)
            else {
                continue;
            };
            let label = format!("{table}[{column}]");
            let Some(card) = card.as_object_mut() else {
                continue;
            };
            match &spec.action {
                FilterAction::Clear => {
                    if card.remove("filter").is_some() {
                        outcome.details.push(format!("Cleared filter on {label}"));
                    }
                }
                FilterAction::Apply { condition, values } => {
                    let filter = build_filter(&spec.table, &spec.column, *condition, values);
                    if card.get("filter") != Some(&filter) {
                        card.insert("filter".to_string(), filter);
                        outcome
                            .details
                            .push(format!("Set {condition} filter on {label}"));
                    }
                }
            }
        }

        outcome.changed = !outcome.details.is_empty();
        if outcome.changed && !dry_run {
            pbir_fs::write_json(layout.report_json(), &doc)?;
        }
        log::info!(
            "{}: {} filter(s) {}",
            outcome.report,
            outcome.details.len(),
            if dry_run { "would change" } else { "changed" }
        );
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterSortOrder {
    Ascending,
    Descending,
    /// Cards with an applied filter first, then the rest; each group alphabetical.
    SelectedFilterTop,
    /// Named cards first, in the given order, then the rest alphabetically.
    Custom,
}

impl FromStr for FilterSortOrder {
    type Err = PbirError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "Ascending" => Ok(FilterSortOrder::Ascending),
            "Descending" => Ok(FilterSortOrder::Descending),
            "SelectedFilterTop" => Ok(FilterSortOrder::SelectedFilterTop),
            "Custom" => Ok(FilterSortOrder::Custom),
            other => Err(PbirError::InvalidSortOrder(other.to_string())),
        }
    }
}

/// Reorder `filters` in place and return the `filterSortOrder` value to store.
fn sort_filters(
    filters: &mut Vec<Value>,
    order: FilterSortOrder,
    custom_order: &[String],
) -> &'static str {
    let by_name = |a: &Value, b: &Value| filter_name(a).cmp(&filter_name(b));
    match order {
        FilterSortOrder::Ascending | FilterSortOrder::Descending => {
            filters.sort_by(by_name);
            if order == FilterSortOrder::Descending {
                filters.reverse();
            }
            for filter in filters.iter_mut() {
                if let Some(card) = filter.as_object_mut() {
                    card.remove("ordinal");
                }
            }
            return if order == FilterSortOrder::Ascending {
                "Ascending"
            } else {
                "Descending"
            };
        }
        FilterSortOrder::SelectedFilterTop => {
            let (mut selected, mut rest): (Vec<Value>, Vec<Value>) = filters
                .drain(..)
                .partition(|filter| filter.get("filter").is_some());
            selected.sort_by(by_name);
            rest.sort_by(by_name);
            filters.extend(selected);
            filters.extend(rest);
        }
        FilterSortOrder::Custom => {
            let mut remaining: Vec<Value> = std::mem::take(filters);
            for name in custom_order {
                let (picked, left): (Vec<Value>, Vec<Value>) = remaining
                    .into_iter()
                    .partition(|filter| filter_name(filter) == *name);
                filters.extend(picked);
                remaining = left;
            }
            remaining.sort_by(by_name);
            filters.extend(remaining);
        }
    }
    for (ordinal, filter) in filters.iter_mut().enumerate() {
        if let Some(card) = filter.as_object_mut() {
            card.insert("ordinal".to_string(), Value::from(ordinal));
        }
    }
    "Custom"
}

/// Reorder the report-level filter pane of every report under `dir`.
pub fn sort_report_filters(
    dir: impl AsRef<Path>,
    reports: Option<&[String]>,
    order: FilterSortOrder,
    custom_order: &[String],
    dry_run: bool,
) -> Result<Vec<FilterOutcome>> {
    let mut outcomes = Vec::new();
    for layout in ReportLayout::discover(dir, reports)? {
        let mut outcome = FilterOutcome {
            report: layout.name(),
            ..FilterOutcome::default()
        };
        let Some(mut doc) = load_optional(&layout.report_json()) else {
            outcomes.push(outcome);
            continue;
        };
        let Some(config) = doc.get_mut("filterConfig").and_then(Value::as_object_mut) else {
            outcomes.push(outcome);
            continue;
        };
        let before = Value::Object(config.clone());
        let Some(filters) = config.get_mut("filters").and_then(Value::as_array_mut) else {
            outcomes.push(outcome);
            continue;
        };
        if filters.is_empty() {
            outcomes.push(outcome);
            continue;
        }

        let sort_order = sort_filters(filters, order, custom_order);
        config.insert("filterSortOrder".to_string(), Value::from(sort_order));
        if Value::Object(config.clone()) != before {
            outcome.changed = true;
            outcome
                .details
                .push(format!("Sorted filters ({sort_order})"));
            if !dry_run {
                pbir_fs::write_json(layout.report_json(), &doc)?;
            }
        }
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn spec(condition: &str, values: Vec<FilterValue>) -> FilterSpec {
        FilterSpec {
            table: "Sales".to_string(),
            column: "Amount".to_string(),
            condition: condition.to_string(),
            values: Some(values),
        }
    }

    #[test]
    fn literals() {
        assert_eq!(
            FilterValue::from("01-Jan-2023").to_literal(),
            "datetime'2023-01-01T00:00:00'"
        );
        assert_eq!(FilterValue::from("2023-01-01").to_literal(), "'2023-01-01'");
        assert_eq!(FilterValue::Int(123).to_literal(), "123L");
        assert_eq!(FilterValue::Float(1.5).to_literal(), "1.5D");
        assert_eq!(FilterValue::Float(1.0).to_literal(), "1.0D");
        assert_eq!(FilterValue::from("it's").to_literal(), "'it''s'");
        assert_eq!(FilterValue::Bool(true).to_literal(), "true");
    }

    #[test]
    fn comparison_and_between_conditions() {
        let gt = create_condition(FilterCondition::GreaterThan, "col", &[10.into()], "src");
        assert_eq!(gt["Comparison"]["ComparisonKind"], json!(1));
        assert_eq!(gt["Comparison"]["Right"]["Literal"]["Value"], json!("10L"));

        let between = create_condition(
            FilterCondition::Between,
            "col",
            &[10.into(), 20.into()],
            "src",
        );
        assert_eq!(between["And"]["Left"]["Comparison"]["ComparisonKind"], json!(2));
        assert_eq!(between["And"]["Right"]["Comparison"]["ComparisonKind"], json!(4));
    }

    #[test]
    fn in_and_text_conditions() {
        let values = [FilterValue::from("a"), FilterValue::from("b")];
        let cond = create_condition(FilterCondition::In, "col", &values, "src");
        assert_eq!(cond["In"]["Values"].as_array().map(Vec::len), Some(2));

        let not_in = create_condition(FilterCondition::NotIn, "col", &values, "src");
        assert!(not_in["Not"]["Expression"]["In"].is_object());

        let contains = create_condition(FilterCondition::Contains, "col", &["x".into()], "src");
        assert!(contains.get("Contains").is_some());
        let not_ends =
            create_condition(FilterCondition::NotEndsWith, "col", &["x".into()], "src");
        assert!(not_ends["Not"]["Expression"]["EndsWith"].is_object());
    }

    #[test]
    fn validation_checks_arity_and_types() {
        let specs = vec![
            spec("GreaterThan", vec![10.into()]),
            spec("GreaterThan", vec![10.into(), 20.into()]),
            spec("Between", vec![10.into()]),
            spec("Contains", vec![123.into()]),
            spec("Sideways", vec![1.into()]),
        ];
        let (valid, ignored) = validate_filters(&specs);
        assert_eq!(valid.len(), 1);
        assert_eq!(ignored.len(), 4);
        assert_eq!(ignored[2].reason, "Contains requires a string value");
    }

    #[test]
    fn custom_order_puts_named_cards_first() {
        let card = |name: &str| json!({"field": {"Column": {"Property": name}}});
        let mut filters = vec![card("C"), card("A"), card("B")];
        let order = sort_filters(
            &mut filters,
            FilterSortOrder::Custom,
            &["B".to_string(), "A".to_string()],
        );
        assert_eq!(order, "Custom");
        let names: Vec<String> = filters.iter().map(filter_name).collect();
        assert_eq!(names, vec!["B", "A", "C"]);
        assert_eq!(filters[2]["ordinal"], json!(2));
    }

    #[test]
    fn selected_filters_float_to_top() {
        let mut filters = vec![
            json!({"field": {"Column": {"Property": "B"}}}),
            json!({"field": {"Column": {"Property": "A"}}, "filter": {}}),
        ];
        assert_eq!(
            sort_filters(&mut filters, FilterSortOrder::SelectedFilterTop, &[]),
            "Custom"
        );
        let names: Vec<String> = filters.iter().map(filter_name).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn unknown_sort_order_is_rejected() {
        assert!(matches!(
            "InvalidOrder".parse::<FilterSortOrder>(),
            Err(PbirError::InvalidSortOrder(_))
        ));
    }
}
