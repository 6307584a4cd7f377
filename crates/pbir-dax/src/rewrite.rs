use std::borrow::Cow;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::maps::{ColumnMap, TableMap};
use crate::refs::{is_bare_identifier, quote_table_name};

/// Rewrite table and column references in a DAX expression.
///
/// Table renames run first, then column renames on the already-rewritten text, so column
/// lookups see effective (post-rename) table names. With neither map (or two empty maps) the
/// expression is returned unchanged.
pub fn rewrite_expression(
    expression: &str,
    tables: Option<&TableMap>,
    columns: Option<&ColumnMap>,
) -> String {
    let renamed = match tables {
        Some(tables) => rename_tables(expression, tables),
        None => Cow::Borrowed(expression),
    };
    match columns {
        Some(columns) => rename_columns(&renamed, columns).into_owned(),
        None => renamed.into_owned(),
    }
}

fn table_token_re() -> &'static Regex {
    static TABLE_TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    TABLE_TOKEN_RE.get_or_init(|| {
        // Alternatives are tried leftmost-first, so string literals and bracketed
        // column/measure names are consumed whole and never offered as table candidates.
        Regex::new(
            r#"(?x)
              "(?:[^"]|"")*"
            | \[[^\]]*\]
            | '(?P<quoted>(?:[^']|'')+)'
            | (?P<bare>\w+)
            "#,
        )
        .expect("valid regex")
    })
}

fn column_ref_re() -> &'static Regex {
    static COLUMN_REF_RE: OnceLock<Regex> = OnceLock::new();
    COLUMN_REF_RE.get_or_init(|| {
        Regex::new(
            r#"(?x)
              "(?:[^"]|"")*"
            | (?P<table>'(?:[^']|'')+'|\w+)\[(?P<column>[^\]]+)\]
            "#,
        )
        .expect("valid regex")
    })
}

/// Pass 1: rename table tokens (`Table`, `'Table Name'`) found in `tables`.
///
/// Quoted tokens stay quoted. Unquoted tokens stay unquoted unless the new name cannot be
/// written bare (e.g. it contains a space), in which case it is quoted.
pub fn rename_tables<'a>(expression: &'a str, tables: &TableMap) -> Cow<'a, str> {
    if tables.is_empty() {
        return Cow::Borrowed(expression);
    }

    let mut changed = false;
    let out = table_token_re().replace_all(expression, |caps: &Captures<'_>| {
        let whole = &caps[0];

        if let Some(quoted) = caps.name("quoted") {
            let name = quoted.as_str().replace("''", "'");
            if let Some(new_name) = tables.get(&name) {
                changed = true;
                return format!("'{}'", new_name.replace('\'', "''"));
            }
            return whole.to_string();
        }

        if let Some(bare) = caps.name("bare") {
            // `SUM(` and friends are function calls, never table references.
            if expression[bare.end()..].trim_start().starts_with('(') {
                return whole.to_string();
            }
            if let Some(new_name) = tables.get(bare.as_str()) {
                changed = true;
                return quote_table_name(new_name).into_owned();
            }
        }

        whole.to_string()
    });

    if changed {
        log::debug!("renamed table references: {expression:?} -> {out:?}");
        Cow::Owned(out.into_owned())
    } else {
        Cow::Borrowed(expression)
    }
}

/// Pass 2: rename the column part of `table[column]` references found in `columns`.
///
/// The table part is looked up with quotes stripped and re-emitted quoted when it was quoted
/// or cannot be written bare.
pub fn rename_columns<'a>(expression: &'a str, columns: &ColumnMap) -> Cow<'a, str> {
    if columns.is_empty() {
        return Cow::Borrowed(expression);
    }

    let mut changed = false;
    let out = column_ref_re().replace_all(expression, |caps: &Captures<'_>| {
        let whole = &caps[0];
        let (Some(table_part), Some(column)) = (caps.name("table"), caps.name("column")) else {
            return whole.to_string();
        };

        let table_part = table_part.as_str();
        let was_quoted = table_part.starts_with('\'');
        let table = if was_quoted {
            table_part[1..table_part.len() - 1].replace("''", "'")
        } else {
            table_part.to_string()
        };
        let column_name = column.as_str().replace("]]", "]");

        let Some(new_column) = columns.get(&table, &column_name) else {
            return whole.to_string();
        };

        changed = true;
        let table_text = if was_quoted || !is_bare_identifier(&table) {
            format!("'{}'", table.replace('\'', "''"))
        } else {
            table
        };
        format!("{table_text}[{}]", new_column.replace(']', "]]"))
    });

    if changed {
        log::debug!("renamed column references: {expression:?} -> {out:?}");
        Cow::Owned(out.into_owned())
    } else {
        Cow::Borrowed(expression)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(pairs: &[(&str, &str)]) -> TableMap {
        pairs.iter().copied().collect()
    }

    fn columns(entries: &[(&str, &str, &str)]) -> ColumnMap {
        entries
            .iter()
            .map(|(t, c, n)| ((*t, *c), *n))
            .collect()
    }

    #[test]
    fn quoted_tables_keep_their_quotes() {
        let map = tables(&[("Old Table", "New Table")]);
        assert_eq!(
            rewrite_expression("'Old Table'[Col]", Some(&map), None),
            "'New Table'[Col]"
        );

        let map = tables(&[("Old Table", "NewTable")]);
        assert_eq!(
            rewrite_expression("'Old Table'[Col]", Some(&map), None),
            "'NewTable'[Col]"
        );
    }

    #[test]
    fn unquoted_tables_gain_quotes_only_when_needed() {
        let map = tables(&[("OldTable", "NewTable")]);
        assert_eq!(
            rewrite_expression("OldTable[Col]", Some(&map), None),
            "NewTable[Col]"
        );

        let map = tables(&[("OldTable", "New Table")]);
        assert_eq!(
            rewrite_expression("OldTable[Col]", Some(&map), None),
            "'New Table'[Col]"
        );
    }

    #[test]
    fn bracketed_names_and_strings_are_not_table_candidates() {
        let map = tables(&[("Sales", "Revenue")]);
        assert_eq!(
            rewrite_expression(
                "CALCULATE([Sales], Sales[Sales] = \"Sales\")",
                Some(&map),
                None
            ),
            "CALCULATE([Sales], Revenue[Sales] = \"Sales\")"
        );
    }

    #[test]
    fn function_names_are_not_table_candidates() {
        let map = tables(&[("Date", "Calendar")]);
        assert_eq!(
            rewrite_expression("Date(2024, 1, 1) + COUNTROWS(Date)", Some(&map), None),
            "Date(2024, 1, 1) + COUNTROWS(Calendar)"
        );
    }

    #[test]
    fn column_pass_replaces_only_the_column_name() {
        let map = columns(&[("Table", "OldColumn", "NewColumn")]);
        assert_eq!(
            rewrite_expression("'Table'[OldColumn]", None, Some(&map)),
            "'Table'[NewColumn]"
        );
        assert_eq!(
            rewrite_expression("SUM(Table[OldColumn]) + Table[Other]", None, Some(&map)),
            "SUM(Table[NewColumn]) + Table[Other]"
        );
    }

    #[test]
    fn column_pass_sees_table_renames_from_pass_one() {
        let t = tables(&[("T", "T2")]);
        let c = columns(&[("T2", "C", "C2")]);
        assert_eq!(
            rewrite_expression("SUM(T[C]) / SUM(T[D])", Some(&t), Some(&c)),
            "SUM(T2[C2]) / SUM(T2[D])"
        );
    }

    #[test]
    fn columns_with_spaces_are_matched() {
        let map = columns(&[("Sales Data", "Net Amount", "Net Revenue")]);
        assert_eq!(
            rewrite_expression("SUM('Sales Data'[Net Amount])", None, Some(&map)),
            "SUM('Sales Data'[Net Revenue])"
        );
    }

    #[test]
    fn unmatched_expression_is_returned_verbatim() {
        let t = tables(&[("Nope", "Still Nope")]);
        let c = columns(&[("Nope", "X", "Y")]);
        let expr = "VAR x = SUM('Sales'[Amount]) RETURN x * 1.5";
        assert_eq!(rewrite_expression(expr, Some(&t), Some(&c)), expr);
        assert!(matches!(rename_tables(expr, &t), Cow::Borrowed(_)));
    }
}
