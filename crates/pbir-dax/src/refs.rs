use std::borrow::Cow;

/// Returns `true` when `name` can appear in DAX without single quotes.
pub fn is_bare_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_')
}

/// Render a table name the way it must appear in DAX text.
///
/// Names with whitespace or punctuation are wrapped in single quotes; embedded quotes are
/// doubled.
pub fn quote_table_name(name: &str) -> Cow<'_, str> {
    if is_bare_identifier(name) {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("'{}'", name.replace('\'', "''")))
    }
}

/// Whether `expression` contains the bracketed token `[measure]`.
///
/// This is a plain substring test, the same signal the measure dependency graph is built on:
/// `Table[measure]` column references count too.
pub fn references_measure(expression: &str, measure: &str) -> bool {
    let needle = format!("[{}]", measure.replace(']', "]]"));
    expression.contains(&needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_follows_identifier_shape() {
        assert_eq!(quote_table_name("Sales"), "Sales");
        assert_eq!(quote_table_name("Sales 2024"), "'Sales 2024'");
        assert_eq!(quote_table_name("Sales-2024"), "'Sales-2024'");
        assert_eq!(quote_table_name("Bob's"), "'Bob''s'");
    }

    #[test]
    fn measure_references_are_bracketed_tokens() {
        assert!(references_measure("[Total] * 2", "Total"));
        assert!(!references_measure("[Total Sales] * 2", "Total"));
        assert!(!references_measure("Total * 2", "Total"));
    }
}
