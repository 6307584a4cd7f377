use std::collections::BTreeMap;

/// Old table name -> new table name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableMap {
    entries: BTreeMap<String, String>,
}

impl TableMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a rename. A later insert for the same old name replaces the earlier one.
    pub fn insert(&mut self, old: impl Into<String>, new: impl Into<String>) {
        self.entries.insert(old.into(), new.into());
    }

    pub fn get(&self, old: &str) -> Option<&str> {
        self.entries.get(old).map(String::as_str)
    }

    /// The name `table` has after renames are applied (`table` itself when not renamed).
    pub fn effective<'a>(&'a self, table: &'a str) -> &'a str {
        self.get(table).unwrap_or(table)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TableMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = TableMap::new();
        for (old, new) in iter {
            map.insert(old, new);
        }
        map
    }
}

/// `(table, old column)` -> new column.
///
/// The table component is the *effective* (already renamed) table name: column rewriting
/// always runs after table rewriting, so lookups happen against post-rename entities.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColumnMap {
    entries: BTreeMap<String, BTreeMap<String, String>>,
}

impl ColumnMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        table: impl Into<String>,
        column: impl Into<String>,
        new_column: impl Into<String>,
    ) {
        self.entries
            .entry(table.into())
            .or_default()
            .insert(column.into(), new_column.into());
    }

    pub fn get(&self, table: &str, column: &str) -> Option<&str> {
        self.entries
            .get(table)
            .and_then(|columns| columns.get(column))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(BTreeMap::is_empty)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = ((&str, &str), &str)> {
        self.entries.iter().flat_map(|(table, columns)| {
            columns
                .iter()
                .map(move |(old, new)| ((table.as_str(), old.as_str()), new.as_str()))
        })
    }
}

impl<T, C, N> FromIterator<((T, C), N)> for ColumnMap
where
    T: Into<String>,
    C: Into<String>,
    N: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = ((T, C), N)>>(iter: I) -> Self {
        let mut map = ColumnMap::new();
        for ((table, column), new_column) in iter {
            map.insert(table, column, new_column);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_map_is_keyed_by_table_and_column() {
        let map: ColumnMap = [(("Sales", "Amt"), "Amount"), (("Budget", "Amt"), "Value")]
            .into_iter()
            .collect();

        assert_eq!(map.get("Sales", "Amt"), Some("Amount"));
        assert_eq!(map.get("Budget", "Amt"), Some("Value"));
        assert_eq!(map.get("Sales", "Value"), None);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn effective_table_falls_back_to_the_original_name() {
        let map: TableMap = [("Old", "New")].into_iter().collect();
        assert_eq!(map.effective("Old"), "New");
        assert_eq!(map.effective("Other"), "Other");
    }
}
