//! Rename-aware walks over schema-loose PBIR JSON documents.
//!
//! PBIR visual/page/bookmark JSON is effectively open-ended, so documents stay as
//! [`serde_json::Value`] trees and the rewriters react only to the handful of key shapes that
//! carry table and column references.

use std::borrow::Cow;

use pbir_dax::{rename_columns, rename_tables, ColumnMap, TableMap};
use serde_json::{Map, Value};

/// What the walker should do with a value after a visitor has looked at its key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Descend {
    Into,
    Skip,
}

/// Callback invoked for every `key: value` pair of every object in a document.
pub trait KeyVisitor {
    fn visit(&mut self, key: &str, value: &mut Value) -> Descend;
}

/// Depth-first walk calling `visitor` on each object entry; arrays are walked element-wise.
pub fn walk_keys<V: KeyVisitor + ?Sized>(value: &mut Value, visitor: &mut V) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if visitor.visit(key, child) == Descend::Into {
                    walk_keys(child, visitor);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                walk_keys(item, visitor);
            }
        }
        _ => {}
    }
}

/// Rename `Entity` fields, `entities[].name` and table references inside `expression` strings.
///
/// Returns whether anything changed.
pub fn rewrite_entities(doc: &mut Value, tables: &TableMap) -> bool {
    if tables.is_empty() {
        return false;
    }
    let mut visitor = EntityRenamer {
        tables,
        changed: false,
    };
    walk_keys(doc, &mut visitor);
    visitor.changed
}

/// Rename `Property` fields of `Column`/`Measure` bindings, the column of `filter` `Not In`
/// conditions and column references inside `expression` strings.
///
/// Entities are looked up as they currently appear, so run [`rewrite_entities`] first when a
/// batch renames tables too.
pub fn rewrite_properties(doc: &mut Value, columns: &ColumnMap) -> bool {
    if columns.is_empty() {
        return false;
    }
    let mut visitor = PropertyRenamer {
        columns,
        changed: false,
    };
    walk_keys(doc, &mut visitor);
    visitor.changed
}

struct EntityRenamer<'a> {
    tables: &'a TableMap,
    changed: bool,
}

impl KeyVisitor for EntityRenamer<'_> {
    fn visit(&mut self, key: &str, value: &mut Value) -> Descend {
        match key {
            "Entity" => {
                if let Some(renamed) = value.as_str().and_then(|name| self.tables.get(name)) {
                    *value = Value::String(renamed.to_string());
                    self.changed = true;
                }
                Descend::Skip
            }
            "entities" => {
                if let Value::Array(entities) = value {
                    for entity in entities.iter_mut() {
                        let Some(name) = entity.get_mut("name") else {
                            continue;
                        };
                        if let Some(renamed) = name.as_str().and_then(|n| self.tables.get(n)) {
                            *name = Value::String(renamed.to_string());
                            self.changed = true;
                        }
                    }
                }
                Descend::Into
            }
            "expression" => match value {
                Value::String(expression) => {
                    let rewritten = match rename_tables(expression, self.tables) {
                        Cow::Owned(rewritten) => Some(rewritten),
                        Cow::Borrowed(_) => None,
                    };
                    if let Some(rewritten) = rewritten {
                        *expression = rewritten;
                        self.changed = true;
                    }
                    Descend::Skip
                }
                _ => Descend::Into,
            },
            _ => Descend::Into,
        }
    }
}

struct PropertyRenamer<'a> {
    columns: &'a ColumnMap,
    changed: bool,
}

impl PropertyRenamer<'_> {
    fn rename_binding(&mut self, binding: &mut Value) {
        let Some(entity) = binding
            .pointer("/Expression/SourceRef/Entity")
            .and_then(Value::as_str)
        else {
            return;
        };
        let Some(property) = binding.get("Property").and_then(Value::as_str) else {
            return;
        };
        if let Some(renamed) = self.columns.get(entity, property) {
            let renamed = renamed.to_string();
            binding["Property"] = Value::String(renamed);
            self.changed = true;
        }
    }

    /// `filter: {From: [{Entity}], Where: [{Condition: {Not: {Expression: {In: ...}}}}]}`.
    fn rename_filter(&mut self, filter: &mut Map<String, Value>) {
        let Some(entity) = filter
            .get("From")
            .and_then(|from| from.pointer("/0/Entity"))
            .and_then(Value::as_str)
            .map(str::to_string)
        else {
            return;
        };
        let Some(Value::Array(conditions)) = filter.get_mut("Where") else {
            return;
        };
        for condition in conditions {
            let Some(column) =
                condition.pointer_mut("/Condition/Not/Expression/In/Expressions/0/Column")
            else {
                continue;
            };
            let Some(property) = column.get("Property").and_then(Value::as_str) else {
                continue;
            };
            if let Some(renamed) = self.columns.get(&entity, property) {
                let renamed = renamed.to_string();
                column["Property"] = Value::String(renamed);
                self.changed = true;
            }
        }
    }
}

impl KeyVisitor for PropertyRenamer<'_> {
    fn visit(&mut self, key: &str, value: &mut Value) -> Descend {
        match key {
            "Column" | "Measure" => {
                if value.is_object() {
                    self.rename_binding(value);
                }
                Descend::Skip
            }
            "filter" => match value {
                Value::Object(filter) if filter.contains_key("From") && filter.contains_key("Where") => {
                    self.rename_filter(filter);
                    Descend::Skip
                }
                _ => Descend::Into,
            },
            "expression" => match value {
                Value::String(expression) => {
                    let rewritten = match rename_columns(expression, self.columns) {
                        Cow::Owned(rewritten) => Some(rewritten),
                        Cow::Borrowed(_) => None,
                    };
                    if let Some(rewritten) = rewritten {
                        *expression = rewritten;
                        self.changed = true;
                    }
                    Descend::Skip
                }
                _ => Descend::Into,
            },
            _ => Descend::Into,
        }
    }
}
