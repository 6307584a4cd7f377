//! Textual table/column reference rewriting for DAX expressions.
//!
//! This is deliberately not a DAX parser. Expressions are scanned for reference-shaped
//! tokens (`Table`, `'Table Name'`, `Table[Column]`) and only those tokens are rewritten;
//! everything else is passed through byte-for-byte.

mod maps;
mod refs;
mod rewrite;

pub use crate::maps::{ColumnMap, TableMap};
pub use crate::refs::{is_bare_identifier, quote_table_name, references_measure};
pub use crate::rewrite::{rename_columns, rename_tables, rewrite_expression};
