//! Catalog types returned by schema introspection.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::row::ColumnType;

/// Nested catalog map: schema name -> table name -> columns in ordinal order
pub type TablesSchema = BTreeMap<String, BTreeMap<String, Vec<ColumnDetail>>>;

/// Information about a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Schema/namespace name
    pub schema: String,
    /// Table name
    pub name: String,
    /// Table type (BASE TABLE, VIEW, etc.)
    pub table_type: String,
}

impl TableDescriptor {
    /// Create a new table descriptor
    pub fn new(schema: String, name: String, table_type: String) -> Self {
        Self {
            schema,
            name,
            table_type,
        }
    }

    /// Get the fully qualified name (schema.table)
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Check if this is a view
    pub fn is_view(&self) -> bool {
        self.table_type.to_uppercase().contains("VIEW")
    }
}

/// Information about a single column of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDetail {
    /// Column name
    pub name: String,
    /// Data type as reported by the vendor catalog
    pub data_type: String,
    /// Canonical type the executor would normalize this column into
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Whether NULL values are allowed
    pub is_nullable: bool,
    /// Position in the table (1-indexed)
    pub ordinal_position: i32,
}

/// One part of a possibly qualified name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePart {
    pub name: String,
    /// Written with quotes, so the backend must not case-fold it
    pub quoted: bool,
}

impl NamePart {
    fn parse(part: &str) -> Self {
        let part = part.trim();
        for q in ['"', '`'] {
            if part.len() >= 2 && part.starts_with(q) && part.ends_with(q) {
                let inner = &part[1..part.len() - 1];
                let doubled = format!("{q}{q}");
                return Self {
                    name: inner.replace(&doubled, &q.to_string()),
                    quoted: true,
                };
            }
        }
        Self {
            name: part.to_string(),
            quoted: false,
        }
    }
}

/// A possibly schema-qualified table name, as accepted by `describe_table`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: Option<NamePart>,
    pub table: NamePart,
}

impl TableRef {
    /// Parse `table` or `schema.table`.
    ///
    /// Surrounding double quotes or backticks on either part are stripped and
    /// recorded, so `"Sales".orders` resolves to a quoted `Sales` and a bare `orders`.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let (schema, table) = match split_qualified(name) {
            Some((schema, table)) => (Some(NamePart::parse(schema)), NamePart::parse(table)),
            None => (None, NamePart::parse(name)),
        };

        if table.name.is_empty() || schema.as_ref().is_some_and(|s| s.name.is_empty()) {
            return None;
        }

        Some(Self { schema, table })
    }
}

/// Split on the first dot that is not inside quotes.
fn split_qualified(name: &str) -> Option<(&str, &str)> {
    let mut quote: Option<char> = None;
    for (idx, ch) in name.char_indices() {
        match (quote, ch) {
            (None, '"' | '`') => quote = Some(ch),
            (Some(q), c) if c == q => quote = None,
            (None, '.') => return Some((&name[..idx], &name[idx + 1..])),
            _ => {}
        }
    }
    None
}
