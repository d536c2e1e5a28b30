//! Schema introspection over the backend's catalog views.
//!
//! Every catalog query lives in `CatalogQueries`; this module only runs them
//! and maps result columns by position.

use rust_decimal::prelude::ToPrimitive;

use crate::error::DriverError;
use crate::traits::{
    BackendKind, ColumnDetail, ColumnType, QueryResult, Row, TableDescriptor, TableRef,
    TablesSchema, Value,
};

use super::capabilities::Dialect;
use super::executor::{Executor, QueryOptions};

// Column positions in every `CatalogQueries::columns` result
const COL_SCHEMA: usize = 0;
const COL_TABLE: usize = 1;
const COL_NAME: usize = 2;
const COL_DATA_TYPE: usize = 3;
const COL_NULLABLE: usize = 4;
const COL_ORDINAL: usize = 5;

#[derive(Debug, Clone)]
pub struct Introspector {
    executor: Executor,
    dialect: Dialect,
    backend: BackendKind,
}

impl Introspector {
    pub fn new(executor: Executor, backend: BackendKind) -> Self {
        Self {
            executor,
            dialect: Dialect::for_backend(backend),
            backend,
        }
    }

    /// List user tables and views.
    pub async fn list_tables(&self, options: QueryOptions) -> Result<Vec<TableDescriptor>, DriverError> {
        let result = self
            .executor
            .query(self.dialect.catalog().list_tables(), options)
            .await?;

        result
            .rows
            .iter()
            .map(|row| {
                Ok(TableDescriptor::new(
                    self.text(row, 0)?,
                    self.text(row, 1)?,
                    self.optional_text(row, 2)?.unwrap_or_default(),
                ))
            })
            .collect()
    }

    /// Describe the columns of `table` or `schema.table`.
    ///
    /// Unquoted parts are folded to the backend's catalog spelling. Without a
    /// schema, the session's default schema is used. A table that does not
    /// exist yields an empty list.
    ///
    /// # Errors
    ///
    /// `SyntaxError` when the name cannot be parsed.
    pub async fn describe_table(
        &self,
        name: &str,
        options: QueryOptions,
    ) -> Result<Vec<ColumnDetail>, DriverError> {
        let table_ref = TableRef::parse(name)
            .ok_or_else(|| DriverError::syntax(self.backend, "invalid table name", name))?;

        let schema = table_ref
            .schema
            .as_ref()
            .map(|part| self.dialect.fold_identifier(part));
        let table = self.dialect.fold_identifier(&table_ref.table);

        let sql = self
            .dialect
            .catalog()
            .describe_table(schema.as_deref(), &table);
        let result = self.executor.query(&sql, options).await?;

        tracing::debug!(
            backend = %self.backend,
            table = %table,
            columns = result.row_count(),
            "Described table"
        );

        result.rows.iter().map(|row| self.column_detail(row)).collect()
    }

    /// Every column of every user table, nested as schema -> table -> columns.
    pub async fn tables_schema(&self, options: QueryOptions) -> Result<TablesSchema, DriverError> {
        let sql = self.dialect.catalog().tables_schema();
        let result = self.executor.query(&sql, options).await?;
        self.nest(&result)
    }

    /// Create a schema (a database on MongoBI) unless it already exists.
    pub async fn create_schema_if_not_exists(
        &self,
        name: &str,
        options: QueryOptions,
    ) -> Result<(), DriverError> {
        let part = TableRef::parse(name)
            .filter(|r| r.schema.is_none())
            .map(|r| r.table)
            .ok_or_else(|| DriverError::syntax(self.backend, "invalid schema name", name))?;

        let quoted = self
            .dialect
            .quote_identifier(&self.dialect.fold_identifier(&part));
        let sql = self.dialect.catalog().create_schema(&quoted);

        self.executor.query(&sql, options).await?;
        tracing::info!(backend = %self.backend, schema = %part.name, "Ensured schema exists");
        Ok(())
    }

    fn nest(&self, result: &QueryResult) -> Result<TablesSchema, DriverError> {
        let mut schema = TablesSchema::new();
        for row in &result.rows {
            let column = self.column_detail(row)?;
            schema
                .entry(self.text(row, COL_SCHEMA)?)
                .or_default()
                .entry(self.text(row, COL_TABLE)?)
                .or_default()
                .push(column);
        }
        Ok(schema)
    }

    fn column_detail(&self, row: &Row) -> Result<ColumnDetail, DriverError> {
        let data_type = self.optional_text(row, COL_DATA_TYPE)?.unwrap_or_default();
        let column_type = self
            .dialect
            .canonical_type(&data_type)
            .unwrap_or(ColumnType::String);

        Ok(ColumnDetail {
            name: self.text(row, COL_NAME)?,
            column_type,
            data_type,
            is_nullable: self
                .optional_text(row, COL_NULLABLE)?
                .is_some_and(|v| v.eq_ignore_ascii_case("YES")),
            ordinal_position: self.ordinal(row)?,
        })
    }

    fn cell<'r>(&self, row: &'r Row, idx: usize) -> Result<&'r Value, DriverError> {
        row.get(idx).ok_or_else(|| {
            DriverError::protocol(
                self.backend,
                format!("catalog row has {} columns, expected at least {}", row.len(), idx + 1),
            )
        })
    }

    fn optional_text(&self, row: &Row, idx: usize) -> Result<Option<String>, DriverError> {
        Ok(match self.cell(row, idx)? {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            other => Some(other.to_display_string()),
        })
    }

    fn text(&self, row: &Row, idx: usize) -> Result<String, DriverError> {
        self.optional_text(row, idx)?.ok_or_else(|| {
            DriverError::protocol(self.backend, format!("catalog column {} is NULL", idx))
        })
    }

    fn ordinal(&self, row: &Row) -> Result<i32, DriverError> {
        let value = self.cell(row, COL_ORDINAL)?;
        ordinal_value(value).ok_or_else(|| {
            DriverError::protocol(
                self.backend,
                format!("catalog ordinal position is not an integer: {}", value),
            )
        })
    }
}

/// Ordinal positions arrive as whatever numeric type the catalog uses.
fn ordinal_value(value: &Value) -> Option<i32> {
    match value {
        Value::Int(v) => i32::try_from(*v).ok(),
        Value::Decimal(d) => d.to_i32(),
        Value::Float(f) if f.fract() == 0.0 && (f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(f) => {
            Some(*f as i32)
        }
        Value::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}
