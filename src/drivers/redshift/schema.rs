//! Redshift catalog queries.
//!
//! Redshift's `information_schema` reports `sql_identifier` columns, which SQLx
//! cannot decode, so every column is cast to a plain type.

use crate::driver::CatalogQueries;

pub(crate) const CATALOG: CatalogQueries = CatalogQueries {
    list_tables: r#"
        SELECT
            CAST(table_schema AS VARCHAR) AS table_schema,
            CAST(table_name AS VARCHAR) AS table_name,
            CAST(table_type AS VARCHAR) AS table_type
        FROM information_schema.tables
        WHERE table_schema NOT IN ('information_schema', 'pg_catalog', 'pg_internal', 'pg_automv')
        ORDER BY table_schema, table_name
    "#,
    columns: r#"
        SELECT
            CAST(table_schema AS VARCHAR) AS table_schema,
            CAST(table_name AS VARCHAR) AS table_name,
            CAST(column_name AS VARCHAR) AS column_name,
            CAST(data_type AS VARCHAR) AS data_type,
            CAST(is_nullable AS VARCHAR) AS is_nullable,
            CAST(ordinal_position AS INT) AS ordinal_position
        FROM information_schema.columns"#,
    scope: "table_schema NOT IN ('information_schema', 'pg_catalog', 'pg_internal', 'pg_automv')",
    schema_column: "table_schema",
    table_column: "table_name",
    default_schema: "current_schema()",
    create_schema: "CREATE SCHEMA IF NOT EXISTS",
};
