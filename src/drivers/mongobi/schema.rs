//! MongoBI catalog queries.
//!
//! Each MongoDB database is a MySQL schema; queries are scoped to `DATABASE()`.
//! `COLUMN_TYPE` is reported instead of `DATA_TYPE` so `tinyint(1)` stays
//! distinguishable from other integers.

use crate::driver::CatalogQueries;

pub(crate) const CATALOG: CatalogQueries = CatalogQueries {
    list_tables: r#"
        SELECT
            TABLE_SCHEMA AS table_schema,
            TABLE_NAME AS table_name,
            TABLE_TYPE AS table_type
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = DATABASE()
        ORDER BY TABLE_NAME
    "#,
    columns: r#"
        SELECT
            TABLE_SCHEMA AS table_schema,
            TABLE_NAME AS table_name,
            COLUMN_NAME AS column_name,
            COLUMN_TYPE AS data_type,
            IS_NULLABLE AS is_nullable,
            ORDINAL_POSITION AS ordinal_position
        FROM information_schema.COLUMNS"#,
    scope: "TABLE_SCHEMA = DATABASE()",
    schema_column: "TABLE_SCHEMA",
    table_column: "TABLE_NAME",
    default_schema: "DATABASE()",
    create_schema: "CREATE DATABASE IF NOT EXISTS",
};
