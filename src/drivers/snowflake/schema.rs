//! Snowflake catalog queries against the current database's `INFORMATION_SCHEMA`.

use crate::driver::CatalogQueries;

pub(crate) const CATALOG: CatalogQueries = CatalogQueries {
    list_tables: r#"
        SELECT
            TABLE_SCHEMA,
            TABLE_NAME,
            TABLE_TYPE
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_SCHEMA <> 'INFORMATION_SCHEMA'
        ORDER BY TABLE_SCHEMA, TABLE_NAME
    "#,
    columns: r#"
        SELECT
            TABLE_SCHEMA,
            TABLE_NAME,
            COLUMN_NAME,
            DATA_TYPE,
            IS_NULLABLE,
            ORDINAL_POSITION
        FROM INFORMATION_SCHEMA.COLUMNS"#,
    scope: "TABLE_SCHEMA <> 'INFORMATION_SCHEMA'",
    schema_column: "TABLE_SCHEMA",
    table_column: "TABLE_NAME",
    default_schema: "CURRENT_SCHEMA()",
    create_schema: "CREATE SCHEMA IF NOT EXISTS",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_query() {
        let sql = CATALOG.describe_table(Some("PUBLIC"), "ORDERS");
        assert!(sql.contains("INFORMATION_SCHEMA.COLUMNS"));
        assert!(sql.contains("TABLE_SCHEMA = 'PUBLIC'"));
        assert!(sql.contains("TABLE_NAME = 'ORDERS'"));
        assert!(CATALOG.describe_table(None, "ORDERS").contains("CURRENT_SCHEMA()"));
    }
}
