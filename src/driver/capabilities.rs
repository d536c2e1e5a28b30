//! What distinguishes one backend from another.
//!
//! Everything backend-specific that the executor, introspector, and exporter
//! need is reached through `Capabilities`: the dialect (type mapping, quoting,
//! case folding, export statements) and the catalog queries.

use serde::Serialize;

use super::export::StagingTarget;
use crate::drivers::{mongobi, quote_literal, redshift, snowflake};
use crate::traits::{BackendKind, ColumnType, NamePart};

/// Dialect tag for a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Redshift,
    MongoBi,
    Snowflake,
}

impl Dialect {
    pub fn for_backend(backend: BackendKind) -> Self {
        match backend {
            BackendKind::Redshift => Self::Redshift,
            BackendKind::MongoBi => Self::MongoBi,
            BackendKind::Snowflake => Self::Snowflake,
        }
    }

    /// Canonical type for a vendor type name, `None` when the mapping has no entry.
    pub fn canonical_type(&self, vendor_type: &str) -> Option<ColumnType> {
        match self {
            Self::Redshift => redshift::RedshiftValueConverter::canonical_type(vendor_type),
            Self::MongoBi => mongobi::MongoBiValueConverter::canonical_type(vendor_type),
            Self::Snowflake => snowflake::SnowflakeTypeMapper::canonical_type(vendor_type),
        }
    }

    /// Quote an identifier, doubling any embedded quote character.
    pub fn quote_identifier(&self, name: &str) -> String {
        let quote = match self {
            Self::Redshift | Self::Snowflake => '"',
            Self::MongoBi => '`',
        };
        let escaped = name.replace(quote, &format!("{quote}{quote}"));
        format!("{quote}{escaped}{quote}")
    }

    /// Catalog spelling of a name part.
    ///
    /// Unquoted identifiers are stored lower-case by Redshift and upper-case by
    /// Snowflake; MongoBI keeps collection names as written. Quoted parts are
    /// never folded.
    pub fn fold_identifier(&self, part: &NamePart) -> String {
        if part.quoted {
            return part.name.clone();
        }
        match self {
            Self::Redshift => part.name.to_lowercase(),
            Self::Snowflake => part.name.to_uppercase(),
            Self::MongoBi => part.name.clone(),
        }
    }

    /// Single-quoted string literal.
    pub fn string_literal(&self, value: &str) -> String {
        quote_literal(value)
    }

    pub fn catalog(&self) -> &'static CatalogQueries {
        match self {
            Self::Redshift => &redshift::schema::CATALOG,
            Self::MongoBi => &mongobi::schema::CATALOG,
            Self::Snowflake => &snowflake::schema::CATALOG,
        }
    }

    /// Statement that stages `sql` at `target`, or why this dialect cannot.
    pub(crate) fn staging_statement(
        &self,
        sql: &str,
        target: &StagingTarget<'_>,
    ) -> Result<String, String> {
        match self {
            Self::Redshift => redshift::unload::unload_statement(sql, target),
            Self::Snowflake => snowflake::copy::copy_into_statement(sql, target),
            Self::MongoBi => Err("MongoBI cannot unload query results to object storage".to_string()),
        }
    }
}

/// Catalog SQL for one backend.
///
/// Every column query selects, in order: schema, table, column, data type,
/// nullability (`YES`/`NO`), ordinal position. `list_tables` selects schema,
/// table, table type. Results are read by position.
#[derive(Debug)]
pub struct CatalogQueries {
    pub(crate) list_tables: &'static str,
    /// `SELECT ... FROM <columns view>` without a WHERE clause
    pub(crate) columns: &'static str,
    /// Predicate restricting `tables_schema` to user schemas
    pub(crate) scope: &'static str,
    pub(crate) schema_column: &'static str,
    pub(crate) table_column: &'static str,
    /// SQL expression for the session's default schema
    pub(crate) default_schema: &'static str,
    pub(crate) create_schema: &'static str,
}

impl CatalogQueries {
    pub fn list_tables(&self) -> &'static str {
        self.list_tables
    }

    /// Columns of every user table, ordered by schema, table, and position.
    pub fn tables_schema(&self) -> String {
        format!("{} WHERE {} ORDER BY 1, 2, 6", self.columns, self.scope)
    }

    /// Columns of one table. Names must already be folded to catalog spelling.
    ///
    /// # Arguments
    ///
    /// * `schema` - Schema name, or `None` for the session's default schema
    /// * `table` - Table name
    pub fn describe_table(&self, schema: Option<&str>, table: &str) -> String {
        let schema_expr = match schema {
            Some(schema) => quote_literal(schema),
            None => self.default_schema.to_string(),
        };
        format!(
            "{} WHERE {} = {} AND {} = {} ORDER BY 6",
            self.columns,
            self.schema_column,
            schema_expr,
            self.table_column,
            quote_literal(table)
        )
    }

    /// `CREATE SCHEMA`/`CREATE DATABASE` for an already quoted name.
    pub fn create_schema(&self, quoted_name: &str) -> String {
        format!("{} {}", self.create_schema, quoted_name)
    }
}

/// Static description of a backend
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub backend: BackendKind,
    pub dialect: Dialect,
    pub supports_export: bool,
}

impl Capabilities {
    pub fn for_backend(backend: BackendKind) -> Self {
        Self {
            backend,
            dialect: Dialect::for_backend(backend),
            supports_export: backend.supports_export(),
        }
    }

    pub fn catalog(&self) -> &'static CatalogQueries {
        self.dialect.catalog()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(name: &str, quoted: bool) -> NamePart {
        NamePart {
            name: name.to_string(),
            quoted,
        }
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(Dialect::Redshift.quote_identifier("orders"), "\"orders\"");
        assert_eq!(Dialect::Snowflake.quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(Dialect::MongoBi.quote_identifier("my`coll"), "`my``coll`");
    }

    #[test]
    fn test_fold_identifier() {
        assert_eq!(Dialect::Redshift.fold_identifier(&part("Orders", false)), "orders");
        assert_eq!(Dialect::Snowflake.fold_identifier(&part("Orders", false)), "ORDERS");
        assert_eq!(Dialect::Snowflake.fold_identifier(&part("Orders", true)), "Orders");
        assert_eq!(Dialect::MongoBi.fold_identifier(&part("Orders", false)), "Orders");
    }

    #[test]
    fn test_capabilities() {
        assert!(Capabilities::for_backend(BackendKind::Redshift).supports_export);
        assert!(Capabilities::for_backend(BackendKind::Snowflake).supports_export);
        assert!(!Capabilities::for_backend(BackendKind::MongoBi).supports_export);
    }

    #[test]
    fn test_type_mapping_per_dialect() {
        assert_eq!(Dialect::MongoBi.canonical_type("tinyint(1)"), Some(ColumnType::Boolean));
        assert_eq!(Dialect::Redshift.canonical_type("tinyint(1)"), None);
        assert_eq!(Dialect::Snowflake.canonical_type("NUMBER(38,0)"), Some(ColumnType::Number));
    }

    #[test]
    fn test_tables_schema_query() {
        let sql = Dialect::Redshift.catalog().tables_schema();
        assert!(sql.contains("information_schema.columns"));
        assert!(sql.ends_with("ORDER BY 1, 2, 6"));
    }

    #[test]
    fn test_mongobi_cannot_stage() {
        let auth = crate::traits::ExportAuth::IamRole {
            arn: "arn".to_string(),
        };
        let target = StagingTarget {
            location: "s3://b/p/".to_string(),
            storage_type: crate::storage::StorageType::S3,
            region: None,
            auth: &auth,
        };
        assert!(Dialect::MongoBi.staging_statement("SELECT 1", &target).is_err());
    }
}
