//! Vendor connectors for each supported backend.
//!
//! Each submodule provides a `Connector` (opens vendor sessions for the pool),
//! the vendor type mapping into `ColumnType`, and the backend's catalog queries.

mod classify;
mod factory;
pub mod mongobi;
pub mod redshift;
pub mod snowflake;

#[cfg(test)]
pub(crate) mod mock;

pub use factory::DriverFactory;

/// Upper-cased vendor type name with any `(precision, scale)` suffix removed.
///
/// `numeric(18,2)` becomes `NUMERIC`, `character varying(256)` becomes
/// `CHARACTER VARYING`.
pub(crate) fn base_type_name(vendor_type: &str) -> String {
    let base = match vendor_type.find('(') {
        Some(idx) => {
            // Keep anything after the closing paren, e.g. `TIMESTAMP(6) WITH TIME ZONE`
            let tail = vendor_type[idx..]
                .find(')')
                .map(|end| &vendor_type[idx + end + 1..])
                .unwrap_or("");
            format!("{}{}", &vendor_type[..idx], tail)
        }
        None => vendor_type.to_string(),
    };
    base.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Single-quoted SQL string literal, with backslashes and quotes escaped.
///
/// All three backends treat backslash as an escape inside literals.
pub(crate) fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("orders"), "'orders'");
        assert_eq!(quote_literal("o'brien"), "'o''brien'");
        assert_eq!(quote_literal("a\\b"), "'a\\\\b'");
    }

    #[test]
    fn test_base_type_name() {
        assert_eq!(base_type_name("numeric(18,2)"), "NUMERIC");
        assert_eq!(base_type_name("character varying(256)"), "CHARACTER VARYING");
        assert_eq!(base_type_name("timestamp(6) with time zone"), "TIMESTAMP WITH TIME ZONE");
        assert_eq!(base_type_name("INT8"), "INT8");
        assert_eq!(base_type_name("bigint unsigned"), "BIGINT UNSIGNED");
    }
}
