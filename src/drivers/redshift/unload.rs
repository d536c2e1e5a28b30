//! `UNLOAD` statement construction for the bulk export path.

use crate::driver::StagingTarget;
use crate::drivers::quote_literal;
use crate::storage::StorageType;
use crate::traits::ExportAuth;

/// Escape a query for embedding in `UNLOAD ('...')`.
///
/// Redshift wants backslash-escaped quotes inside the UNLOAD literal.
fn escape_unload_query(sql: &str) -> String {
    sql.trim()
        .trim_end_matches(';')
        .trim_end()
        .replace('\\', "\\\\")
        .replace('\'', "\\'")
}

/// Build the `UNLOAD` statement staging `sql` at the target location.
///
/// Files are gzip-compressed CSV with a header row.
///
/// # Returns
///
/// The statement, or the reason this target cannot be unloaded to.
pub(crate) fn unload_statement(sql: &str, target: &StagingTarget<'_>) -> Result<String, String> {
    if target.storage_type != StorageType::S3 {
        return Err(format!(
            "Redshift can only UNLOAD to S3, the export bucket is {}",
            target.storage_type.display_name()
        ));
    }

    let credentials = match target.auth {
        ExportAuth::IamRole { arn } => format!("IAM_ROLE {}", quote_literal(arn)),
        ExportAuth::AccessKeys {
            access_key_id,
            secret_access_key,
        } => format!(
            "ACCESS_KEY_ID {} SECRET_ACCESS_KEY {}",
            quote_literal(access_key_id),
            quote_literal(secret_access_key)
        ),
        ExportAuth::StorageIntegration { .. } => {
            return Err(
                "Redshift cannot use a storage integration, configure an IAM role or access keys"
                    .to_string(),
            );
        }
    };

    let mut statement = format!(
        "UNLOAD ('{}') TO {} {}",
        escape_unload_query(sql),
        quote_literal(&target.location),
        credentials
    );

    if let Some(region) = target.region.filter(|r| !r.is_empty()) {
        statement.push_str(&format!(" REGION {}", quote_literal(region)));
    }

    statement.push_str(" FORMAT AS CSV HEADER GZIP ALLOWOVERWRITE");
    Ok(statement)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target<'a>(auth: &'a ExportAuth, storage_type: StorageType) -> StagingTarget<'a> {
        StagingTarget {
            location: "s3://bucket/exports/run-1/".to_string(),
            storage_type,
            region: Some("us-east-1"),
            auth,
        }
    }

    #[test]
    fn test_unload_with_iam_role() {
        let auth = ExportAuth::IamRole {
            arn: "arn:aws:iam::123:role/unload".to_string(),
        };
        let sql = unload_statement("SELECT * FROM orders WHERE status = 'open';", &target(&auth, StorageType::S3))
            .unwrap();

        assert_eq!(
            sql,
            "UNLOAD ('SELECT * FROM orders WHERE status = \\'open\\'') \
             TO 's3://bucket/exports/run-1/' IAM_ROLE 'arn:aws:iam::123:role/unload' \
             REGION 'us-east-1' FORMAT AS CSV HEADER GZIP ALLOWOVERWRITE"
        );
    }

    #[test]
    fn test_unload_with_access_keys() {
        let auth = ExportAuth::AccessKeys {
            access_key_id: "AKIA".to_string(),
            secret_access_key: "shh".to_string(),
        };
        let sql = unload_statement("SELECT 1", &target(&auth, StorageType::S3)).unwrap();
        assert!(sql.contains("ACCESS_KEY_ID 'AKIA' SECRET_ACCESS_KEY 'shh'"));
    }

    #[test]
    fn test_unload_rejects_integration_and_gcs() {
        let integration = ExportAuth::StorageIntegration {
            name: "s3_int".to_string(),
        };
        assert!(unload_statement("SELECT 1", &target(&integration, StorageType::S3)).is_err());

        let role = ExportAuth::IamRole {
            arn: "arn".to_string(),
        };
        let reason = unload_statement("SELECT 1", &target(&role, StorageType::Gcs)).unwrap_err();
        assert!(reason.contains("S3"));
    }

    #[test]
    fn test_escape_unload_query() {
        assert_eq!(escape_unload_query("SELECT 'a\\b' ; "), "SELECT \\'a\\\\b\\'");
    }
}
