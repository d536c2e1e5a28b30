//! `COPY INTO <location>` statement construction for the bulk export path.

use crate::driver::{Dialect, StagingTarget};
use crate::drivers::quote_literal;
use crate::storage::StorageType;
use crate::traits::ExportAuth;

const FILE_FORMAT: &str =
    "FILE_FORMAT = (TYPE = CSV COMPRESSION = GZIP FIELD_OPTIONALLY_ENCLOSED_BY = '\"' NULL_IF = ())";

/// Build the `COPY INTO` statement unloading `sql` to the target location.
///
/// # Returns
///
/// The statement, or the reason this target cannot be unloaded to.
pub(crate) fn copy_into_statement(sql: &str, target: &StagingTarget<'_>) -> Result<String, String> {
    if !matches!(target.storage_type, StorageType::S3 | StorageType::Gcs) {
        return Err(format!(
            "Snowflake can only unload to S3 or GCS, the export bucket is {}",
            target.storage_type.display_name()
        ));
    }

    let credentials = match (target.auth, target.storage_type) {
        (ExportAuth::StorageIntegration { name }, _) => {
            format!("STORAGE_INTEGRATION = {}", integration_name(name)?)
        }
        (
            ExportAuth::AccessKeys {
                access_key_id,
                secret_access_key,
            },
            StorageType::S3,
        ) => format!(
            "CREDENTIALS = (AWS_KEY_ID = {} AWS_SECRET_KEY = {})",
            quote_literal(access_key_id),
            quote_literal(secret_access_key)
        ),
        (ExportAuth::AccessKeys { .. }, _) => {
            return Err("Snowflake needs a storage integration to unload to GCS".to_string());
        }
        (ExportAuth::IamRole { .. }, _) => {
            return Err(
                "Snowflake cannot assume an IAM role directly, configure a storage integration"
                    .to_string(),
            );
        }
    };

    let query = sql.trim().trim_end_matches(';').trim_end();

    Ok(format!(
        "COPY INTO {} FROM ({}) {} {} HEADER = TRUE OVERWRITE = TRUE",
        quote_literal(&target.location),
        query,
        credentials,
        FILE_FORMAT
    ))
}

/// Plain names stay unquoted so Snowflake folds them as usual; anything
/// else is quoted so it cannot break out of the clause.
fn integration_name(name: &str) -> Result<String, String> {
    let mut chars = name.chars();
    let plain = match chars.next() {
        None => return Err("the storage integration name is empty".to_string()),
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        }
    };
    Ok(if plain {
        name.to_string()
    } else {
        Dialect::Snowflake.quote_identifier(name)
    })
}
