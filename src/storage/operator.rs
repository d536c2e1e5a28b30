//! OpenDAL plumbing shared by the storage backends.

use anyhow::{Result, anyhow};
use async_lock::RwLock;
use opendal::{EntryMode, Operator};

use super::types::ObjectInfo;

/// An OpenDAL operator that is built on `connect` and dropped on `disconnect`.
#[derive(Default)]
pub(crate) struct OperatorSlot {
    operator: RwLock<Option<Operator>>,
}

impl OperatorSlot {
    pub(crate) async fn set(&self, op: Option<Operator>) {
        *self.operator.write().await = op;
    }

    pub(crate) async fn is_set(&self) -> bool {
        self.operator.read().await.is_some()
    }

    /// Get the operator, returning an error if not connected.
    pub(crate) async fn get(&self) -> Result<Operator> {
        self.operator
            .read()
            .await
            .as_ref()
            .cloned()
            .ok_or_else(|| anyhow!("Storage not connected"))
    }
}

/// Normalize a path for OpenDAL (no leading slash).
pub(crate) fn normalize_path(path: &str) -> &str {
    path.trim_start_matches('/')
}

/// Normalize a prefix for listing (no leading slash, trailing slash unless root).
pub(crate) fn normalize_prefix(path: &str) -> String {
    let path = normalize_path(path);
    if path.is_empty() || path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

/// List every file under `prefix`, skipping directory markers.
pub(crate) async fn list_files(op: &Operator, prefix: &str) -> Result<Vec<ObjectInfo>> {
    let prefix = normalize_prefix(prefix);
    let entries = op.list_with(&prefix).recursive(true).await?;

    let mut objects: Vec<ObjectInfo> = entries
        .into_iter()
        .filter(|entry| entry.metadata().mode() == EntryMode::FILE)
        .map(|entry| {
            let metadata = entry.metadata();
            ObjectInfo::file(
                entry.path().to_string(),
                metadata.content_length(),
                metadata.last_modified(),
            )
        })
        .collect();

    objects.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(objects)
}

pub(crate) async fn delete_paths(op: &Operator, paths: &[String]) -> Result<()> {
    for path in paths {
        op.delete(normalize_path(path)).await?;
    }
    Ok(())
}

/// Remove everything under `prefix`. An empty prefix would wipe the bucket and is refused.
pub(crate) async fn delete_prefix(op: &Operator, prefix: &str) -> Result<()> {
    let prefix = normalize_prefix(prefix);
    if prefix.is_empty() {
        return Err(anyhow!("refusing to delete the bucket root"));
    }
    op.remove_all(&prefix).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/data/file.csv"), "data/file.csv");
        assert_eq!(normalize_path("data/file.csv"), "data/file.csv");
        assert_eq!(normalize_path("/"), "");
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("exports/abc"), "exports/abc/");
        assert_eq!(normalize_prefix("/exports/abc/"), "exports/abc/");
        assert_eq!(normalize_prefix(""), "");
    }
}
