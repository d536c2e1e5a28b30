//! Bulk export: unload a query into object storage and sign the staged files.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::DriverError;
use crate::storage::{SharedStorageConnection, StorageParams, StorageType};
use crate::timeout::with_timeout;
use crate::traits::{BackendKind, ColumnDescriptor, ExportAuth, ExportConfig};

use super::capabilities::Dialect;
use super::executor::{Executor, QueryOptions};

/// Where and how the warehouse writes an export.
#[derive(Debug, Clone)]
pub struct StagingTarget<'a> {
    /// Prefix URI as the warehouse addresses it, e.g. `s3://bucket/exports/<id>/`
    pub location: String,
    pub storage_type: StorageType,
    pub region: Option<&'a str>,
    pub auth: &'a ExportAuth,
}

/// One staged file and the URL that reads it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedFile {
    pub path: String,
    pub url: String,
}

/// Time-limited pointer to an export staged in object storage
#[derive(Debug, Clone, Serialize)]
pub struct ExportReference {
    pub backend: BackendKind,
    /// Staging prefix URI
    pub location: String,
    pub files: Vec<SignedFile>,
    /// After this instant the signed URLs stop working
    pub expires_at: DateTime<Utc>,
    pub columns: Vec<ColumnDescriptor>,
}

/// Export bucket plus the storage connection that lists and signs it
#[derive(Clone)]
pub(crate) struct Staging {
    pub(crate) config: ExportConfig,
    pub(crate) storage: SharedStorageConnection,
}

#[derive(Clone)]
pub struct Exporter {
    executor: Executor,
    dialect: Dialect,
    backend: BackendKind,
    supports_export: bool,
    staging: Option<Staging>,
}

impl std::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter")
            .field("backend", &self.backend)
            .field("supports_export", &self.supports_export)
            .field(
                "bucket",
                &self.staging.as_ref().map(|s| s.config.storage.name.as_str()),
            )
            .finish()
    }
}

impl Exporter {
    pub(crate) fn new(
        executor: Executor,
        backend: BackendKind,
        supports_export: bool,
        staging: Option<Staging>,
    ) -> Self {
        Self {
            executor,
            dialect: Dialect::for_backend(backend),
            backend,
            supports_export,
            staging,
        }
    }

    fn unsupported(&self, reason: impl Into<String>) -> DriverError {
        DriverError::ExportUnsupported {
            backend: self.backend,
            reason: reason.into(),
        }
    }

    /// Stage the result of `sql` in the export bucket and sign every file.
    ///
    /// The timeout in `options` covers the whole export: describe, unload,
    /// listing and signing share one deadline.
    ///
    /// # Arguments
    ///
    /// * `sql` - A read-only query
    /// * `options` - Budget for the export as a whole
    ///
    /// # Errors
    ///
    /// `ExportUnsupported` when the backend cannot unload or no bucket is
    /// configured, `SyntaxError` when the query itself is rejected,
    /// `StorageError` when staging, listing or signing fails, and `Timeout`
    /// when the budget runs out.
    pub async fn export(
        &self,
        sql: &str,
        options: QueryOptions,
    ) -> Result<ExportReference, DriverError> {
        if !self.supports_export {
            return Err(self.unsupported(format!(
                "{} cannot unload query results to object storage",
                self.backend
            )));
        }
        let staging = self
            .staging
            .as_ref()
            .ok_or_else(|| self.unsupported("no export bucket is configured"))?;

        let budget = Budget::new(self.executor.statement_timeout(options));

        // Column shape first, so a bad query fails as SyntaxError before anything is staged
        let columns = self.executor.describe(sql, budget.remaining()).await?;

        let prefix = export_prefix(&staging.config.prefix, &uuid::Uuid::new_v4().to_string());
        let location = staging.storage.object_uri(&prefix);
        let region = match &staging.config.storage.params {
            StorageParams::S3 { region, .. } => Some(region.as_str()),
            _ => None,
        };
        let redacted_auth = staging.config.auth.redacted();
        let target = StagingTarget {
            location: location.clone(),
            storage_type: staging.storage.storage_type(),
            region,
            auth: &staging.config.auth,
        };
        let shown_target = StagingTarget {
            auth: &redacted_auth,
            ..target.clone()
        };

        let statement = self
            .dialect
            .staging_statement(sql, &target)
            .map_err(|reason| self.unsupported(reason))?;
        let shown_statement = self
            .dialect
            .staging_statement(sql, &shown_target)
            .map_err(|reason| self.unsupported(reason))?;

        tracing::info!(
            backend = %self.backend,
            location = %location,
            "Unloading query result"
        );
        self.executor
            .query(&statement, budget.remaining())
            .await
            .map_err(|err| {
                self.staging_error(err.redacted(&shown_statement, staging.config.auth.secret()))
            })?;

        let files = self.sign_staged(staging, &prefix, &budget).await?;
        let ttl = Duration::from_secs(staging.config.url_ttl_secs);
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(0));

        tracing::info!(
            backend = %self.backend,
            location = %location,
            files = files.len(),
            expires_at = %expires_at,
            "Export ready"
        );

        Ok(ExportReference {
            backend: self.backend,
            location,
            files,
            expires_at,
            columns,
        })
    }

    /// A rejected unload statement is a staging failure, not a query error:
    /// the query itself already passed describe.
    fn staging_error(&self, err: DriverError) -> DriverError {
        match err {
            DriverError::SyntaxError { message, .. } => DriverError::StorageError {
                backend: self.backend,
                message: format!("unload rejected: {}", message),
            },
            other => other,
        }
    }

    /// Run one storage call within what is left of the export budget.
    async fn storage_call<T, F>(
        &self,
        budget: &Budget,
        what: &str,
        fut: F,
    ) -> Result<T, DriverError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match with_timeout(budget.left(), fut).await {
            Some(result) => {
                result.map_err(|e| DriverError::storage(self.backend, e.context(what.to_string())))
            }
            None => Err(DriverError::timeout(self.backend, budget.total, what)),
        }
    }

    /// Best-effort removal of staged data nobody can reach.
    async fn discard_staged(&self, storage: &SharedStorageConnection, cleanup: Cleanup<'_>) {
        let result = match cleanup {
            Cleanup::Files(paths) => with_timeout(CLEANUP_TIMEOUT, storage.delete_many(paths)).await,
            Cleanup::Prefix(prefix) => with_timeout(CLEANUP_TIMEOUT, storage.delete_prefix(prefix)).await,
        };
        match result {
            Some(Ok(())) => {}
            Some(Err(e)) => tracing::warn!(
                backend = %self.backend,
                "Failed to clean up staged files: {:#}",
                e
            ),
            None => tracing::warn!(backend = %self.backend, "Timed out cleaning up staged files"),
        }
    }

    async fn sign_staged(
        &self,
        staging: &Staging,
        prefix: &str,
        budget: &Budget,
    ) -> Result<Vec<SignedFile>, DriverError> {
        let storage = &staging.storage;
        if !storage.is_connected().await {
            self.storage_call(budget, "connecting to the export bucket", storage.connect())
                .await?;
        }

        let listing = format!("listing {}", prefix);
        let objects = match self
            .storage_call(budget, &listing, storage.list_recursive(prefix))
            .await
        {
            Ok(objects) => objects,
            Err(err) => {
                self.discard_staged(storage, Cleanup::Prefix(prefix)).await;
                return Err(err);
            }
        };
        tracing::info!(backend = %self.backend, files = objects.len(), "Listed staged files");

        let ttl = Duration::from_secs(staging.config.url_ttl_secs);
        let mut files = Vec::with_capacity(objects.len());
        for object in &objects {
            let signing = format!("signing {}", object.path);
            match self
                .storage_call(budget, &signing, storage.presigned_url(&object.path, ttl))
                .await
            {
                Ok(url) => files.push(SignedFile {
                    path: object.path.clone(),
                    url,
                }),
                Err(err) => {
                    let paths: Vec<String> = objects.iter().map(|o| o.path.clone()).collect();
                    self.discard_staged(storage, Cleanup::Files(&paths)).await;
                    return Err(err);
                }
            }
        }
        Ok(files)
    }
}

/// Upper bound on removing staged files after a failure, independent of the
/// export budget, which may already be spent.
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);

enum Cleanup<'a> {
    Files(&'a [String]),
    Prefix(&'a str),
}

/// One deadline shared by every step of an export.
struct Budget {
    total: Duration,
    deadline: Instant,
}

impl Budget {
    fn new(total: Duration) -> Self {
        Self {
            total,
            deadline: Instant::now() + total,
        }
    }

    fn left(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    fn remaining(&self) -> QueryOptions {
        QueryOptions::with_timeout(self.left())
    }
}

/// `<prefix>/<id>/` with no leading slash; just `<id>/` for an empty prefix.
fn export_prefix(prefix: &str, id: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{}/", id)
    } else {
        format!("{}/{}/", prefix, id)
    }
}
