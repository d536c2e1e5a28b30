//! In-memory connector and storage used by the unit tests.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::DriverError;
use crate::storage::{ObjectInfo, StorageConfig, StorageConnection, StorageParams, StorageType};
use crate::traits::{
    BackendKind, BoxedConnection, Connector, RawColumn, RawResult, Value, VendorConnection,
};

type Handler = dyn Fn(u64, &str) -> Result<RawResult, DriverError> + Send + Sync;

/// Build a raw result from `(name, vendor_type)` pairs and rows.
pub(crate) fn raw(columns: &[(&str, &str)], rows: Vec<Vec<Value>>) -> RawResult {
    RawResult {
        columns: columns
            .iter()
            .map(|(name, ty)| RawColumn::new(*name, *ty))
            .collect(),
        rows,
        rows_affected: None,
    }
}

#[derive(Default)]
struct MockState {
    opened: AtomicUsize,
    closed: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
    connect_failures: AtomicUsize,
    connect_delay: Mutex<Duration>,
    query_delay: Mutex<Duration>,
    script: Mutex<VecDeque<Result<RawResult, DriverError>>>,
    handler: Mutex<Option<Arc<Handler>>>,
    describe: Mutex<Option<Result<Vec<RawColumn>, DriverError>>>,
    executed: Mutex<Vec<(u64, String)>>,
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Connector whose connections answer from a script.
///
/// Clones share state, so a test can keep one handle and give another to the pool.
#[derive(Clone)]
pub(crate) struct MockConnector {
    backend: BackendKind,
    state: Arc<MockState>,
}

impl MockConnector {
    pub(crate) fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            state: Arc::new(MockState::default()),
        }
    }

    pub(crate) fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub(crate) fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn max_live(&self) -> usize {
        self.state.max_live.load(Ordering::SeqCst)
    }

    pub(crate) fn set_connect_delay(&self, delay: Duration) {
        *lock(&self.state.connect_delay) = delay;
    }

    pub(crate) fn set_query_delay(&self, delay: Duration) {
        *lock(&self.state.query_delay) = delay;
    }

    /// Make the next `n` connects fail with a connectivity error.
    pub(crate) fn fail_next_connects(&self, n: usize) {
        self.state.connect_failures.store(n, Ordering::SeqCst);
    }

    /// Queue a response; queued responses are used before the handler.
    pub(crate) fn push_response(&self, response: Result<RawResult, DriverError>) {
        lock(&self.state.script).push_back(response);
    }

    /// Answer every unscripted statement with `handler(connection_serial, sql)`.
    pub(crate) fn on_execute<F>(&self, handler: F)
    where
        F: Fn(u64, &str) -> Result<RawResult, DriverError> + Send + Sync + 'static,
    {
        *lock(&self.state.handler) = Some(Arc::new(handler));
    }

    pub(crate) fn set_describe(&self, response: Result<Vec<RawColumn>, DriverError>) {
        *lock(&self.state.describe) = Some(response);
    }

    /// Every executed statement with the serial of the connection that ran it.
    pub(crate) fn executed(&self) -> Vec<(u64, String)> {
        lock(&self.state.executed).clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn backend(&self) -> BackendKind {
        self.backend
    }

    async fn connect(&self) -> Result<BoxedConnection, DriverError> {
        let delay = *lock(&self.state.connect_delay);
        if !delay.is_zero() {
            smol::Timer::after(delay).await;
        }

        let fail = self
            .state
            .connect_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(DriverError::connectivity(self.backend, "connection refused", None));
        }

        let serial = self.state.opened.fetch_add(1, Ordering::SeqCst) as u64 + 1;
        let live = self.state.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_live.fetch_max(live, Ordering::SeqCst);

        Ok(Box::new(MockConnection {
            serial,
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockConnection {
    serial: u64,
    state: Arc<MockState>,
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.state.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl VendorConnection for MockConnection {
    async fn execute(&mut self, sql: &str) -> Result<RawResult, DriverError> {
        lock(&self.state.executed).push((self.serial, sql.to_string()));

        let delay = *lock(&self.state.query_delay);
        if !delay.is_zero() {
            smol::Timer::after(delay).await;
        }

        if let Some(response) = lock(&self.state.script).pop_front() {
            return response;
        }
        let handler = lock(&self.state.handler).clone();
        match handler {
            Some(handler) => handler(self.serial, sql),
            None => Ok(RawResult::default()),
        }
    }

    async fn describe(&mut self, sql: &str) -> Result<Vec<RawColumn>, DriverError> {
        lock(&self.state.executed).push((self.serial, format!("DESCRIBE {}", sql)));
        lock(&self.state.describe)
            .clone()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn ping(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), DriverError> {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Storage that pretends every listed prefix holds a fixed set of files.
pub(crate) struct MockStorage {
    config: StorageConfig,
    files: Vec<String>,
    connected: AtomicBool,
    fail_list: AtomicBool,
    fail_sign: AtomicBool,
    signed: AtomicU64,
    list_delay: Mutex<Duration>,
    deleted: Mutex<Vec<String>>,
    deleted_prefixes: Mutex<Vec<String>>,
}

impl MockStorage {
    pub(crate) fn new(storage_type: StorageType, files: &[&str]) -> Self {
        let params = match storage_type {
            StorageType::S3 => StorageParams::s3(
                None,
                "us-east-1".to_string(),
                "mock-bucket".to_string(),
                None,
                false,
            ),
            StorageType::Gcs => StorageParams::gcs("mock-bucket".to_string(), None),
            StorageType::LocalFs => StorageParams::local_fs(PathBuf::from("/tmp/mock-bucket")),
        };
        Self {
            config: StorageConfig::new("mock".to_string(), storage_type, params),
            files: files.iter().map(|f| f.to_string()).collect(),
            connected: AtomicBool::new(false),
            fail_list: AtomicBool::new(false),
            fail_sign: AtomicBool::new(false),
            signed: AtomicU64::new(0),
            list_delay: Mutex::new(Duration::ZERO),
            deleted: Mutex::new(Vec::new()),
            deleted_prefixes: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn fail_list(&self) {
        self.fail_list.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_sign(&self) {
        self.fail_sign.store(true, Ordering::SeqCst);
    }

    pub(crate) fn signed(&self) -> u64 {
        self.signed.load(Ordering::SeqCst)
    }

    pub(crate) fn deleted(&self) -> Vec<String> {
        lock(&self.deleted).clone()
    }

    pub(crate) fn deleted_prefixes(&self) -> Vec<String> {
        lock(&self.deleted_prefixes).clone()
    }

    pub(crate) fn set_list_delay(&self, delay: Duration) {
        *lock(&self.list_delay) = delay;
    }
}

#[async_trait]
impl StorageConnection for MockStorage {
    fn storage_type(&self) -> StorageType {
        self.config.storage_type
    }

    fn storage_config(&self) -> &StorageConfig {
        &self.config
    }

    async fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn list_recursive(&self, path: &str) -> Result<Vec<ObjectInfo>> {
        let delay = *lock(&self.list_delay);
        if !delay.is_zero() {
            smol::Timer::after(delay).await;
        }
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(anyhow!("access denied listing {}", path));
        }
        let prefix = path.trim_start_matches('/');
        Ok(self
            .files
            .iter()
            .map(|name| ObjectInfo::file(format!("{}{}", prefix, name), 128, None))
            .collect())
    }

    async fn delete_many(&self, paths: &[String]) -> Result<()> {
        lock(&self.deleted).extend(paths.iter().cloned());
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        lock(&self.deleted_prefixes).push(prefix.to_string());
        Ok(())
    }

    async fn presigned_url(&self, path: &str, ttl: Duration) -> Result<String> {
        if self.fail_sign.load(Ordering::SeqCst) {
            return Err(anyhow!("signing key unavailable"));
        }
        self.signed.fetch_add(1, Ordering::SeqCst);
        Ok(format!("https://signed.example/{}?ttl={}", path, ttl.as_secs()))
    }

    fn object_uri(&self, path: &str) -> String {
        format!(
            "{}://mock-bucket/{}",
            self.config.storage_type.scheme(),
            path.trim_start_matches('/')
        )
    }
}
