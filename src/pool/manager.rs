//! Bounded async connection pool.
//!
//! The pool owns a bounded channel holding exactly `max_size` slot tokens. A
//! token is either an idle connection or an empty slot that may be filled by
//! opening a new connection. Taking a token is the only way to get a
//! connection, so the channel capacity is the hard bound on live connections.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::DriverError;
use crate::timeout::with_timeout;
use crate::traits::{BackendKind, BoxedConnection, Connector, VendorConnection};

use super::options::PoolOptions;

/// Upper bound on a graceful vendor close before the socket is just dropped.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// A live vendor connection with its pool bookkeeping
pub struct IdleEntry {
    /// Unique within the pool for its whole lifetime; never reused
    pub id: u64,
    pub(crate) conn: BoxedConnection,
    pub last_used: Instant,
}

impl std::fmt::Debug for IdleEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdleEntry")
            .field("id", &self.id)
            .field("last_used", &self.last_used)
            .finish_non_exhaustive()
    }
}

enum Slot {
    Idle(IdleEntry),
    Empty,
}

#[derive(Debug, Default)]
struct PoolState {
    closed: bool,
    live: usize,
    in_use: usize,
    next_id: u64,
}

/// Point-in-time view of the pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub max_size: usize,
    pub live: usize,
    pub idle: usize,
    pub in_use: usize,
    pub closed: bool,
}

/// What a call to `shutdown` did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShutdownOutcome {
    /// The pool was already closed; nothing was done
    pub already_closed: bool,
    /// Idle or returned connections that were closed
    pub closed_connections: usize,
    /// In-use connections still out when the grace period ran out
    pub abandoned: usize,
}

struct PoolInner {
    backend: BackendKind,
    connector: Arc<dyn Connector>,
    options: PoolOptions,
    slots_tx: async_channel::Sender<Slot>,
    slots_rx: async_channel::Receiver<Slot>,
    state: Mutex<PoolState>,
}

impl PoolInner {
    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Put a token back. Fails only once the channel has been closed by shutdown.
    fn return_slot(&self, slot: Slot) {
        if let Err(err) = self.slots_tx.try_send(slot) {
            if let Slot::Idle(entry) = err.into_inner() {
                self.forget(entry.id, false);
            }
        }
    }

    /// Account for a connection that is going away without a graceful close.
    fn forget(&self, id: u64, was_in_use: bool) {
        let mut state = self.state();
        state.live = state.live.saturating_sub(1);
        if was_in_use {
            state.in_use = state.in_use.saturating_sub(1);
        }
        tracing::debug!(backend = %self.backend, connection_id = id, "Dropped pooled connection");
    }

    async fn close_connection(&self, conn: BoxedConnection, id: u64) {
        match with_timeout(CLOSE_TIMEOUT, conn.close()).await {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                tracing::debug!(backend = %self.backend, connection_id = id, "Close failed: {}", e)
            }
            None => tracing::debug!(backend = %self.backend, connection_id = id, "Close timed out"),
        }
    }
}

/// Returns an empty slot to the pool unless disarmed.
///
/// Held while `acquire` owns a token, so a cancelled acquire never leaks capacity.
struct SlotReservation {
    inner: Arc<PoolInner>,
    armed: bool,
}

impl SlotReservation {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SlotReservation {
    fn drop(&mut self) {
        if self.armed {
            self.inner.return_slot(Slot::Empty);
        }
    }
}

/// A connection checked out of the pool.
///
/// Hand it back with `ConnectionManager::release`. Dropping it instead is
/// treated as cancellation: the connection is discarded and its slot freed.
pub struct PooledConnection {
    entry: Option<IdleEntry>,
    failed: bool,
    inner: Arc<PoolInner>,
}

impl PooledConnection {
    /// Pool-unique id of the underlying connection
    pub fn id(&self) -> u64 {
        self.entry.as_ref().map(|e| e.id).unwrap_or_default()
    }

    /// Mark the connection as unusable so `release` closes it instead of recycling it.
    pub fn mark_failed(&mut self) {
        self.failed = true;
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Get mutable access to the underlying vendor connection.
    pub fn connection(&mut self) -> Result<&mut (dyn VendorConnection + 'static), DriverError> {
        let backend = self.inner.backend;
        self.entry
            .as_mut()
            .map(|e| e.conn.as_mut())
            .ok_or(DriverError::Closed { backend })
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id())
            .field("failed", &self.failed)
            .finish()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            // Dropping the boxed connection tears down the socket
            let id = entry.id;
            drop(entry);
            self.inner.forget(id, true);
            self.inner.return_slot(Slot::Empty);
        }
    }
}

/// Connection manager for one driver.
///
/// Cheap to clone; clones share the same pool.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("backend", &self.inner.backend)
            .field("options", &self.inner.options)
            .field("status", &self.status())
            .finish()
    }
}

impl ConnectionManager {
    /// Create a pool. No connection is opened until the first `acquire`.
    pub fn new(connector: Arc<dyn Connector>, options: PoolOptions) -> Result<Self, DriverError> {
        options.validate().map_err(DriverError::Config)?;

        let (slots_tx, slots_rx) = async_channel::bounded(options.max_size);
        for _ in 0..options.max_size {
            slots_tx
                .try_send(Slot::Empty)
                .map_err(|_| DriverError::Config("failed to seed pool slots".to_string()))?;
        }

        Ok(Self {
            inner: Arc::new(PoolInner {
                backend: connector.backend(),
                connector,
                options,
                slots_tx,
                slots_rx,
                state: Mutex::new(PoolState::default()),
            }),
        })
    }

    pub fn backend(&self) -> BackendKind {
        self.inner.backend
    }

    pub fn options(&self) -> &PoolOptions {
        &self.inner.options
    }

    /// Check out a connection, opening one lazily if a slot is empty.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Upper bound on waiting for a slot and opening the connection
    ///
    /// # Errors
    ///
    /// `PoolExhausted` when no slot frees up in time, `Closed` after shutdown,
    /// `ConnectivityError` when a new connection cannot be opened.
    pub async fn acquire(&self, timeout: Duration) -> Result<PooledConnection, DriverError> {
        let inner = &self.inner;
        let backend = inner.backend;
        let started = Instant::now();

        if inner.is_closed() {
            return Err(DriverError::Closed { backend });
        }

        let slot = match with_timeout(timeout, inner.slots_rx.recv()).await {
            Some(Ok(slot)) => slot,
            Some(Err(_)) => return Err(DriverError::Closed { backend }),
            None => {
                tracing::debug!(
                    backend = %backend,
                    max_size = inner.options.max_size,
                    "Timed out waiting for a pooled connection"
                );
                return Err(DriverError::PoolExhausted {
                    backend,
                    max_size: inner.options.max_size,
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
        };

        if inner.is_closed() {
            inner.return_slot(slot);
            return Err(DriverError::Closed { backend });
        }

        let reservation = SlotReservation {
            inner: Arc::clone(inner),
            armed: true,
        };

        if let Slot::Idle(mut entry) = slot {
            let expired = inner
                .options
                .idle_ttl()
                .is_some_and(|ttl| entry.last_used.elapsed() > ttl);

            if !expired {
                inner.state().in_use += 1;
                reservation.disarm();
                entry.last_used = Instant::now();
                tracing::debug!(backend = %backend, connection_id = entry.id, "Reusing pooled connection");
                return Ok(PooledConnection {
                    entry: Some(entry),
                    failed: false,
                    inner: Arc::clone(inner),
                });
            }

            tracing::debug!(backend = %backend, connection_id = entry.id, "Evicting idle connection");
            {
                let mut state = inner.state();
                state.live = state.live.saturating_sub(1);
            }
            inner.close_connection(entry.conn, entry.id).await;
        }

        let remaining = timeout.saturating_sub(started.elapsed());
        let conn = match with_timeout(remaining, inner.connector.connect()).await {
            Some(result) => result?,
            None => {
                return Err(DriverError::connectivity(
                    backend,
                    format!("timed out after {}ms opening a connection", timeout.as_millis()),
                    None,
                ));
            }
        };

        // Shutdown may have finished while the connect was in flight
        let id = {
            let mut state = inner.state();
            if state.closed {
                None
            } else {
                state.live += 1;
                state.in_use += 1;
                state.next_id += 1;
                Some(state.next_id)
            }
        };
        let Some(id) = id else {
            tracing::debug!(backend = %backend, "Pool closed while connecting, discarding new connection");
            drop(reservation);
            inner.close_connection(conn, 0).await;
            return Err(DriverError::Closed { backend });
        };
        reservation.disarm();
        tracing::debug!(backend = %backend, connection_id = id, "Opened pooled connection");

        Ok(PooledConnection {
            entry: Some(IdleEntry {
                id,
                conn,
                last_used: Instant::now(),
            }),
            failed: false,
            inner: Arc::clone(inner),
        })
    }

    /// Return a connection to the pool.
    ///
    /// Failed connections, and any connection returned after shutdown started,
    /// are closed; their slot becomes empty and is refilled lazily.
    pub async fn release(&self, mut pooled: PooledConnection) {
        let inner = &self.inner;
        let Some(mut entry) = pooled.entry.take() else {
            return;
        };

        let discard = pooled.failed || inner.is_closed();
        if !discard {
            inner.state().in_use -= 1;
            entry.last_used = Instant::now();
            tracing::debug!(backend = %inner.backend, connection_id = entry.id, "Released connection");
            inner.return_slot(Slot::Idle(entry));
            return;
        }

        tracing::debug!(
            backend = %inner.backend,
            connection_id = entry.id,
            failed = pooled.failed,
            "Discarding connection"
        );
        {
            let mut state = inner.state();
            state.live = state.live.saturating_sub(1);
            state.in_use = state.in_use.saturating_sub(1);
        }
        // Free the slot before the close so waiters are not held up by a dead socket
        inner.return_slot(Slot::Empty);
        inner.close_connection(entry.conn, entry.id).await;
    }

    /// Drain and close the pool.
    ///
    /// Waits up to `grace` for in-use connections to be released, then closes
    /// every idle connection. Later and still-waiting `acquire` calls fail with
    /// `Closed`. Calling it again is a no-op.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownOutcome {
        let inner = &self.inner;
        {
            let mut state = inner.state();
            if state.closed {
                return ShutdownOutcome {
                    already_closed: true,
                    ..Default::default()
                };
            }
            state.closed = true;
        }
        tracing::info!(backend = %inner.backend, "Shutting down connection pool");

        let deadline = Instant::now() + grace;
        let mut collected = 0;
        let mut closed_connections = 0;

        while collected < inner.options.max_size {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match with_timeout(remaining, inner.slots_rx.recv()).await {
                Some(Ok(Slot::Idle(entry))) => {
                    {
                        let mut state = inner.state();
                        state.live = state.live.saturating_sub(1);
                    }
                    inner.close_connection(entry.conn, entry.id).await;
                    closed_connections += 1;
                    collected += 1;
                }
                Some(Ok(Slot::Empty)) => collected += 1,
                Some(Err(_)) | None => break,
            }
        }

        inner.slots_tx.close();

        let abandoned = inner.options.max_size - collected;
        if abandoned > 0 {
            tracing::warn!(
                backend = %inner.backend,
                abandoned,
                "Shutdown grace elapsed with connections still in use"
            );
        }

        ShutdownOutcome {
            already_closed: false,
            closed_connections,
            abandoned,
        }
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state();
        PoolStatus {
            max_size: self.inner.options.max_size,
            live: state.live,
            idle: state.live.saturating_sub(state.in_use),
            in_use: state.in_use,
            closed: state.closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::mock::MockConnector;
    use futures::future::join_all;

    fn pool(max_size: usize) -> (ConnectionManager, MockConnector) {
        let connector = MockConnector::new(BackendKind::Redshift);
        let options = PoolOptions::default()
            .with_max_size(max_size)
            .with_acquire_timeout_ms(1_000);
        let manager = ConnectionManager::new(Arc::new(connector.clone()), options).unwrap();
        (manager, connector)
    }

    #[test]
    fn test_never_exceeds_max_size() {
        smol::block_on(async {
            let (manager, connector) = pool(3);

            let mut held = Vec::new();
            for _ in 0..3 {
                held.push(manager.acquire(Duration::from_millis(100)).await.unwrap());
            }

            let err = manager.acquire(Duration::from_millis(50)).await.unwrap_err();
            assert!(matches!(err, DriverError::PoolExhausted { max_size: 3, .. }));
            assert_eq!(connector.opened(), 3);
            assert_eq!(manager.status().live, 3);

            for conn in held {
                manager.release(conn).await;
            }
            assert_eq!(manager.status().in_use, 0);
            assert_eq!(manager.status().idle, 3);
        });
    }

    #[test]
    fn test_concurrent_acquires_respect_bound() {
        smol::block_on(async {
            let (manager, connector) = pool(2);

            let tasks = (0..8).map(|_| {
                let manager = manager.clone();
                async move {
                    let conn = manager.acquire(Duration::from_secs(5)).await.unwrap();
                    smol::Timer::after(Duration::from_millis(5)).await;
                    manager.release(conn).await;
                }
            });
            join_all(tasks).await;

            assert!(connector.max_live() <= 2);
            assert!(connector.opened() <= 2);
        });
    }

    #[test]
    fn test_single_slot_blocks_until_release() {
        smol::block_on(async {
            let (manager, _) = pool(1);
            let first = manager.acquire(Duration::from_millis(100)).await.unwrap();
            let first_id = first.id();

            let waiter = {
                let manager = manager.clone();
                smol::spawn(async move { manager.acquire(Duration::from_secs(5)).await })
            };

            smol::Timer::after(Duration::from_millis(30)).await;
            assert_eq!(manager.status().in_use, 1);
            manager.release(first).await;

            let second = waiter.await.unwrap();
            assert_eq!(second.id(), first_id);
            manager.release(second).await;
        });
    }

    #[test]
    fn test_failed_connection_is_not_reused() {
        smol::block_on(async {
            let (manager, connector) = pool(1);

            let mut conn = manager.acquire(Duration::from_millis(100)).await.unwrap();
            let failed_id = conn.id();
            conn.mark_failed();
            manager.release(conn).await;
            assert_eq!(connector.closed(), 1);
            assert_eq!(manager.status().live, 0);

            let next = manager.acquire(Duration::from_millis(100)).await.unwrap();
            assert_ne!(next.id(), failed_id);
            assert_eq!(connector.opened(), 2);
            manager.release(next).await;
        });
    }

    #[test]
    fn test_dropped_connection_frees_its_slot() {
        smol::block_on(async {
            let (manager, connector) = pool(1);

            let conn = manager.acquire(Duration::from_millis(100)).await.unwrap();
            let dropped_id = conn.id();
            drop(conn);
            assert_eq!(manager.status().live, 0);

            let next = manager.acquire(Duration::from_millis(100)).await.unwrap();
            assert_ne!(next.id(), dropped_id);
            assert_eq!(connector.opened(), 2);
            manager.release(next).await;
        });
    }

    #[test]
    fn test_cancelled_acquire_does_not_leak_slot() {
        smol::block_on(async {
            let (manager, connector) = pool(1);
            connector.set_connect_delay(Duration::from_millis(200));

            // Deadline fires while the connector is still opening
            let cancelled = with_timeout(Duration::from_millis(20), manager.acquire(Duration::from_secs(5))).await;
            assert!(cancelled.is_none());

            connector.set_connect_delay(Duration::ZERO);
            let conn = manager.acquire(Duration::from_millis(100)).await.unwrap();
            manager.release(conn).await;
        });
    }

    #[test]
    fn test_idle_connections_expire() {
        smol::block_on(async {
            let connector = MockConnector::new(BackendKind::Snowflake);
            let options = PoolOptions::default()
                .with_max_size(1)
                .with_idle_ttl_ms(10);
            let manager = ConnectionManager::new(Arc::new(connector.clone()), options).unwrap();

            let conn = manager.acquire(Duration::from_millis(100)).await.unwrap();
            let old_id = conn.id();
            manager.release(conn).await;

            smol::Timer::after(Duration::from_millis(30)).await;
            let conn = manager.acquire(Duration::from_millis(100)).await.unwrap();
            assert_ne!(conn.id(), old_id);
            assert_eq!(connector.closed(), 1);
            manager.release(conn).await;
        });
    }

    #[test]
    fn test_connect_failure_returns_slot() {
        smol::block_on(async {
            let (manager, connector) = pool(1);
            connector.fail_next_connects(1);

            let err = manager.acquire(Duration::from_millis(100)).await.unwrap_err();
            assert!(err.is_retryable());

            let conn = manager.acquire(Duration::from_millis(100)).await.unwrap();
            manager.release(conn).await;
        });
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        smol::block_on(async {
            let (manager, connector) = pool(2);
            let conn = manager.acquire(Duration::from_millis(100)).await.unwrap();
            manager.release(conn).await;

            let first = manager.shutdown(Duration::from_millis(100)).await;
            assert!(!first.already_closed);
            assert_eq!(first.closed_connections, 1);
            assert_eq!(first.abandoned, 0);
            assert_eq!(connector.closed(), 1);

            let second = manager.shutdown(Duration::from_millis(100)).await;
            assert!(second.already_closed);
            assert!(manager.status().closed);

            let err = manager.acquire(Duration::from_millis(50)).await.unwrap_err();
            assert!(matches!(err, DriverError::Closed { .. }));
        });
    }

    #[test]
    fn test_shutdown_waits_for_in_use_connections() {
        smol::block_on(async {
            let (manager, connector) = pool(1);
            let conn = manager.acquire(Duration::from_millis(100)).await.unwrap();

            let releaser = {
                let manager = manager.clone();
                smol::spawn(async move {
                    smol::Timer::after(Duration::from_millis(30)).await;
                    manager.release(conn).await;
                })
            };

            let outcome = manager.shutdown(Duration::from_secs(5)).await;
            releaser.await;
            assert_eq!(outcome.abandoned, 0);
            assert_eq!(connector.closed(), 1);
            assert_eq!(manager.status().live, 0);
        });
    }

    #[test]
    fn test_waiters_fail_with_closed_after_shutdown() {
        smol::block_on(async {
            let (manager, _) = pool(1);
            let held = manager.acquire(Duration::from_millis(100)).await.unwrap();

            let waiter = {
                let manager = manager.clone();
                smol::spawn(async move { manager.acquire(Duration::from_secs(5)).await })
            };
            smol::Timer::after(Duration::from_millis(20)).await;

            let outcome = manager.shutdown(Duration::from_millis(20)).await;
            assert_eq!(outcome.abandoned, 1);

            let err = waiter.await.unwrap_err();
            assert!(matches!(err, DriverError::Closed { .. }));

            // Late release after shutdown closes instead of recycling
            manager.release(held).await;
            assert_eq!(manager.status().live, 0);
        });
    }

    #[test]
    fn test_connect_finishing_after_shutdown_is_discarded() {
        smol::block_on(async {
            let (manager, connector) = pool(1);
            connector.set_connect_delay(Duration::from_millis(100));

            let acquiring = {
                let manager = manager.clone();
                smol::spawn(async move { manager.acquire(Duration::from_secs(1)).await })
            };
            smol::Timer::after(Duration::from_millis(20)).await;

            let outcome = manager.shutdown(Duration::from_millis(500)).await;
            let err = acquiring.await.unwrap_err();

            assert!(matches!(err, DriverError::Closed { .. }));
            assert_eq!(outcome.abandoned, 0);
            assert_eq!(connector.opened(), 1);
            assert_eq!(connector.closed(), 1);
            assert_eq!(manager.status().live, 0);
            assert_eq!(manager.status().in_use, 0);
        });
    }
}
