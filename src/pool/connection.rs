//! Bounded idle-connection pool over a dynamic target set
//!
//! The pool never blocks a caller waiting for capacity:
//! - `acquire` reuses an idle connection or dials a new one on a miss
//! - `release` stores the connection or closes it when the store is full
//! - `max_cap` bounds idle connections only, not connections checked out

use crossbeam::queue::ArrayQueue;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::connector::Connector;
use super::error::PoolError;
use super::idle::{ExpiryPolicy, PooledConn};
use crate::config::{PoolConfig, TimeoutType};
use crate::lb::{target_feed, TargetFeed, TargetSet};

type IdleStore<T> = Arc<ArrayQueue<PooledConn<T>>>;

/// Snapshot of pool counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Connections currently idle in the pool
    pub idle: usize,

    /// Idle store capacity
    pub max_idle: usize,

    /// Total connections dialed
    pub created: u64,

    /// Total idle connections handed out again
    pub reused: u64,

    /// Connections dropped on acquire because they aged out
    pub expired: u64,

    /// Connections closed on release because the pool was full
    pub discarded: u64,

    /// Whether the pool has been closed
    pub closed: bool,
}

#[derive(Debug, Default)]
struct Counters {
    created: AtomicU64,
    reused: AtomicU64,
    expired: AtomicU64,
    discarded: AtomicU64,
}

/// Client-side connection pool
pub struct Pool<C: Connector> {
    /// Idle store; `None` once the pool is closed
    idle: Mutex<Option<IdleStore<C::Connection>>>,

    /// Capacity of the idle store
    max_cap: usize,

    /// Dial and close callbacks
    connector: Arc<C>,

    /// Backend addresses dialed on a miss
    targets: Arc<TargetSet>,

    /// Sender side of the target update feed
    feed: TargetFeed,

    /// Background task applying target updates
    listener: Mutex<Option<JoinHandle<()>>>,

    policy: ExpiryPolicy,
    dial_timeout: Duration,
    counters: Counters,
}

impl<C: Connector> Pool<C> {
    /// Create a pool and dial `init_cap` connections up front
    ///
    /// Must be called within a tokio runtime. If any initial dial fails the
    /// connections opened so far are closed and the error is returned.
    pub async fn new(config: PoolConfig, connector: C) -> Result<Self, PoolError> {
        config.validate()?;

        let targets = Arc::new(TargetSet::new(config.init_targets));
        let (feed, rx) = target_feed();
        let listener = Arc::clone(&targets).spawn_listener(rx);

        let pool = Self {
            idle: Mutex::new(Some(Arc::new(ArrayQueue::new(config.max_cap)))),
            max_cap: config.max_cap,
            connector: Arc::new(connector),
            targets,
            feed,
            listener: Mutex::new(Some(listener)),
            policy: ExpiryPolicy::new(config.timeout_type, config.idle_timeout),
            dial_timeout: config.dial_timeout,
            counters: Counters::default(),
        };

        let store = pool.store().ok_or(PoolError::PoolClosed)?;
        for _ in 0..config.init_cap {
            match pool.dial().await {
                Ok(conn) => {
                    // init_cap <= max_cap, so the store has room
                    if let Err(conn) = store.push(conn) {
                        pool.close_conn(conn, "overflow").await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Initial dial failed, closing pool");
                    pool.close().await;
                    return Err(e);
                }
            }
        }

        info!(
            idle = store.len(),
            max_idle = pool.max_cap,
            targets = pool.targets.len(),
            timeout_type = ?pool.policy.kind,
            "Connection pool ready"
        );

        Ok(pool)
    }

    /// Get a connection, reusing an idle one when possible
    ///
    /// Idle connections that aged out are closed and skipped. When the store
    /// is empty a new connection is dialed; that never waits on other callers.
    pub async fn acquire(&self) -> Result<PooledConn<C::Connection>, PoolError> {
        let store = self.store().ok_or(PoolError::PoolClosed)?;

        while let Some(conn) = store.pop() {
            if self.policy.is_expired(&conn, Instant::now()) {
                self.counters.expired.fetch_add(1, Ordering::Relaxed);
                debug!(age = ?conn.age(), "Discarding expired connection");
                self.close_conn(conn, "expired").await;
                continue;
            }

            self.counters.reused.fetch_add(1, Ordering::Relaxed);
            debug!(idle = store.len(), "Reusing idle connection");
            return Ok(conn);
        }

        self.dial().await
    }

    /// Return a connection to the pool
    ///
    /// The connection is closed instead of stored when the pool is full or
    /// already closed. Empty handles are rejected.
    pub async fn release(&self, mut conn: PooledConn<C::Connection>) -> Result<(), PoolError> {
        if conn.is_empty() {
            return Err(PoolError::InvalidConnection);
        }

        self.policy.on_release(&mut conn);

        // Push under the lock so `close` cannot drain before a racing push lands
        let rejected = {
            let guard = self.idle.lock().unwrap_or_else(|e| e.into_inner());
            match guard.as_ref() {
                Some(store) => store.push(conn).err().map(|conn| (conn, false)),
                None => Some((conn, true)),
            }
        };

        match rejected {
            None => Ok(()),
            Some((conn, true)) => {
                debug!("Pool closed, closing released connection");
                self.close_conn(conn, "pool closed").await;
                Ok(())
            }
            Some((conn, false)) => {
                self.counters.discarded.fetch_add(1, Ordering::Relaxed);
                debug!(max_idle = self.max_cap, "Pool full, closing released connection");
                self.close_conn(conn, "pool full").await;
                Ok(())
            }
        }
    }

    /// Close the pool and every idle connection
    ///
    /// Safe to call more than once. Afterwards `acquire` fails with
    /// [`PoolError::PoolClosed`] and `release` closes its argument.
    pub async fn close(&self) {
        let store = self.idle.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(store) = store else {
            return;
        };

        if let Some(listener) = self.listener.lock().unwrap_or_else(|e| e.into_inner()).take() {
            listener.abort();
        }

        let mut closed = 0usize;
        while let Some(conn) = store.pop() {
            self.close_conn(conn, "pool closed").await;
            closed += 1;
        }

        info!(closed, "Connection pool closed");
    }

    /// Number of idle connections right now
    pub fn idle_count(&self) -> usize {
        self.store().map(|s| s.len()).unwrap_or(0)
    }

    /// Snapshot of the pool counters
    pub fn stats(&self) -> PoolStats {
        let store = self.store();
        PoolStats {
            idle: store.as_ref().map(|s| s.len()).unwrap_or(0),
            max_idle: self.max_cap,
            created: self.counters.created.load(Ordering::Relaxed),
            reused: self.counters.reused.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
            closed: store.is_none(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.store().is_none()
    }

    /// Targets dialed on a cache miss
    pub fn targets(&self) -> &Arc<TargetSet> {
        &self.targets
    }

    /// Feed for replacing the target list while the pool runs
    pub fn target_feed(&self) -> TargetFeed {
        self.feed.clone()
    }

    pub fn timeout_type(&self) -> TimeoutType {
        self.policy.kind
    }

    pub fn idle_timeout(&self) -> Duration {
        self.policy.timeout
    }

    fn store(&self) -> Option<IdleStore<C::Connection>> {
        self.idle.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Pick a target and dial it within the dial timeout
    async fn dial(&self) -> Result<PooledConn<C::Connection>, PoolError> {
        let target = self.targets.pick().ok_or(PoolError::NoTargetsAvailable)?;

        let conn = tokio::time::timeout(self.dial_timeout, self.connector.connect(&target))
            .await
            .map_err(|_| PoolError::DialTimeout(self.dial_timeout))??;

        let created = self.counters.created.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(target = %target, total_created = created, "Created new connection");

        Ok(PooledConn::fresh(conn, &self.policy))
    }

    /// Close an evicted connection; failures are logged, not returned
    async fn close_conn(&self, conn: PooledConn<C::Connection>, reason: &'static str) {
        if let Some(inner) = conn.into_inner() {
            if let Err(e) = self.connector.close(inner).await {
                warn!(reason, error = %e, "Failed to close connection");
            }
        }
    }
}

impl<C: Connector> Drop for Pool<C> {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().unwrap_or_else(|e| e.into_inner()).take() {
            listener.abort();
        }
    }
}

impl<C: Connector> std::fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("idle", &self.idle_count())
            .field("max_cap", &self.max_cap)
            .field("targets", &self.targets)
            .field("policy", &self.policy)
            .field("dial_timeout", &self.dial_timeout)
            .finish()
    }
}
