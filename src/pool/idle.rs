//! Pooled connection handle and the age-based expiry policy

use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::TimeoutType;

/// A connection handed out by (or stored in) the pool
///
/// The stamp means "last became idle" under [`TimeoutType::Idle`] and
/// "effective birth time" under [`TimeoutType::Fixed`].
#[derive(Debug)]
pub struct PooledConn<C> {
    conn: Option<C>,
    stamp: Instant,
}

impl<C> PooledConn<C> {
    /// Wrap a freshly dialed connection, stamped according to `policy`
    pub(crate) fn fresh(conn: C, policy: &ExpiryPolicy) -> Self {
        Self {
            conn: Some(conn),
            stamp: policy.birth_stamp(Instant::now()),
        }
    }

    /// Borrow the underlying connection
    pub fn get(&self) -> Option<&C> {
        self.conn.as_ref()
    }

    /// Mutably borrow the underlying connection
    pub fn get_mut(&mut self) -> Option<&mut C> {
        self.conn.as_mut()
    }

    /// Take the connection out, leaving an empty handle
    ///
    /// An empty handle is rejected by `Pool::release`.
    pub fn take(&mut self) -> Option<C> {
        self.conn.take()
    }

    pub fn is_empty(&self) -> bool {
        self.conn.is_none()
    }

    /// Time since the reference stamp
    pub fn age(&self) -> Duration {
        self.stamp.elapsed()
    }

    pub(crate) fn into_inner(self) -> Option<C> {
        self.conn
    }
}

/// Eviction policy chosen at pool construction
#[derive(Debug, Clone, Copy)]
pub(crate) struct ExpiryPolicy {
    pub(crate) kind: TimeoutType,
    pub(crate) timeout: Duration,
}

impl ExpiryPolicy {
    pub(crate) fn new(kind: TimeoutType, timeout: Duration) -> Self {
        Self { kind, timeout }
    }

    /// Stamp for a newly dialed connection
    ///
    /// Fixed lifetimes are backdated by a random offset in `[0, timeout/2)`
    /// so a batch dialed together does not expire together.
    pub(crate) fn birth_stamp(&self, now: Instant) -> Instant {
        match self.kind {
            TimeoutType::Idle => now,
            TimeoutType::Fixed => {
                let window = self.timeout / 2;
                if window.is_zero() {
                    return now;
                }
                let offset = rand::thread_rng().gen_range(Duration::ZERO..window);
                // Jitter is skipped when `now - offset` would precede the monotonic
                // clock origin; that only happens within moments of boot.
                now.checked_sub(offset).unwrap_or(now)
            }
        }
    }

    /// Refresh the stamp of a connection coming back to the pool
    pub(crate) fn on_release<C>(&self, conn: &mut PooledConn<C>) {
        if self.kind == TimeoutType::Idle {
            conn.stamp = Instant::now();
        }
    }

    /// Whether a stored connection is too old to hand out
    pub(crate) fn is_expired<C>(&self, conn: &PooledConn<C>, now: Instant) -> bool {
        if self.timeout.is_zero() {
            return false;
        }
        now.saturating_duration_since(conn.stamp) > self.timeout
    }
}
