//! Integration tests for the connection pool
//!
//! A mock connector records every dial and close so the tests can check
//! which connections were reused, evicted or dialed against which target.

use connpool::pool::{Connector, Pool, PoolError};
use connpool::{PoolConfig, TimeoutType};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
struct MockConn {
    id: usize,
    target: String,
}

#[derive(Default)]
struct MockState {
    next_id: AtomicUsize,
    dialed: Mutex<Vec<String>>,
    closed: Mutex<Vec<usize>>,
}

#[derive(Clone, Default)]
struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    fn dialed(&self) -> Vec<String> {
        self.state.dialed.lock().unwrap().clone()
    }

    fn closed(&self) -> Vec<usize> {
        self.state.closed.lock().unwrap().clone()
    }
}

impl Connector for MockConnector {
    type Connection = MockConn;

    async fn connect(&self, target: &str) -> io::Result<MockConn> {
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        self.state.dialed.lock().unwrap().push(target.to_string());
        Ok(MockConn {
            id,
            target: target.to_string(),
        })
    }

    async fn close(&self, conn: MockConn) -> io::Result<()> {
        self.state.closed.lock().unwrap().push(conn.id);
        Ok(())
    }
}

fn config(init_cap: usize, max_cap: usize, timeout_type: TimeoutType, idle: Duration) -> PoolConfig {
    PoolConfig {
        init_cap,
        max_cap,
        timeout_type,
        idle_timeout: idle,
        ..PoolConfig::new(["A"])
    }
}

async fn wait_for_version(pool: &Pool<MockConnector>, version: u64) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while pool.targets().version() < version {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("target update was not applied");
}

#[tokio::test]
async fn test_acquire_release_roundtrip() {
    let connector = MockConnector::default();
    let pool = Pool::new(
        config(2, 2, TimeoutType::Idle, Duration::from_secs(60)),
        connector.clone(),
    )
    .await
    .unwrap();

    assert_eq!(pool.idle_count(), 2);

    let conn = pool.acquire().await.unwrap();
    assert_eq!(pool.idle_count(), 1);
    assert_eq!(conn.get().unwrap().target, "A");

    pool.release(conn).await.unwrap();
    assert_eq!(pool.idle_count(), 2);

    // Nothing dialed beyond the initial connections
    assert_eq!(connector.dialed().len(), 2);
    assert!(connector.closed().is_empty());
}

#[tokio::test]
async fn test_idle_count_is_conserved() {
    let connector = MockConnector::default();
    let pool = Pool::new(
        config(3, 5, TimeoutType::Idle, Duration::ZERO),
        connector.clone(),
    )
    .await
    .unwrap();

    let mut held = Vec::new();
    for expected in (0..3).rev() {
        held.push(pool.acquire().await.unwrap());
        assert_eq!(pool.idle_count(), expected);
    }

    // Store is empty: the next acquire dials without touching the count
    held.push(pool.acquire().await.unwrap());
    assert_eq!(pool.idle_count(), 0);
    assert_eq!(connector.dialed().len(), 4);

    for (i, conn) in held.into_iter().enumerate() {
        pool.release(conn).await.unwrap();
        assert_eq!(pool.idle_count(), i + 1);
    }
}

#[tokio::test]
async fn test_release_on_full_store_closes() {
    let connector = MockConnector::default();
    let pool = Pool::new(
        config(1, 1, TimeoutType::Idle, Duration::from_secs(60)),
        connector.clone(),
    )
    .await
    .unwrap();

    let first = pool.acquire().await.unwrap();
    assert_eq!(pool.idle_count(), 0);
    let second = pool.acquire().await.unwrap();
    let second_id = second.get().unwrap().id;

    pool.release(first).await.unwrap();
    assert_eq!(pool.idle_count(), 1);

    pool.release(second).await.unwrap();
    assert_eq!(pool.idle_count(), 1);
    assert_eq!(connector.closed(), vec![second_id]);
    assert_eq!(pool.stats().discarded, 1);
}

#[tokio::test(start_paused = true)]
async fn test_idle_timeout_recycles_unused() {
    let connector = MockConnector::default();
    let pool = Pool::new(
        config(1, 1, TimeoutType::Idle, Duration::from_secs(10)),
        connector.clone(),
    )
    .await
    .unwrap();

    let conn = pool.acquire().await.unwrap();
    let original = conn.get().unwrap().id;

    tokio::time::advance(Duration::from_secs(8)).await;
    pool.release(conn).await.unwrap();

    // Released 8s ago is still fresh under the idle policy
    tokio::time::advance(Duration::from_secs(8)).await;
    let conn = pool.acquire().await.unwrap();
    assert_eq!(conn.get().unwrap().id, original);
    pool.release(conn).await.unwrap();

    // Left untouched past the timeout: discarded and replaced
    tokio::time::advance(Duration::from_secs(11)).await;
    let conn = pool.acquire().await.unwrap();
    assert_ne!(conn.get().unwrap().id, original);
    assert_eq!(connector.closed(), vec![original]);
    assert_eq!(pool.stats().expired, 1);
}

#[tokio::test(start_paused = true)]
async fn test_fixed_timeout_ignores_release() {
    let connector = MockConnector::default();
    let pool = Pool::new(
        config(1, 1, TimeoutType::Fixed, Duration::from_secs(10)),
        connector.clone(),
    )
    .await
    .unwrap();

    let original = {
        let conn = pool.acquire().await.unwrap();
        let id = conn.get().unwrap().id;
        pool.release(conn).await.unwrap();
        id
    };

    // Keep using it; each release would refresh an idle stamp, not a fixed one
    for _ in 0..3 {
        tokio::time::advance(Duration::from_secs(4)).await;
        let conn = pool.acquire().await.unwrap();
        if conn.get().unwrap().id != original {
            // Jitter may have aged it out already; it must not come back
            pool.release(conn).await.unwrap();
            break;
        }
        pool.release(conn).await.unwrap();
    }

    // Past its lifetime no matter how often it was used
    let conn = pool.acquire().await.unwrap();
    assert_ne!(conn.get().unwrap().id, original);
    assert!(connector.closed().contains(&original));
}

#[tokio::test]
async fn test_close_semantics() {
    let connector = MockConnector::default();
    let pool = Pool::new(
        config(2, 2, TimeoutType::Idle, Duration::from_secs(60)),
        connector.clone(),
    )
    .await
    .unwrap();

    let held = pool.acquire().await.unwrap();
    let held_id = held.get().unwrap().id;

    pool.close().await;
    assert_eq!(connector.closed().len(), 1);

    assert!(matches!(pool.acquire().await, Err(PoolError::PoolClosed)));

    pool.release(held).await.unwrap();
    assert_eq!(pool.idle_count(), 0);
    assert!(connector.closed().contains(&held_id));

    // Safe to repeat
    pool.close().await;
    assert_eq!(connector.closed().len(), 2);
}

#[tokio::test]
async fn test_replace_targets_while_running() {
    let connector = MockConnector::default();
    let pool = Pool::new(
        config(1, 1, TimeoutType::Idle, Duration::from_secs(60)),
        connector.clone(),
    )
    .await
    .unwrap();

    pool.target_feed().send(Some(vec!["B".to_string()])).unwrap();
    wait_for_version(&pool, 1).await;

    // Drain the idle store so every acquire below is a miss
    let _idle = pool.acquire().await.unwrap();
    for _ in 0..10 {
        let conn = pool.acquire().await.unwrap();
        assert_eq!(conn.get().unwrap().target, "B");
    }

    let dialed = connector.dialed();
    assert_eq!(dialed[0], "A");
    assert!(dialed[1..].iter().all(|t| t == "B"));
}

#[tokio::test]
async fn test_empty_targets_fail_on_miss() {
    let pool = Pool::new(
        config(1, 1, TimeoutType::Idle, Duration::from_secs(60)),
        MockConnector::default(),
    )
    .await
    .unwrap();

    pool.target_feed().send(Some(Vec::new())).unwrap();
    wait_for_version(&pool, 1).await;

    // The stored connection is still handed out
    let _held = pool.acquire().await.unwrap();
    assert!(matches!(
        pool.acquire().await,
        Err(PoolError::NoTargetsAvailable)
    ));

    // New targets make the pool usable again
    pool.target_feed().send(Some(vec!["C".to_string()])).unwrap();
    wait_for_version(&pool, 2).await;
    assert_eq!(pool.acquire().await.unwrap().get().unwrap().target, "C");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquire_release() {
    let connector = MockConnector::default();
    let pool = Arc::new(
        Pool::new(
            config(4, 8, TimeoutType::Idle, Duration::from_secs(60)),
            connector.clone(),
        )
        .await
        .unwrap(),
    );

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                for _ in 0..50 {
                    let conn = pool.acquire().await.unwrap();
                    tokio::task::yield_now().await;
                    pool.release(conn).await.unwrap();
                }
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    let stats = pool.stats();
    assert!(stats.idle <= 8);
    assert_eq!(stats.created as usize, connector.dialed().len());
    // Every dialed connection is either idle or was closed on overflow
    assert_eq!(
        stats.idle + connector.closed().len(),
        connector.dialed().len()
    );

    pool.close().await;
    assert_eq!(connector.closed().len(), connector.dialed().len());
}

/// Connector whose close always fails, recording every attempt
#[derive(Clone, Default)]
struct FailingClose {
    inner: MockConnector,
}

impl Connector for FailingClose {
    type Connection = MockConn;

    async fn connect(&self, target: &str) -> io::Result<MockConn> {
        self.inner.connect(target).await
    }

    async fn close(&self, conn: MockConn) -> io::Result<()> {
        self.inner.close(conn).await?;
        Err(io::Error::new(io::ErrorKind::Other, "close failed"))
    }
}

#[tokio::test(start_paused = true)]
async fn test_eviction_close_errors_not_escalated() {
    let connector = FailingClose::default();
    let pool = Pool::new(
        config(1, 1, TimeoutType::Idle, Duration::from_secs(10)),
        connector.clone(),
    )
    .await
    .unwrap();

    // Expired entry on acquire
    let conn = pool.acquire().await.unwrap();
    let expired_id = conn.get().unwrap().id;
    pool.release(conn).await.unwrap();
    tokio::time::advance(Duration::from_secs(11)).await;

    let first = pool.acquire().await.expect("expiry close error leaked into acquire");
    assert_ne!(first.get().unwrap().id, expired_id);
    assert_eq!(connector.inner.closed(), vec![expired_id]);

    // Release into a full store
    let second = pool.acquire().await.unwrap();
    let overflow_id = second.get().unwrap().id;
    pool.release(first).await.unwrap();
    pool.release(second)
        .await
        .expect("overflow close error leaked into release");
    assert_eq!(pool.idle_count(), 1);
    assert!(connector.inner.closed().contains(&overflow_id));

    // Drain on close, then release after close
    let held = pool.acquire().await.unwrap();
    let held_id = held.get().unwrap().id;
    let stored = {
        let conn = pool.acquire().await.unwrap();
        let id = conn.get().unwrap().id;
        pool.release(conn).await.unwrap();
        id
    };

    pool.close().await;
    assert!(connector.inner.closed().contains(&stored));

    pool.release(held)
        .await
        .expect("close error leaked into release after close");
    assert!(connector.inner.closed().contains(&held_id));
    assert_eq!(pool.idle_count(), 0);
}
