use rand::Rng;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Sender half of the target update feed
///
/// Each message replaces the whole target list; `None` is ignored.
pub type TargetFeed = mpsc::UnboundedSender<Option<Vec<String>>>;

/// Receiver half of the target update feed
pub type TargetFeedReceiver = mpsc::UnboundedReceiver<Option<Vec<String>>>;

/// Create an unbounded target update feed
pub fn target_feed() -> (TargetFeed, TargetFeedReceiver) {
    mpsc::unbounded_channel()
}

#[derive(Debug)]
struct Targets {
    addrs: Arc<[String]>,
    version: u64,
}

/// Versioned set of interchangeable backend addresses
///
/// Readers share the lock; a replacement swaps the whole list under the
/// write lock, so a reader sees either the old list or the new one.
#[derive(Debug)]
pub struct TargetSet {
    inner: RwLock<Targets>,
}

impl TargetSet {
    /// Create a target set from the initial addresses
    pub fn new(addrs: Vec<String>) -> Self {
        Self {
            inner: RwLock::new(Targets {
                addrs: addrs.into(),
                version: 0,
            }),
        }
    }

    /// Pick one address uniformly at random
    ///
    /// Returns `None` when the set is currently empty.
    pub fn pick(&self) -> Option<String> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let len = guard.addrs.len();
        if len == 0 {
            return None;
        }

        let idx = rand::thread_rng().gen_range(0..len);
        Some(guard.addrs[idx].clone())
    }

    /// Replace the entire target list; last write wins
    pub fn replace(&self, addrs: Option<Vec<String>>) {
        let Some(addrs) = addrs else {
            return;
        };

        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.addrs = addrs.into();
        guard.version += 1;

        info!(
            targets = guard.addrs.len(),
            version = guard.version,
            "Replaced pool targets"
        );
    }

    /// Current target list
    pub fn snapshot(&self) -> Arc<[String]> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard.addrs)
    }

    /// Number of replacements applied so far
    pub fn version(&self) -> u64 {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).version
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start the background listener that applies updates in delivery order
    ///
    /// The task ends once every sender of the feed is dropped, or when the
    /// returned handle is aborted.
    pub fn spawn_listener(self: Arc<Self>, mut feed: TargetFeedReceiver) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(update) = feed.recv().await {
                if update.is_none() {
                    debug!("Ignoring empty target update");
                    continue;
                }
                self.replace(update);
            }
            debug!("Target feed closed");
        })
    }
}
