//! Target selection for the connection pool
//!
//! # Components
//!
//! - [`TargetSet`]: the current list of interchangeable backend addresses
//! - [`TargetFeed`]: unbounded channel delivering replacement lists
//!
//! New connections go to a target picked uniformly at random. The list can be
//! swapped as a whole at any time; the swap is atomic with respect to readers
//! and updates are applied in the order they were sent.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use connpool::lb::{target_feed, TargetSet};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let targets = Arc::new(TargetSet::new(vec![
//!     "10.0.0.1:50051".to_string(),
//!     "10.0.0.2:50051".to_string(),
//! ]));
//!
//! let (feed, rx) = target_feed();
//! let listener = Arc::clone(&targets).spawn_listener(rx);
//!
//! feed.send(Some(vec!["10.0.0.3:50051".to_string()])).unwrap();
//! # drop(feed);
//! # listener.await.unwrap();
//! assert_eq!(targets.pick().as_deref(), Some("10.0.0.3:50051"));
//! # }
//! ```

pub mod targets;

pub use targets::{target_feed, TargetFeed, TargetFeedReceiver, TargetSet};
