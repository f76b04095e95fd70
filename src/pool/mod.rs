//! Connection pooling module
//!
//! This module provides:
//! - A bounded, non-blocking store of idle connections
//! - Idle-time or fixed-lifetime expiry with jittered birth stamps
//! - Random target selection with runtime target replacement
//! - A pluggable [`Connector`] for dialing and closing transports

pub mod connection;
pub mod connector;
pub mod error;
pub mod idle;

pub use connection::{Pool, PoolStats};
pub use connector::{Connector, TcpConnector};
pub use error::PoolError;
pub use idle::PooledConn;
