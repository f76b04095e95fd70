//! connpool - Client-side connection pool with dynamic, randomly balanced targets

pub mod config;
pub mod lb;
pub mod pool;

pub use config::{PoolConfig, TimeoutType};
pub use pool::{Connector, Pool, PoolError, PooledConn};
