//! appenv-datastore: lazily provisioned backend handles
//!
//! A [`Datastore`] owns a PostgreSQL pool for the primary database, and,
//! once the matching option has been applied, a pool for the logging
//! database and a Redis pool. Credentials come from environment variables
//! (`PG_APP_*`, `PG_LOG_*`).
//!
//! The crate emits no log records; failures come back as [`Error`] values
//! tagged with the operation that produced them.

pub mod backend;
pub mod cache;
pub mod connection;
pub mod context;
pub mod credentials;
pub mod datastore;
pub mod error;
pub mod options;
pub mod transaction;

pub use backend::{env_keys_for, Backend};
pub use cache::{open_cache_pool, CacheConnection, CachePool, CachePoolConfig, PooledConnection};
pub use connection::{open_database, ConnectSettings, ConnectionDescriptor, SslPolicy};
pub use context::RequestContext;
pub use credentials::{Credentials, EnvKeys, EnvSource};
pub use datastore::{Datastore, DatastoreSettings};
pub use error::{Cause, Error, ErrorKind, Op, Result};
pub use options::{with_cache_pool, with_logging_database, DatastoreOption};
pub use transaction::{IsolationLevel, TxOptions};
