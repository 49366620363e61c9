//! Redis connection pool
//!
//! Two ceilings bound the pool: `max_idle` limits how many returned
//! connections are kept for reuse, `max_active` limits how many are checked
//! out at once. Connections are dialed on demand; a dial failure comes back
//! from [`CachePool::get`] as an error and frees the slot it reserved.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use redis::aio::MultiplexedConnection;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::credentials::EnvSource;
use crate::error::{Cause, Error, Op, Result};

pub const DEFAULT_MAX_IDLE: usize = 80;
pub const DEFAULT_MAX_ACTIVE: usize = 12_000;
pub const DEFAULT_CACHE_URL: &str = "redis://127.0.0.1:6379";

/// Optional override for [`CachePoolConfig::url`].
pub const CACHE_URL_ENV: &str = "CACHE_URL";

const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct CachePoolConfig {
    pub url: String,
    pub max_idle: usize,
    pub max_active: usize,
    pub dial_timeout: Duration,
    /// How long a checkout may wait for a free slot once `max_active` is
    /// reached. `None` fails immediately.
    pub wait_timeout: Option<Duration>,
}

impl Default for CachePoolConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_CACHE_URL.to_string(),
            max_idle: DEFAULT_MAX_IDLE,
            max_active: DEFAULT_MAX_ACTIVE,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            wait_timeout: None,
        }
    }
}

impl CachePoolConfig {
    /// Defaults, with the dial address taken from `CACHE_URL` when set.
    pub fn from_env(source: &EnvSource) -> Result<Self> {
        const OP: Op = "datastore/CachePoolConfig::from_env";

        let mut config = Self::default();
        if let Some(url) = source.var(CACHE_URL_ENV).map_err(|e| Error::wrap(OP, e))? {
            if !url.trim().is_empty() {
                config.url = url.trim().to_string();
            }
        }
        Ok(config)
    }
}

type DialFn<C> = Arc<dyn Fn() -> BoxFuture<'static, Result<C>> + Send + Sync>;

/// Pool of cache connections. Cheap to clone; clones share the pool.
pub struct CachePool<C> {
    inner: Arc<PoolInner<C>>,
}

struct PoolInner<C> {
    idle: Mutex<VecDeque<C>>,
    active: Arc<Semaphore>,
    max_idle: usize,
    max_active: usize,
    wait_timeout: Option<Duration>,
    dial: DialFn<C>,
}

impl<C> PoolInner<C> {
    fn idle(&self) -> MutexGuard<'_, VecDeque<C>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn put_idle(&self, conn: C) {
        let mut idle = self.idle();
        // close() marks the semaphore closed before clearing under this lock.
        if self.active.is_closed() {
            return;
        }
        if idle.len() < self.max_idle {
            idle.push_back(conn);
        }
    }
}

impl<C> Clone for CachePool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Send + 'static> CachePool<C> {
    /// Build a pool around an arbitrary dial function.
    pub fn with_dial<F, Fut>(config: &CachePoolConfig, dial: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<C>> + Send + 'static,
    {
        let dial: DialFn<C> = Arc::new(move || dial().boxed());
        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(VecDeque::new()),
                active: Arc::new(Semaphore::new(config.max_active)),
                max_idle: config.max_idle,
                max_active: config.max_active,
                wait_timeout: config.wait_timeout,
                dial,
            }),
        }
    }

    /// Check out a connection, reusing an idle one or dialing a new one.
    ///
    /// # Errors
    ///
    /// - [`Cause::PoolExhausted`] when `max_active` connections are out
    /// - the dial error when a new connection could not be made
    /// - [`Cause::PoolClosed`] after [`CachePool::close`]
    pub async fn get(&self) -> Result<PooledConnection<C>> {
        const OP: Op = "datastore/CachePool::get";

        let permit = self.reserve().await.map_err(|cause| Error::new(OP, cause))?;

        let reused = self.inner.idle().pop_front();
        let conn = match reused {
            Some(conn) => conn,
            None => (self.inner.dial)().await.map_err(|e| Error::wrap(OP, e))?,
        };

        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    async fn reserve(&self) -> std::result::Result<OwnedSemaphorePermit, Cause> {
        let exhausted = Cause::PoolExhausted {
            max_active: self.inner.max_active,
        };
        let semaphore = Arc::clone(&self.inner.active);

        match self.inner.wait_timeout {
            None => semaphore.try_acquire_owned().map_err(|e| match e {
                TryAcquireError::NoPermits => exhausted,
                TryAcquireError::Closed => Cause::PoolClosed,
            }),
            Some(wait) => match tokio::time::timeout(wait, semaphore.acquire_owned()).await {
                Ok(Ok(permit)) => Ok(permit),
                Ok(Err(_)) => Err(Cause::PoolClosed),
                Err(_) => Err(exhausted),
            },
        }
    }
}

impl<C> CachePool<C> {
    pub fn max_idle(&self) -> usize {
        self.inner.max_idle
    }

    pub fn max_active(&self) -> usize {
        self.inner.max_active
    }

    /// Connections currently checked out.
    pub fn active_count(&self) -> usize {
        self.inner.max_active - self.inner.active.available_permits()
    }

    pub fn idle_count(&self) -> usize {
        self.inner.idle().len()
    }

    /// Drop idle connections and refuse further checkouts. Connections
    /// already out are dropped when returned.
    pub fn close(&self) {
        self.inner.active.close();
        self.inner.idle().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.active.is_closed()
    }
}

impl<C> fmt::Debug for CachePool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachePool")
            .field("max_idle", &self.inner.max_idle)
            .field("max_active", &self.inner.max_active)
            .field("active", &self.active_count())
            .field("idle", &self.idle_count())
            .finish()
    }
}

/// A checked-out connection. Dropping it returns the connection to the pool.
pub struct PooledConnection<C> {
    conn: Option<C>,
    pool: Arc<PoolInner<C>>,
    _permit: OwnedSemaphorePermit,
}

impl<C> PooledConnection<C> {
    /// Drop the connection instead of returning it, e.g. after an I/O error.
    pub fn discard(mut self) {
        self.conn = None;
    }
}

impl<C> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl<C> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut C {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl<C> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put_idle(conn);
        }
    }
}

impl<C> fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("present", &self.conn.is_some())
            .finish()
    }
}

/// A checked-out Redis connection.
pub type CacheConnection = PooledConnection<MultiplexedConnection>;

/// Build the Redis pool described by `config`.
///
/// Nothing is dialed here; network failures surface on the first
/// [`CachePool::get`]. Fails only if `config.url` is not a Redis URL.
pub fn open_cache_pool(config: &CachePoolConfig) -> Result<CachePool<MultiplexedConnection>> {
    const OP: Op = "datastore/open_cache_pool";

    let client = redis::Client::open(config.url.as_str()).map_err(|e| {
        Error::configuration(OP, CACHE_URL_ENV, format!("is not a valid redis url: {e}"))
    })?;
    let address = config.url.clone();
    let dial_timeout = config.dial_timeout;

    Ok(CachePool::with_dial(config, move || {
        let client = client.clone();
        let address = address.clone();
        async move { dial(client, address, dial_timeout).await }
    }))
}

async fn dial(
    client: redis::Client,
    address: String,
    timeout: Duration,
) -> Result<MultiplexedConnection> {
    const OP: Op = "datastore/dial_cache";

    match tokio::time::timeout(timeout, client.get_multiplexed_async_connection()).await {
        Ok(Ok(conn)) => Ok(conn),
        Ok(Err(error)) => Err(Error::new(OP, Cause::Dial { address, error })),
        Err(_) => Err(Error::new(OP, Cause::DialTimeout { address })),
    }
}
