//! The datastore: owner of every backend handle.
//!
//! The primary database is opened when the datastore is built. The logging
//! database and the cache pool stay unprovisioned until an option from
//! [`crate::options`] opens them. Accessors for an unprovisioned backend
//! fail with [`ErrorKind::Uninitialized`](crate::ErrorKind::Uninitialized).

use redis::aio::MultiplexedConnection;
use sqlx::{PgPool, Postgres, Transaction};

use crate::backend::Backend;
use crate::cache::{CacheConnection, CachePool, CachePoolConfig};
use crate::connection::{self, open_database, ConnectSettings};
use crate::context::RequestContext;
use crate::credentials::EnvSource;
use crate::error::{Cause, Error, Op, Result};
use crate::options::DatastoreOption;
use crate::transaction::TxOptions;

/// Where credentials come from and how backends are opened.
#[derive(Debug, Clone, Default)]
pub struct DatastoreSettings {
    pub env: EnvSource,
    pub connect: ConnectSettings,
    pub cache: CachePoolConfig,
}

impl DatastoreSettings {
    /// Process environment, with the cache address read from `CACHE_URL`.
    pub fn from_env() -> Result<Self> {
        Self::from_source(EnvSource::process())
    }

    pub fn from_source(env: EnvSource) -> Result<Self> {
        const OP: Op = "datastore/DatastoreSettings::from_source";

        let cache = CachePoolConfig::from_env(&env).map_err(|e| Error::wrap(OP, e))?;
        Ok(Self {
            env,
            connect: ConnectSettings::default(),
            cache,
        })
    }
}

/// PostgreSQL pools plus an optional Redis pool.
///
/// Pools are internally synchronized, so a shared `&Datastore` can serve
/// many concurrent callers.
#[derive(Debug)]
pub struct Datastore {
    databases: [Option<PgPool>; Backend::COUNT],
    cache: Option<CachePool<MultiplexedConnection>>,
    settings: DatastoreSettings,
}

impl Datastore {
    /// Open the primary database using the process environment.
    pub async fn new() -> Result<Self> {
        const OP: Op = "datastore/Datastore::new";

        let settings = DatastoreSettings::from_env().map_err(|e| Error::wrap(OP, e))?;
        Self::with_settings(settings)
            .await
            .map_err(|e| Error::wrap(OP, e))
    }

    /// Open the primary database. No datastore exists unless this succeeds.
    #[tracing::instrument(skip_all)]
    pub async fn with_settings(settings: DatastoreSettings) -> Result<Self> {
        const OP: Op = "datastore/Datastore::with_settings";

        let primary = open_database(Backend::Primary, &settings.env, &settings.connect)
            .await
            .map_err(|e| Error::wrap(OP, e))?;
        Ok(Self::from_primary(primary, settings))
    }

    /// Wrap an already open primary pool.
    pub fn from_primary(primary: PgPool, settings: DatastoreSettings) -> Self {
        let mut databases: [Option<PgPool>; Backend::COUNT] = Default::default();
        databases[Backend::Primary.index()] = Some(primary);
        Self {
            databases,
            cache: None,
            settings,
        }
    }

    pub fn settings(&self) -> &DatastoreSettings {
        &self.settings
    }

    /// Apply options in order. The first failure stops the sequence and is
    /// returned; options applied before it stay in effect.
    #[tracing::instrument(skip_all)]
    pub async fn apply_options<I>(&mut self, options: I) -> Result<()>
    where
        I: IntoIterator<Item = Box<dyn DatastoreOption>>,
    {
        const OP: Op = "datastore/Datastore::apply_options";

        for option in options {
            tracing::trace!(option = option.name(), "applying datastore option");
            option.apply(self).await.map_err(|e| Error::wrap(OP, e))?;
        }
        Ok(())
    }

    /// Handle for `backend`.
    pub fn db(&self, backend: Backend) -> Result<&PgPool> {
        const OP: Op = "datastore/Datastore::db";

        self.databases[backend.index()]
            .as_ref()
            .ok_or_else(|| Error::uninitialized(OP, format!("{backend} database")))
    }

    /// Handle for a backend given by name, e.g. `"primary"` or `"log"`.
    pub fn db_named(&self, name: &str) -> Result<&PgPool> {
        const OP: Op = "datastore/Datastore::db_named";

        let backend = name.parse::<Backend>().map_err(|e| Error::wrap(OP, e))?;
        self.db(backend).map_err(|e| Error::wrap(OP, e))
    }

    pub fn is_provisioned(&self, backend: Backend) -> bool {
        self.databases[backend.index()].is_some()
    }

    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    /// Begin a transaction on `backend`, bounded by `ctx`.
    ///
    /// Unprovisioned backends fail before any network I/O. Otherwise the
    /// begin fails if `ctx` is canceled or its deadline passes first, or
    /// with the driver's own error.
    #[tracing::instrument(skip(self, ctx, opts))]
    pub async fn begin_transaction(
        &self,
        ctx: &RequestContext,
        opts: Option<&TxOptions>,
        backend: Backend,
    ) -> Result<Transaction<'static, Postgres>> {
        const OP: Op = "datastore/Datastore::begin_transaction";

        let pool = self.db(backend).map_err(|e| Error::wrap(OP, e))?;
        let statement = opts.and_then(TxOptions::statement);

        ctx.run(OP, async move {
            let begin_error = |error: sqlx::Error| Error::new(OP, Cause::Begin { backend, error });

            let mut tx = pool.begin().await.map_err(begin_error)?;
            if let Some(statement) = statement {
                sqlx::query(&statement)
                    .execute(&mut *tx)
                    .await
                    .map_err(begin_error)?;
            }
            Ok(tx)
        })
        .await
    }

    /// Liveness probe against a provisioned backend.
    pub async fn ping(&self, backend: Backend) -> Result<()> {
        const OP: Op = "datastore/Datastore::ping";

        let pool = self.db(backend).map_err(|e| Error::wrap(OP, e))?;
        connection::ping(pool)
            .await
            .map_err(|error| Error::new(OP, Cause::Ping { backend, error }))
    }

    pub fn cache_pool(&self) -> Result<&CachePool<MultiplexedConnection>> {
        const OP: Op = "datastore/Datastore::cache_pool";

        self.cache
            .as_ref()
            .ok_or_else(|| Error::uninitialized(OP, "cache pool"))
    }

    /// Borrow a cache connection. Dropping it returns it to the pool.
    pub async fn cache_connection(&self) -> Result<CacheConnection> {
        const OP: Op = "datastore/Datastore::cache_connection";

        let pool = self.cache_pool().map_err(|e| Error::wrap(OP, e))?;
        pool.get().await.map_err(|e| Error::wrap(OP, e))
    }

    /// Close every provisioned pool.
    pub async fn close(&self) {
        for pool in self.databases.iter().flatten() {
            pool.close().await;
        }
        if let Some(cache) = &self.cache {
            cache.close();
        }
    }

    pub(crate) fn set_database(&mut self, backend: Backend, pool: PgPool) {
        self.databases[backend.index()] = Some(pool);
    }

    pub(crate) fn set_cache_pool(&mut self, pool: CachePool<MultiplexedConnection>) {
        self.cache = Some(pool);
    }
}
