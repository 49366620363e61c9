//! Options that provision secondary backends after construction.
//!
//! An option is any value implementing [`DatastoreOption`]; plain closures
//! `Fn(&mut Datastore) -> Result<()>` qualify too. New backends plug in
//! here without changing how a [`Datastore`] is built.
//!
//! ```ignore
//! let mut ds = Datastore::new().await?;
//! ds.apply_options([with_logging_database(), with_cache_pool()]).await?;
//! ```

use async_trait::async_trait;

use crate::backend::Backend;
use crate::cache::open_cache_pool;
use crate::connection::open_database;
use crate::datastore::Datastore;
use crate::error::{Error, Op, Result};

#[async_trait]
pub trait DatastoreOption: Send + Sync {
    /// Short name used in traces.
    fn name(&self) -> &'static str;

    async fn apply(&self, datastore: &mut Datastore) -> Result<()>;
}

#[async_trait]
impl<F> DatastoreOption for F
where
    F: Fn(&mut Datastore) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &'static str {
        "custom"
    }

    async fn apply(&self, datastore: &mut Datastore) -> Result<()> {
        self(datastore)
    }
}

/// Opens the logging database.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingDatabase;

#[async_trait]
impl DatastoreOption for LoggingDatabase {
    fn name(&self) -> &'static str {
        "logging-database"
    }

    async fn apply(&self, datastore: &mut Datastore) -> Result<()> {
        const OP: Op = "datastore/LoggingDatabase::apply";

        let settings = datastore.settings();
        let pool = open_database(Backend::Logging, &settings.env, &settings.connect)
            .await
            .map_err(|e| Error::wrap(OP, e))?;
        datastore.set_database(Backend::Logging, pool);
        Ok(())
    }
}

/// Builds the cache pool. No connection is dialed until first checkout.
#[derive(Debug, Clone, Copy, Default)]
pub struct CachePoolOption;

#[async_trait]
impl DatastoreOption for CachePoolOption {
    fn name(&self) -> &'static str {
        "cache-pool"
    }

    async fn apply(&self, datastore: &mut Datastore) -> Result<()> {
        const OP: Op = "datastore/CachePoolOption::apply";

        let pool = open_cache_pool(&datastore.settings().cache).map_err(|e| Error::wrap(OP, e))?;
        datastore.set_cache_pool(pool);
        Ok(())
    }
}

pub fn with_logging_database() -> Box<dyn DatastoreOption> {
    Box::new(LoggingDatabase)
}

pub fn with_cache_pool() -> Box<dyn DatastoreOption> {
    Box::new(CachePoolOption)
}
