//! appenv: everything a service needs from its environment
//!
//! An [`Env`] bundles the deployment stage, an HTTP router, a logger and a
//! [`Datastore`]. The datastore's primary database is opened eagerly; the
//! logging database and cache are added later with
//! [`Datastore::apply_options`].

pub mod config;
pub mod error;
pub mod logger;
pub mod router;

use std::fmt;
use std::str::FromStr;

use appenv_datastore::{Datastore, DatastoreSettings};
use axum::Router;
use tracing::Dispatch;

pub use appenv_datastore as datastore;
pub use error::{EnvError, Result};
pub use logger::{build_logger, LogFormat, LoggerConfig};

/// Deployment stage. Lower values are closer to production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum EnvName {
    Production = 1,
    Staging = 2,
    QA = 3,
    Dev = 4,
}

impl EnvName {
    pub fn as_str(self) -> &'static str {
        match self {
            EnvName::Production => "Production",
            EnvName::Staging => "Staging",
            EnvName::QA => "QA",
            EnvName::Dev => "Dev",
        }
    }
}

impl fmt::Display for EnvName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvName {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(EnvName::Production),
            "staging" | "stage" => Ok(EnvName::Staging),
            "qa" => Ok(EnvName::QA),
            "dev" | "development" => Ok(EnvName::Dev),
            _ => Err(EnvError::UnknownName(s.to_string())),
        }
    }
}

impl TryFrom<u8> for EnvName {
    type Error = EnvError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(EnvName::Production),
            2 => Ok(EnvName::Staging),
            3 => Ok(EnvName::QA),
            4 => Ok(EnvName::Dev),
            other => Err(EnvError::UnknownName(other.to_string())),
        }
    }
}

/// Shared environment for a running service.
pub struct Env {
    pub name: EnvName,
    pub router: Router,
    pub datastore: Datastore,
    pub logger: Dispatch,
}

impl Env {
    /// Build the logger from `logger`, then the datastore and router.
    pub async fn new(
        name: EnvName,
        logger: &LoggerConfig,
        settings: DatastoreSettings,
    ) -> Result<Self> {
        let logger = build_logger(logger)?;
        Self::with_logger(name, logger, settings).await
    }

    /// Like [`Env::new`] with a logger the caller already built.
    pub async fn with_logger(
        name: EnvName,
        logger: Dispatch,
        settings: DatastoreSettings,
    ) -> Result<Self> {
        let datastore = Datastore::with_settings(settings)
            .await
            .map_err(|e| appenv_datastore::Error::wrap("env/Env::new", e))?;

        Ok(Self {
            name,
            router: Router::new(),
            datastore,
            logger,
        })
    }

    /// Mount `api` under `/api` on this environment's router.
    pub fn mount_api(mut self, api: Router) -> Self {
        self.router = router::mount_api(self.router, api);
        self
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("name", &self.name)
            .field("datastore", &self.datastore)
            .finish_non_exhaustive()
    }
}
