//! Credential resolution from environment variables
//!
//! Credentials are rebuilt from the environment on every connection attempt
//! and never cached.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::backend::Backend;
use crate::connection::{ConnectionDescriptor, SslPolicy};
use crate::error::{Error, Op, Result};

/// Names of the five environment variables that configure one backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvKeys {
    pub dbname: &'static str,
    pub user: &'static str,
    pub password: &'static str,
    pub host: &'static str,
    pub port: &'static str,
}

impl EnvKeys {
    pub fn as_array(&self) -> [&'static str; 5] {
        [self.dbname, self.user, self.password, self.host, self.port]
    }

    /// True for the keys of an unrecognized backend.
    pub fn is_empty(&self) -> bool {
        self.as_array().iter().all(|key| key.is_empty())
    }
}

/// Where environment values are read from.
///
/// Defaults to the process environment. An in-memory map lets tests and
/// embedding hosts supply values without touching process-wide state.
#[derive(Clone, Default)]
pub struct EnvSource {
    vars: Option<Arc<HashMap<String, String>>>,
}

impl EnvSource {
    pub fn process() -> Self {
        Self { vars: None }
    }

    pub fn from_map<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            vars: Some(Arc::new(vars)),
        }
    }

    /// Read one variable. `Ok(None)` when it is not set.
    pub fn var(&self, key: &str) -> Result<Option<String>> {
        const OP: Op = "datastore/EnvSource::var";

        match &self.vars {
            Some(vars) => Ok(vars.get(key).cloned()),
            None => match std::env::var(key) {
                Ok(value) => Ok(Some(value)),
                Err(std::env::VarError::NotPresent) => Ok(None),
                Err(std::env::VarError::NotUnicode(_)) => {
                    Err(Error::configuration(OP, key, "is not valid unicode"))
                }
            },
        }
    }
}

impl fmt::Debug for EnvSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.vars {
            Some(vars) => f
                .debug_struct("EnvSource")
                .field("keys", &vars.keys().collect::<Vec<_>>())
                .finish(),
            None => f.write_str("EnvSource(process)"),
        }
    }
}

/// Everything needed to open a connection to one backend.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
}

impl Credentials {
    /// Resolve a backend's credentials from `source`.
    ///
    /// Unset host, user, password or database name resolve to the empty
    /// string. The port has no default: it must be set and parse as an
    /// integer in `1..=65535`.
    pub fn resolve(backend: Backend, source: &EnvSource) -> Result<Self> {
        const OP: Op = "datastore/Credentials::resolve";

        let keys = backend.env_keys();
        let read = |key: &str| -> Result<String> {
            source
                .var(key)
                .map(Option::unwrap_or_default)
                .map_err(|e| Error::wrap(OP, e))
        };

        let raw_port = source.var(keys.port).map_err(|e| Error::wrap(OP, e))?;
        let port = parse_port(OP, keys.port, raw_port)?;

        Ok(Self {
            host: read(keys.host)?,
            port,
            user: read(keys.user)?,
            password: read(keys.password)?,
            dbname: read(keys.dbname)?,
        })
    }

    /// Resolve from the process environment.
    pub fn from_env(backend: Backend) -> Result<Self> {
        Self::resolve(backend, &EnvSource::process())
    }

    pub fn descriptor(&self, ssl: SslPolicy) -> ConnectionDescriptor {
        ConnectionDescriptor::new(self.clone(), ssl)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("dbname", &self.dbname)
            .finish()
    }
}

fn parse_port(op: Op, key: &str, raw: Option<String>) -> Result<u16> {
    let raw = raw.ok_or_else(|| Error::configuration(op, key, "is not set"))?;
    match raw.trim().parse::<u16>() {
        Ok(0) => Err(Error::configuration(op, key, "must be a positive port number, got 0")),
        Ok(port) => Ok(port),
        Err(e) => Err(Error::configuration(
            op,
            key,
            format!("is not a valid port number ({raw:?}): {e}"),
        )),
    }
}
