//! Backend identifiers and the table that describes each one.
//!
//! Adding a backend means adding a variant and one row to [`BACKENDS`];
//! credential lookup and handle selection both index into that table.

use std::fmt;
use std::str::FromStr;

use crate::credentials::EnvKeys;
use crate::error::Error;

/// Which relational database a request concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Main application database
    Primary,
    /// Database that receives HTTP request logs
    Logging,
}

pub(crate) struct BackendSpec {
    pub backend: Backend,
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub keys: EnvKeys,
}

pub(crate) const BACKENDS: [BackendSpec; Backend::COUNT] = [
    BackendSpec {
        backend: Backend::Primary,
        name: "primary",
        aliases: &["app"],
        keys: EnvKeys {
            dbname: "PG_APP_DBNAME",
            user: "PG_APP_USERNAME",
            password: "PG_APP_PASSWORD",
            host: "PG_APP_HOST",
            port: "PG_APP_PORT",
        },
    },
    BackendSpec {
        backend: Backend::Logging,
        name: "logging",
        aliases: &["log"],
        keys: EnvKeys {
            dbname: "PG_LOG_DBNAME",
            user: "PG_LOG_USERNAME",
            password: "PG_LOG_PASSWORD",
            host: "PG_LOG_HOST",
            port: "PG_LOG_PORT",
        },
    },
];

impl Backend {
    pub const COUNT: usize = 2;
    pub const ALL: [Backend; Backend::COUNT] = [Backend::Primary, Backend::Logging];

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    pub(crate) fn spec(self) -> &'static BackendSpec {
        &BACKENDS[self.index()]
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    /// Environment variable names holding this backend's credentials.
    pub fn env_keys(self) -> EnvKeys {
        self.spec().keys
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        BACKENDS
            .iter()
            .find(|spec| spec.name == wanted || spec.aliases.contains(&wanted.as_str()))
            .map(|spec| spec.backend)
            .ok_or_else(|| Error::unknown_backend("datastore/Backend::from_str", s))
    }
}

/// Environment keys for a backend given by name.
///
/// Unrecognized names get [`EnvKeys::default`], whose keys are all empty.
pub fn env_keys_for(name: &str) -> EnvKeys {
    name.parse::<Backend>()
        .map(Backend::env_keys)
        .unwrap_or_default()
}
