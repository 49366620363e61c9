//! Error types for appenv

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EnvError>;

#[derive(Error, Debug)]
pub enum EnvError {
    #[error("unknown environment name {0:?}")]
    UnknownName(String),

    #[error("invalid log level {value:?}: {reason}")]
    InvalidLogLevel { value: String, reason: String },

    #[error("invalid log filter {value:?}: {reason}")]
    InvalidLogFilter { value: String, reason: String },

    #[error("failed to load {path:?}: {source}")]
    DotEnv {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },

    #[error(transparent)]
    Datastore(#[from] appenv_datastore::Error),
}
