//! Error types for appenv-datastore
//!
//! Every [`Error`] names the operation that raised it. When one operation
//! fails because another did, the inner error is kept as the cause, so
//! [`Error::ops`] reads back the call path without capturing a stack.
//!
//! The rendered message already spells out the whole chain down to the
//! driver's text, so [`std::error::Error::source`] is always `None`. Use
//! [`Error::root`] to reach the driver error itself.

use thiserror::Error;

use crate::backend::Backend;

/// Name of the operation that produced an error, e.g. `"datastore/open_database"`.
pub type Op = &'static str;

/// Result type alias for datastore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an error's root cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed configuration value
    Configuration,
    /// A backend could not be reached, or stopped answering
    Connection,
    /// Accessor used on a backend that was never provisioned
    Uninitialized,
    /// Backend identifier outside the known set
    UnknownBackend,
    /// Cache pool has no capacity left for another checkout
    PoolExhausted,
    /// Request context was canceled or its deadline elapsed
    Canceled,
    /// The database rejected the request
    Database,
}

/// An error tagged with the operation that produced it.
#[derive(Error, Debug)]
#[error("{op}: {cause}")]
pub struct Error {
    op: Op,
    cause: Cause,
}

/// What went wrong, independent of where.
#[derive(Error, Debug)]
pub enum Cause {
    /// Failure reported by a callee
    #[error(transparent)]
    Wrapped(Box<Error>),

    #[error("environment variable {key} {reason}")]
    Configuration { key: String, reason: String },

    #[error("failed to open {backend} database: {error}")]
    Open { backend: Backend, error: sqlx::Error },

    #[error("{backend} database did not answer ping: {error}")]
    Ping { backend: Backend, error: sqlx::Error },

    #[error("failed to dial cache at {address}: {error}")]
    Dial {
        address: String,
        error: redis::RedisError,
    },

    #[error("timed out dialing cache at {address}")]
    DialTimeout { address: String },

    #[error("{what} has not been initialized")]
    Uninitialized { what: String },

    #[error("unknown backend {name:?}")]
    UnknownBackend { name: String },

    #[error("cache pool exhausted ({max_active} connections active)")]
    PoolExhausted { max_active: usize },

    #[error("cache pool is closed")]
    PoolClosed,

    #[error("failed to begin transaction on {backend} database: {error}")]
    Begin { backend: Backend, error: sqlx::Error },

    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

impl Error {
    pub fn new(op: Op, cause: Cause) -> Self {
        Self { op, cause }
    }

    /// Wrap a callee's error under this operation's name.
    pub fn wrap(op: Op, inner: Error) -> Self {
        Self {
            op,
            cause: Cause::Wrapped(Box::new(inner)),
        }
    }

    pub fn configuration(op: Op, key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(
            op,
            Cause::Configuration {
                key: key.into(),
                reason: reason.into(),
            },
        )
    }

    pub fn uninitialized(op: Op, what: impl Into<String>) -> Self {
        Self::new(op, Cause::Uninitialized { what: what.into() })
    }

    pub fn unknown_backend(op: Op, name: impl Into<String>) -> Self {
        Self::new(op, Cause::UnknownBackend { name: name.into() })
    }

    /// Operation that produced this error.
    pub fn op(&self) -> Op {
        self.op
    }

    /// Immediate cause, which may be another wrapped [`Error`].
    pub fn cause(&self) -> &Cause {
        &self.cause
    }

    /// Innermost cause, with all wrapping removed.
    pub fn root(&self) -> &Cause {
        match &self.cause {
            Cause::Wrapped(inner) => inner.root(),
            cause => cause,
        }
    }

    /// Operation names from outermost to innermost.
    pub fn ops(&self) -> Vec<Op> {
        let mut ops = vec![self.op];
        let mut current = self;
        while let Cause::Wrapped(inner) = &current.cause {
            ops.push(inner.op);
            current = inner;
        }
        ops
    }

    pub fn kind(&self) -> ErrorKind {
        match &self.cause {
            Cause::Wrapped(inner) => inner.kind(),
            Cause::Configuration { .. } => ErrorKind::Configuration,
            Cause::Open { .. }
            | Cause::Ping { .. }
            | Cause::Dial { .. }
            | Cause::DialTimeout { .. }
            | Cause::PoolClosed => ErrorKind::Connection,
            Cause::Uninitialized { .. } => ErrorKind::Uninitialized,
            Cause::UnknownBackend { .. } => ErrorKind::UnknownBackend,
            Cause::PoolExhausted { .. } => ErrorKind::PoolExhausted,
            Cause::Begin { .. } => ErrorKind::Database,
            Cause::Canceled | Cause::DeadlineExceeded => ErrorKind::Canceled,
        }
    }
}
