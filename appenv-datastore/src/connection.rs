//! PostgreSQL connection factory
//!
//! Opens a pool for one backend and checks that it answers before handing
//! it back. A single failed attempt is reported to the caller; nothing here
//! retries.

use std::fmt;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{Connection, PgPool};

use crate::backend::Backend;
use crate::credentials::{Credentials, EnvSource};
use crate::error::{Cause, Error, Op, Result};

/// Default maximum connections per relational pool.
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Default bound on establishing a connection.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Used when the host variable is unset or empty.
pub const DEFAULT_HOST: &str = "localhost";

/// Used when the user variable is unset or empty. An unset database name
/// falls back to the user name.
pub const DEFAULT_USER: &str = "postgres";

/// Transport security for relational connections.
///
/// `Disable` is the default: connections are made in plain text unless a
/// caller opts into TLS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SslPolicy {
    #[default]
    Disable,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            SslPolicy::Disable => "disable",
            SslPolicy::Prefer => "prefer",
            SslPolicy::Require => "require",
            SslPolicy::VerifyCa => "verify-ca",
            SslPolicy::VerifyFull => "verify-full",
        }
    }

    fn pg_mode(self) -> PgSslMode {
        match self {
            SslPolicy::Disable => PgSslMode::Disable,
            SslPolicy::Prefer => PgSslMode::Prefer,
            SslPolicy::Require => PgSslMode::Require,
            SslPolicy::VerifyCa => PgSslMode::VerifyCa,
            SslPolicy::VerifyFull => PgSslMode::VerifyFull,
        }
    }
}

impl fmt::Display for SslPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved credentials plus transport policy.
///
/// `Display` renders the libpq key/value form
/// (`host=.. port=.. user=.. password=.. dbname=.. sslmode=..`).
#[derive(Clone)]
pub struct ConnectionDescriptor {
    credentials: Credentials,
    ssl: SslPolicy,
}

impl ConnectionDescriptor {
    pub fn new(credentials: Credentials, ssl: SslPolicy) -> Self {
        Self { credentials, ssl }
    }

    pub fn ssl(&self) -> SslPolicy {
        self.ssl
    }

    /// Driver options built only from the resolved credentials.
    ///
    /// libpq variables (`PGHOST`, `PGUSER`, `PGPASSWORD`, `PGDATABASE`) and
    /// `~/.pgpass` are never consulted: empty values fall back to
    /// [`DEFAULT_HOST`] and [`DEFAULT_USER`], an empty password stays empty.
    pub fn connect_options(&self) -> PgConnectOptions {
        let c = &self.credentials;
        let host = non_empty(&c.host).unwrap_or(DEFAULT_HOST);
        let user = non_empty(&c.user).unwrap_or(DEFAULT_USER);
        let dbname = non_empty(&c.dbname).unwrap_or(user);

        PgConnectOptions::new_without_pgpass()
            .host(host)
            .port(c.port)
            .username(user)
            .password(&c.password)
            .database(dbname)
            .ssl_mode(self.ssl.pg_mode())
    }
}

fn non_empty(value: &str) -> Option<&str> {
    Some(value).filter(|v| !v.is_empty())
}

/// Write `value` as a libpq key/value literal, quoting it when it is empty
/// or holds whitespace, quotes or backslashes.
fn write_conninfo_value(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|ch| ch.is_whitespace() || ch == '\'' || ch == '\\');
    if !needs_quotes {
        return f.write_str(value);
    }

    f.write_str("'")?;
    for ch in value.chars() {
        if ch == '\'' || ch == '\\' {
            f.write_str("\\")?;
        }
        write!(f, "{ch}")?;
    }
    f.write_str("'")
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.credentials;
        f.write_str("host=")?;
        write_conninfo_value(f, &c.host)?;
        write!(f, " port={} user=", c.port)?;
        write_conninfo_value(f, &c.user)?;
        f.write_str(" password=")?;
        write_conninfo_value(f, &c.password)?;
        f.write_str(" dbname=")?;
        write_conninfo_value(f, &c.dbname)?;
        write!(f, " sslmode={}", self.ssl)
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("credentials", &self.credentials)
            .field("ssl", &self.ssl)
            .finish()
    }
}

/// Pool sizing and timeouts for relational backends.
#[derive(Debug, Clone)]
pub struct ConnectSettings {
    pub ssl: SslPolicy,
    pub max_connections: u32,
    /// Upper bound on opening or acquiring a connection.
    pub connect_timeout: Duration,
}

impl Default for ConnectSettings {
    fn default() -> Self {
        Self {
            ssl: SslPolicy::default(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Open a connection pool for `backend` and verify it is alive.
///
/// # Errors
///
/// - credential resolution failures come back with their kind unchanged
/// - [`Cause::Open`] when no connection could be established
/// - [`Cause::Ping`] when a connection was made but the liveness probe failed
#[tracing::instrument(skip_all, fields(backend = %backend))]
pub async fn open_database(
    backend: Backend,
    source: &EnvSource,
    settings: &ConnectSettings,
) -> Result<PgPool> {
    const OP: Op = "datastore/open_database";

    let credentials = Credentials::resolve(backend, source).map_err(|e| Error::wrap(OP, e))?;
    let options = credentials.descriptor(settings.ssl).connect_options();

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.connect_timeout)
        .connect_with(options)
        .await
        .map_err(|error| Error::new(OP, Cause::Open { backend, error }))?;

    ping(&pool)
        .await
        .map_err(|error| Error::new(OP, Cause::Ping { backend, error }))?;

    Ok(pool)
}

/// Check out one connection and round-trip a ping on it.
pub(crate) async fn ping(pool: &PgPool) -> std::result::Result<(), sqlx::Error> {
    let mut conn = pool.acquire().await?;
    conn.ping().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn creds() -> Credentials {
        Credentials {
            host: "localhost".to_string(),
            port: 5432,
            user: "app".to_string(),
            password: "pw".to_string(),
            dbname: "appdb".to_string(),
        }
    }

    #[test]
    fn test_descriptor_renders_key_value_form() {
        let descriptor = creds().descriptor(SslPolicy::default());
        assert_eq!(
            descriptor.to_string(),
            "host=localhost port=5432 user=app password=pw dbname=appdb sslmode=disable"
        );
    }

    #[test]
    fn test_descriptor_respects_ssl_policy() {
        let descriptor = creds().descriptor(SslPolicy::VerifyFull);
        assert!(descriptor.to_string().ends_with("sslmode=verify-full"));
        assert_eq!(descriptor.ssl(), SslPolicy::VerifyFull);
    }

    #[test]
    fn test_descriptor_debug_redacts_password() {
        let descriptor = creds().descriptor(SslPolicy::Disable);
        assert!(!format!("{descriptor:?}").contains("pw\""));
    }

    #[test]
    fn test_connect_options_carry_credentials() {
        let options = creds().descriptor(SslPolicy::Disable).connect_options();
        assert_eq!(options.get_host(), "localhost");
        assert_eq!(options.get_port(), 5432);
        assert_eq!(options.get_username(), "app");
        assert_eq!(options.get_database(), Some("appdb"));
    }

    #[test]
    fn test_descriptor_quotes_awkward_values() {
        let credentials = Credentials {
            password: r"it's a\secret".to_string(),
            dbname: String::new(),
            ..creds()
        };
        let descriptor = credentials.descriptor(SslPolicy::Disable);
        assert_eq!(
            descriptor.to_string(),
            r"host=localhost port=5432 user=app password='it\'s a\\secret' dbname='' sslmode=disable"
        );
    }

    #[test]
    fn test_connect_options_ignore_libpq_environment() {
        std::env::set_var("PGHOST", "leaked.invalid");
        std::env::set_var("PGUSER", "leaked_user");
        std::env::set_var("PGDATABASE", "leaked_db");

        let source = EnvSource::from_map([("PG_APP_PORT", "5433")]);
        let credentials = Credentials::resolve(Backend::Primary, &source).unwrap();
        let options = credentials.descriptor(SslPolicy::Disable).connect_options();

        assert_eq!(options.get_host(), DEFAULT_HOST);
        assert_eq!(options.get_port(), 5433);
        assert_eq!(options.get_username(), DEFAULT_USER);
        assert_eq!(options.get_database(), Some(DEFAULT_USER));
    }

    #[tokio::test]
    async fn test_invalid_port_fails_before_connecting() {
        let source = EnvSource::from_map([("PG_APP_HOST", "localhost"), ("PG_APP_PORT", "abc")]);
        let err = open_database(Backend::Primary, &source, &ConnectSettings::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.ops()[0], "datastore/open_database");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connection_error() {
        // Nothing listens on port 1.
        let source = EnvSource::from_map([
            ("PG_APP_HOST", "127.0.0.1"),
            ("PG_APP_PORT", "1"),
            ("PG_APP_USERNAME", "nobody"),
            ("PG_APP_DBNAME", "nothing"),
        ]);
        let settings = ConnectSettings {
            connect_timeout: Duration::from_secs(2),
            ..Default::default()
        };

        let err = open_database(Backend::Primary, &source, &settings)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(matches!(err.root(), Cause::Open { backend: Backend::Primary, .. }));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn test_open_database_passes_ping() {
        let pool = open_database(
            Backend::Primary,
            &EnvSource::process(),
            &ConnectSettings::default(),
        )
        .await
        .expect("open primary database");

        ping(&pool).await.expect("ping after open");
    }
}
