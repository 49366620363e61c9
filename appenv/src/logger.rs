//! Logger construction
//!
//! Builds a `tracing` dispatcher from an explicit [`LoggerConfig`] instead of
//! touching process-wide state. Callers decide whether to install it
//! globally (`tracing::dispatcher::set_global_default`) or scope it
//! (`tracing::dispatcher::with_default`), so independent environments and
//! tests can log with different settings side by side.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::Dispatch;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use crate::error::{EnvError, Result};

/// Output layout for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            _ => Err(EnvError::InvalidLogFilter {
                value: s.to_string(),
                reason: "expected `compact` or `json`".to_string(),
            }),
        }
    }
}

/// Logger tunables
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Most verbose level emitted
    pub level: LevelFilter,
    /// Extra `RUST_LOG`-style directives layered over `level`
    pub directives: Option<String>,
    pub format: LogFormat,
    /// Show event targets (module paths)
    pub with_target: bool,
    /// Timestamps as whole seconds since the Unix epoch
    pub unix_timestamps: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            directives: None,
            format: LogFormat::Compact,
            with_target: false,
            unix_timestamps: true,
        }
    }
}

impl LoggerConfig {
    /// Config at `level`, given as `error`, `warn`, `info`, `debug`, `trace`
    /// or `off`.
    pub fn with_level(level: &str) -> Result<Self> {
        let level = LevelFilter::from_str(level).map_err(|e| EnvError::InvalidLogLevel {
            value: level.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            level,
            ..Default::default()
        })
    }

    fn filter(&self) -> Result<EnvFilter> {
        let directives = self.directives.as_deref().unwrap_or_default();
        EnvFilter::builder()
            .with_default_directive(self.level.into())
            .parse(directives)
            .map_err(|e| EnvError::InvalidLogFilter {
                value: directives.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Seconds since the Unix epoch.
struct UnixSeconds;

impl FormatTime for UnixSeconds {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        write!(w, "{secs}")
    }
}

/// Build a logger writing to stdout.
pub fn build_logger(config: &LoggerConfig) -> Result<Dispatch> {
    build_logger_with_writer(config, std::io::stdout)
}

/// Build a logger writing to `writer`.
pub fn build_logger_with_writer<W>(config: &LoggerConfig, writer: W) -> Result<Dispatch>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.filter()?)
        .with_target(config.with_target)
        .with_writer(writer);

    let dispatch = match (config.format, config.unix_timestamps) {
        (LogFormat::Compact, false) => Dispatch::new(builder.compact().finish()),
        (LogFormat::Compact, true) => {
            Dispatch::new(builder.compact().with_timer(UnixSeconds).finish())
        }
        (LogFormat::Json, false) => Dispatch::new(builder.json().finish()),
        (LogFormat::Json, true) => {
            Dispatch::new(builder.json().with_timer(UnixSeconds).finish())
        }
    };
    Ok(dispatch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn test_logger_config_defaults() {
        let config = LoggerConfig::default();
        assert_eq!(config.level, LevelFilter::INFO);
        assert_eq!(config.format, LogFormat::Compact);
        assert!(config.unix_timestamps);
    }

    #[test]
    fn test_with_level_rejects_unknown_level() {
        assert_eq!(LoggerConfig::with_level("debug").unwrap().level, LevelFilter::DEBUG);
        let err = LoggerConfig::with_level("loud").unwrap_err();
        assert!(matches!(err, EnvError::InvalidLogLevel { .. }));
    }

    #[test]
    fn test_level_filters_events() {
        let out = Captured::default();
        let sink = out.clone();
        let config = LoggerConfig::with_level("warn").unwrap();
        let dispatch = build_logger_with_writer(&config, move || sink.clone()).unwrap();

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::info!("hidden message");
            tracing::warn!("visible message");
        });

        let text = out.text();
        assert!(text.contains("visible message"));
        assert!(!text.contains("hidden message"));
    }

    #[test]
    fn test_json_format() {
        let out = Captured::default();
        let sink = out.clone();
        let config = LoggerConfig {
            format: LogFormat::Json,
            ..Default::default()
        };
        let dispatch = build_logger_with_writer(&config, move || sink.clone()).unwrap();

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::info!(backend = "primary", "opened");
        });

        let text = out.text();
        let line = text.lines().next().expect("one log line");
        assert!(line.starts_with('{'));
        assert!(line.contains("\"backend\":\"primary\""));
    }

    #[test]
    fn test_independent_loggers_do_not_interfere() {
        let quiet_out = Captured::default();
        let loud_out = Captured::default();
        let (q, l) = (quiet_out.clone(), loud_out.clone());

        let quiet_config = LoggerConfig::with_level("error").unwrap();
        let loud_config = LoggerConfig::with_level("debug").unwrap();
        let quiet = build_logger_with_writer(&quiet_config, move || q.clone()).unwrap();
        let loud = build_logger_with_writer(&loud_config, move || l.clone()).unwrap();

        tracing::dispatcher::with_default(&quiet, || tracing::debug!("from quiet"));
        tracing::dispatcher::with_default(&loud, || tracing::debug!("from loud"));

        assert!(quiet_out.text().is_empty());
        assert!(loud_out.text().contains("from loud"));
    }

    #[test]
    fn test_bad_directive_rejected() {
        let config = LoggerConfig {
            directives: Some("appenv=notalevel".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            build_logger(&config),
            Err(EnvError::InvalidLogFilter { .. })
        ));
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
