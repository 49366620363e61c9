//! appenv CLI - provision the datastore and report which backends answer
//!
//! Reads `PG_APP_*`, `PG_LOG_*` and `CACHE_URL` from the environment (after
//! loading `.env` if present).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use appenv::datastore::{
    env_keys_for, with_cache_pool, with_logging_database, Backend, DatastoreOption,
    DatastoreSettings, SslPolicy,
};
use appenv::{config, Env, EnvName, LogFormat, LoggerConfig};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    name = "appenv",
    author,
    version,
    about = "Provision and check the application's database and cache connections"
)]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info", env = "APPENV_LOG_LEVEL")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// Load variables from this file instead of ./.env
    #[arg(long, global = true, value_name = "PATH")]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Open the configured backends and ping each one
    Check(CheckArgs),
    /// Print the environment variables a backend reads
    Keys(KeysArgs),
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// Deployment stage (production, staging, qa, dev)
    #[arg(long, default_value = "dev", env = "APPENV_NAME")]
    env: String,

    /// Also open the logging database
    #[arg(long)]
    logging_db: bool,

    /// Also build the cache pool and check out one connection
    #[arg(long)]
    cache: bool,

    /// Seconds to wait when connecting to a backend
    #[arg(long, default_value = "5")]
    timeout_secs: u64,

    /// Transport security for database connections
    #[arg(long, value_enum, default_value_t = SslArg::Disable)]
    sslmode: SslArg,
}

#[derive(Args, Debug)]
struct KeysArgs {
    /// Backend name (primary, logging)
    backend: String,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SslArg {
    Disable,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl From<SslArg> for SslPolicy {
    fn from(arg: SslArg) -> Self {
        match arg {
            SslArg::Disable => SslPolicy::Disable,
            SslArg::Prefer => SslPolicy::Prefer,
            SslArg::Require => SslPolicy::Require,
            SslArg::VerifyCa => SslPolicy::VerifyCa,
            SslArg::VerifyFull => SslPolicy::VerifyFull,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.env_file {
        Some(path) => config::load_env_file(path)?,
        None => {
            config::load_dotenv();
        }
    }

    let mut logger_config = LoggerConfig::with_level(&cli.log_level)?;
    if cli.json {
        logger_config.format = LogFormat::Json;
    }
    let logger = appenv::build_logger(&logger_config)?;
    tracing::dispatcher::set_global_default(logger.clone())
        .context("failed to install logger")?;

    match cli.command {
        Commands::Check(args) => run_check(args, logger).await,
        Commands::Keys(args) => run_keys(&args),
    }
}

async fn run_check(args: CheckArgs, logger: tracing::Dispatch) -> Result<()> {
    let name: EnvName = args.env.parse()?;

    let mut settings = DatastoreSettings::from_env()?;
    settings.connect.ssl = args.sslmode.into();
    settings.connect.connect_timeout = Duration::from_secs(args.timeout_secs);
    settings.cache.dial_timeout = Duration::from_secs(args.timeout_secs);

    let mut env = match Env::with_logger(name, logger, settings).await {
        Ok(env) => env,
        Err(e) => {
            error!(error = %e, "primary database unavailable");
            return Err(e.into());
        }
    };
    info!(env = %env.name, "primary database ready");

    let mut options: Vec<Box<dyn DatastoreOption>> = Vec::new();
    if args.logging_db {
        options.push(with_logging_database());
    }
    if args.cache {
        options.push(with_cache_pool());
    }

    let mut failed = false;
    if let Err(e) = env.datastore.apply_options(options).await {
        error!(error = %e, "option failed");
        failed = true;
    }

    for backend in Backend::ALL {
        if !env.datastore.is_provisioned(backend) {
            continue;
        }
        match env.datastore.ping(backend).await {
            Ok(()) => info!(%backend, "ping ok"),
            Err(e) => {
                error!(%backend, error = %e, "ping failed");
                failed = true;
            }
        }
    }

    if env.datastore.has_cache() {
        match env.datastore.cache_connection().await {
            Ok(_conn) => info!("cache checkout ok"),
            Err(e) => {
                error!(error = %e, "cache checkout failed");
                failed = true;
            }
        }
    }

    env.datastore.close().await;

    if failed {
        bail!("one or more backends failed");
    }
    Ok(())
}

fn run_keys(args: &KeysArgs) -> Result<()> {
    let keys = env_keys_for(&args.backend);
    if keys.is_empty() {
        bail!("unknown backend {:?}", args.backend);
    }
    for key in keys.as_array() {
        println!("{key}");
    }
    Ok(())
}
