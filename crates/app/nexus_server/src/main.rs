//! Nexus authentication hub server.
//!
//! Validates configuration, opens the store, bootstraps the first admin
//! account and serves the API until interrupted.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use nexus_api::AppState;
use nexus_api::config::{ApiConfig, RawConfig};
use nexus_core::auth::rate_limit::SWEEP_INTERVAL;
use nexus_core::bootstrap::ensure_default_admin;
use nexus_core::store::{MemoryStore, PgStore, Store};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// CLI arguments; every option can also come from the environment.
#[derive(Parser, Debug)]
#[command(name = "nexus_server", about = "Nexus authentication hub")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3000")]
    bind_addr: String,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/nexus"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Keep all state in process memory instead of PostgreSQL.
    #[arg(long, default_value_t = false)]
    in_memory: bool,

    /// Token signing secret, at least 32 characters.
    #[arg(long, env = "NEXUS_JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,

    /// Token lifetime such as `24h`, `30m` or `7d`.
    #[arg(long, env = "NEXUS_TOKEN_EXPIRY")]
    token_expiry: Option<String>,

    /// Deployment environment: development, production or test.
    #[arg(long = "env", env = "NEXUS_ENV")]
    environment: Option<String>,

    #[arg(long, env = "NEXUS_LOGIN_MAX_ATTEMPTS")]
    login_max_attempts: Option<u32>,

    #[arg(long, env = "NEXUS_LOGIN_WINDOW_SECS")]
    login_window_secs: Option<i64>,

    #[arg(long, env = "NEXUS_BCRYPT_COST")]
    bcrypt_cost: Option<u32>,

    /// Comma-separated proxy addresses whose forwarding headers are believed.
    #[arg(long, env = "NEXUS_TRUSTED_PROXIES")]
    trusted_proxies: Option<String>,

    /// Password for the first admin account. Generated and logged once when unset.
    #[arg(long, env = "NEXUS_BOOTSTRAP_PASSWORD", hide_env_values = true)]
    bootstrap_password: Option<String>,
}

impl Args {
    fn raw_config(&self) -> RawConfig {
        RawConfig {
            jwt_secret: self
                .jwt_secret
                .clone()
                .or_else(|| std::env::var("JWT_SECRET").ok()),
            token_expiry: self.token_expiry.clone(),
            environment: self.environment.clone(),
            login_max_attempts: self.login_max_attempts,
            login_window_secs: self.login_window_secs,
            bcrypt_cost: self.bcrypt_cost,
            trusted_proxies: self.trusted_proxies.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(
                    "info,nexus_api=debug,nexus_core=debug",
                )),
        )
        .init();

    let args = Args::parse();

    let config = match ApiConfig::new(args.raw_config()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    match run(args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "server failed");
            ExitCode::FAILURE
        }
    }
}

async fn open_store(args: &Args) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    if args.in_memory {
        warn!("using in-memory store; all state is lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    }

    info!(max_connections = args.max_connections, "connecting to database");
    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&args.database_url)
        .await?;

    info!("running database migrations");
    nexus_api::migrate(&pool).await?;
    Ok(Arc::new(PgStore::new(pool)))
}

async fn run(args: Args, config: ApiConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        version = nexus_core::version(),
        environment = %config.environment,
        bind_addr = %args.bind_addr,
        "starting nexus_server"
    );

    let store = open_store(&args).await?;
    ensure_default_admin(
        store.as_ref(),
        args.bootstrap_password.as_deref(),
        config.bcrypt_cost,
    )
    .await?;

    let state = AppState::new(store, config)?;
    let shutdown = CancellationToken::new();
    let sweeper = state
        .rate_limiter
        .spawn_sweep_task(SWEEP_INTERVAL, shutdown.clone());

    let app = nexus_api::router(state);
    let listener = tokio::net::TcpListener::bind(&args.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("interrupt received, shutting down"),
                    _ = shutdown.cancelled() => {}
                }
            }
        })
        .await;

    shutdown.cancel();
    let _ = sweeper.await;
    result?;
    Ok(())
}
