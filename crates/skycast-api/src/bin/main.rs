//! Skycast API entry point
//!
//! # Usage
//!
//! ```bash
//! # Serve on the default port
//! skycast-api serve
//!
//! # Serve with a config file and an extra identity
//! skycast-api serve --config skycast.toml --identity reporting=REPORTING_CLIENT_ID
//!
//! # Print the identities that would be resolved
//! skycast-api identities
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use skycast_api::{bootstrap, create_router, identities_report, ConfigOverrides, ServiceConfig};
use skycast_identity::IdentitySource;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "skycast-api")]
#[command(about = "Skycast API - weather forecast and managed identity introspection")]
#[command(version)]
struct Cli {
    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "json", env = "SKYCAST_LOG_FORMAT")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long, env = "SKYCAST_HOST")]
        host: Option<String>,

        /// Timeout for managed identity token requests, in seconds
        #[arg(long)]
        token_timeout: Option<u64>,

        #[command(flatten)]
        identity: IdentityArgs,
    },

    /// Print the configured identities as JSON and exit
    Identities {
        #[command(flatten)]
        identity: IdentityArgs,
    },
}

#[derive(Args)]
struct IdentityArgs {
    /// Path to a TOML config file
    #[arg(short, long, env = "SKYCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Variable holding the default identity's client id
    #[arg(long)]
    default_identity_var: Option<String>,

    /// Named identity as NAME=ENV_VAR (repeatable)
    #[arg(long = "identity")]
    identities: Vec<IdentitySource>,
}

impl IdentityArgs {
    fn load(self, mut overrides: ConfigOverrides) -> anyhow::Result<ServiceConfig> {
        overrides.default_identity_var = self.default_identity_var;
        overrides.identities = self.identities;
        Ok(ServiceConfig::load(self.config.as_deref(), overrides)?)
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
    );

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Commands::Serve {
            port,
            host,
            token_timeout,
            identity,
        } => {
            let config = identity.load(ConfigOverrides {
                host,
                port,
                token_timeout_secs: token_timeout,
                ..Default::default()
            })?;

            let addr: SocketAddr = config.bind_address().parse()?;
            let state = Arc::new(bootstrap(&config));
            let router = create_router(state);

            tracing::info!("Starting Skycast API on {}", addr);
            tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }

        Commands::Identities { identity } => {
            let config = identity.load(ConfigOverrides::default())?;
            let report = identities_report(&config.identities, |var| std::env::var(var).ok())?;
            println!("{}", report);
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
