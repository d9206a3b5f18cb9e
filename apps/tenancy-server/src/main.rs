mod config;
mod logging;
mod notes;
mod routes;
mod shutdown;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tenancy_db::{Db, TracingAuditSink};
use tenant_resolver::TenancyModule;

use crate::config::AppConfig;

/// Tenancy Server - tenant-isolated HTTP host over a shared database
#[derive(Parser)]
#[command(name = "tenancy-server")]
#[command(about = "Tenancy Server - tenant-isolated HTTP host over a shared database")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port override for HTTP server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print effective configuration (JSON) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Run,
    /// Validate configuration and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // defaults -> YAML -> env (TENANCY__*) -> CLI
    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_cli_overrides(cli.port, cli.verbose);

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    logging::init(&config.logging);
    tracing::info!(bind_addr = %config.server.bind_addr, "tenancy server starting");

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(&config).await,
        Commands::Check => {
            check_config(&config);
            Ok(())
        }
    }
}

fn check_config(config: &AppConfig) {
    tracing::info!(
        base_domain = %config.tenancy.base_domain,
        reserved = config.tenancy.reserved_keys.len(),
        "configuration is valid"
    );
    println!("Configuration is valid");
}

async fn run_server(config: &AppConfig) -> Result<()> {
    let db = Db::connect(&config.db)
        .await
        .context("failed to connect to database")?
        .with_audit_sink(Arc::new(TracingAuditSink));
    db.migrate().await.context("failed to apply migrations")?;
    db.register_entity::<notes::Entity>()
        .await
        .context("failed to prepare notes table")?;
    tracing::info!(engine = db.engine(), "database ready");

    let module = TenancyModule::new(&db, &config.tenancy);
    let app = routes::router(db.guard(), &module, config.server.trust_subject_headers);

    let listener = tokio::net::TcpListener::bind(config.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_addr))?;
    tracing::info!(addr = %config.server.bind_addr, "listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            if let Err(e) = shutdown::wait_for_shutdown().await {
                tracing::error!(error = %e, "signal handling failed, shutting down");
            }
        })
        .await
        .context("server error")?;

    tracing::info!("tenancy server stopped");
    Ok(())
}
