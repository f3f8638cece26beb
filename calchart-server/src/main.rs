//! calchart-server - Calchart web backend
//!
//! Serves the login, home and editor pages, their POST actions, viewer
//! downloads, help pages and media. Also carries the operational commands
//! for migrating the database and creating local accounts.

use std::io::BufRead;
use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use tokio::signal;
use tracing::{error, info, warn};

use calchart_common::config::{ConfigOverrides, ServerConfig, TomlConfig, ROOT_FOLDER_ENV};
use calchart_server::db::{init_database, sessions, users};
use calchart_server::show_versions;
use calchart_server::storage::FileStorage;
use calchart_server::{build_router, AppState};

/// Command-line arguments for calchart-server
#[derive(Parser, Debug)]
#[command(name = "calchart-server")]
#[command(about = "Web backend for the Calchart show editor")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "CALCHART_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding the database, media and help pages
    #[arg(short, long, env = ROOT_FOLDER_ENV)]
    root_folder: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "CALCHART_BIND")]
    bind: Option<IpAddr>,

    /// Port to listen on
    #[arg(short, long, env = "CALCHART_PORT")]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the web server (default)
    Serve,
    /// Apply schema migrations and show data steps, then exit
    Migrate,
    /// Create a local account
    CreateUser {
        username: String,
        /// Password; read from stdin when omitted
        #[arg(long, env = "CALCHART_PASSWORD")]
        password: Option<String>,
        /// Committee membership, repeatable (e.g. --committee STUNT)
        #[arg(long = "committee")]
        committees: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,calchart_server=info,tower_http=info".into()),
        )
        .init();

    // Build identification first, before any database work
    info!(
        "Starting calchart-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let cli = Cli::parse();

    let toml_config = TomlConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    let overrides = ConfigOverrides {
        root_folder: cli.root_folder.clone(),
        bind_address: cli.bind,
        port: cli.port,
    };
    let config = ServerConfig::resolve(&overrides, &toml_config).context("Invalid configuration")?;

    let initializer = config.initializer();
    initializer
        .ensure_directory_exists()
        .context("Failed to create root folder")?;
    info!("Root folder: {}", config.root_folder.display());

    let db_path = initializer.database_path();
    info!("Database path: {}", db_path.display());
    let pool = match init_database(&db_path).await {
        Ok(pool) => {
            info!("✓ Database ready");
            pool
        }
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return Err(e.into());
        }
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(pool, config).await,
        Command::Migrate => {
            let storage = FileStorage::new(initializer.media_root(), config.media_url.clone());
            apply_show_steps(&pool, &storage).await?;
            info!("✓ Migration complete");
            Ok(())
        }
        Command::CreateUser {
            username,
            password,
            committees,
        } => {
            let password = match password {
                Some(password) => password,
                None => read_password()?,
            };
            let user = users::create_local_user(&pool, &username, &password, &committees)
                .await
                .with_context(|| format!("Failed to create user {}", username))?;
            info!("✓ Created user {} (committees: {:?})", user.username, user.committees);
            Ok(())
        }
    }
}

async fn serve(pool: SqlitePool, config: ServerConfig) -> Result<()> {
    let bind_addr = config.bind_addr;
    let state = AppState::new(pool, config);

    apply_show_steps(&state.db, &state.storage).await?;

    let purged = sessions::purge_expired_sessions(&state.db, Utc::now()).await?;
    if purged > 0 {
        info!("Removed {} expired sessions", purged);
    }

    if state.config.members_only_enabled() {
        info!("Members Only login enabled");
    } else {
        info!("Members Only login disabled; local accounts only");
    }

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    info!("calchart-server listening on http://{}", bind_addr);
    info!("Health check: http://{}/health", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn apply_show_steps(pool: &SqlitePool, storage: &FileStorage) -> Result<()> {
    let report = show_versions::run_pending_steps(pool, storage)
        .await
        .context("Failed to apply show data steps")?;
    if report.shows_skipped > 0 {
        warn!("{} shows could not be updated", report.shows_skipped);
    }
    Ok(())
}

/// First line of stdin, without the line ending
fn read_password() -> Result<String> {
    eprintln!("Password:");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password")?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("Password must not be empty");
    }
    Ok(password)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
