#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
// easier to use when using the functions as callback of foreign functions
#![allow(clippy::needless_pass_by_value)]

use std::time::Duration;

use anyhow::Context as _;
use anyhow::Result;
use anyhow::bail;
use axum::Extension;
use axum::Router;
use clap::Parser;
use clap::Subcommand;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::prelude::*;
use uuid::Uuid;

use crate::api::RequestTimeout;
use crate::auth::Authenticator;
use crate::auth::TokenService;
use crate::auth::token::IssuedToken;
use crate::config::Config;
use crate::config::parse_ttl;
use crate::notes::NoteService;
use crate::users::UserService;
use crate::users::ensure_initial_user;

mod api;
mod auth;
mod config;
mod notes;
mod storage;
mod users;

const DEFAULT_RUST_LOG: &str = "notebox=debug,tower_http=debug";

#[derive(Parser)]
#[command(name = "notebox")]
#[command(about = "Multi-tenant note service")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Run the HTTP server (default)")]
    Serve,

    #[command(about = "Print an access token for a user")]
    MintToken {
        #[arg(long, help = "ID of the user the token is for")]
        user: Uuid,
        #[arg(long, help = "Validity in seconds, defaults to `TOKEN_TTL`")]
        ttl: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_environment();
    setup_tracing();

    let config = Config::from_env()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config).await,
        Command::MintToken { user, ttl } => mint_token(&config, &user, ttl),
    }
}

async fn serve(config: &Config) -> Result<()> {
    let app = setup_app(config).await?;

    let listener = TcpListener::bind(config.server_address)
        .await
        .with_context(|| format!("Could not bind to {}", config.server_address))?;
    tracing::info!("Listening on {}", config.server_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn mint_token(config: &Config, user_id: &Uuid, ttl: Option<i64>) -> Result<()> {
    let token = issue_token(config, user_id, ttl)?;

    println!("{}", serde_json::to_string(&token)?);

    Ok(())
}

/// Issue a token the running server accepts
///
/// # Errors
///
/// Will return `Err` when no signing key is configured or the ttl is out of range
fn issue_token(config: &Config, user_id: &Uuid, ttl: Option<i64>) -> Result<IssuedToken> {
    if config.generated_signing_key {
        bail!("`TOKEN_SIGNING_KEY` must be set to mint tokens");
    }

    let token_service = TokenService::new(&config.token_signing_key)?;
    let ttl = match ttl {
        Some(seconds) => parse_ttl(seconds).context("Invalid `--ttl`")?,
        None => config.token_ttl,
    };

    Ok(token_service.issue(user_id, ttl)?)
}

/// Create and setup the app with its dependencies
///
/// # Errors
///
/// Will return `Err` if any of its dependencies fail to load:
/// - Token service (signing key too short)
/// - Storage connection
/// - Initial user setup
pub async fn setup_app(config: &Config) -> Result<Router> {
    let token_service = TokenService::new(&config.token_signing_key)?;

    let storage = storage::setup(&config.database_dsn)
        .await
        .context("Could not setup storage")?;

    ensure_initial_user(storage.users.as_ref(), &token_service, config).await?;

    let note_service = NoteService::new(storage.notes, UserService::new(storage.users));

    Ok(create_router(
        note_service,
        Authenticator::new(token_service),
        config.request_timeout,
    ))
}

/// Create the router for the note service
fn create_router(
    note_service: NoteService,
    authenticator: Authenticator,
    request_timeout: Option<Duration>,
) -> Router {
    api::router()
        .layer(TraceLayer::new_for_http())
        .layer(Extension(note_service))
        .layer(Extension(authenticator))
        .layer(Extension(RequestTimeout(request_timeout)))
}

fn setup_environment() {
    dotenvy::dotenv().ok();
}

fn setup_tracing() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::registry;

    registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_RUST_LOG.into()),
        ))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Resolves on Ctrl+C or, on unix, SIGTERM
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Could not listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Terminate signal received, starting graceful shutdown");
}
