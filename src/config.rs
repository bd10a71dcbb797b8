//! Configuration, read from the environment

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context as _;
use anyhow::Result;
use chrono::TimeDelta;
use rand_core::OsRng;
use rand_core::TryRngCore;

use crate::auth::token::MIN_KEY_LENGTH;

const DEFAULT_ADDRESS: &str = "0.0.0.0:6000";
const DEFAULT_TOKEN_TTL_SECONDS: i64 = 3600;
const DEFAULT_INITIAL_USER_NAME: &str = "admin";
const DEFAULT_INITIAL_USER_EMAIL: &str = "admin@localhost";

/// Everything the app needs to start
#[derive(Clone, Debug)]
pub struct Config {
    /// Address to bind the HTTP server to
    pub server_address: SocketAddr,

    /// Secret for signing tokens, at least 32 bytes
    pub token_signing_key: Vec<u8>,

    /// The signing key was generated for this run only
    pub generated_signing_key: bool,

    /// Postgres connection string, empty for in-memory storage
    pub database_dsn: String,

    /// Deadline for handling a single request, if any
    pub request_timeout: Option<Duration>,

    /// How long issued tokens stay valid
    pub token_ttl: TimeDelta,

    /// Name of the user created on an empty installation
    pub initial_user_name: String,

    /// Email of the user created on an empty installation
    pub initial_user_email: String,
}

impl Config {
    /// Read the configuration from the process environment
    ///
    /// # Errors
    ///
    /// Will return `Err` when a variable is set to something that can not be parsed
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through `lookup`, which maps variable names to values
    ///
    /// Empty values count as not set
    ///
    /// # Errors
    ///
    /// Will return `Err` when a variable is set to something that can not be parsed
    pub fn from_lookup<L>(lookup: L) -> Result<Self>
    where
        L: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.is_empty());

        let mut server_address = var("ADDRESS")
            .as_deref()
            .unwrap_or(DEFAULT_ADDRESS)
            .parse::<SocketAddr>()
            .context("Invalid `ADDRESS`")?;

        // optional override of just the port
        if let Some(port) = parse_var::<u16>(&var, "PORT")? {
            server_address.set_port(port);
        }

        let (token_signing_key, generated_signing_key) = match var("TOKEN_SIGNING_KEY") {
            Some(key) => (key.into_bytes(), false),
            None => {
                tracing::warn!(
                    "`TOKEN_SIGNING_KEY` is not set, generating a temporary one, tokens will not survive a restart"
                );
                (generate_signing_key()?, true)
            }
        };

        let request_timeout = parse_var::<u64>(&var, "REQUEST_TIMEOUT")?
            .map(Duration::from_secs)
            .map(|timeout| {
                // every request adds it to the current instant
                tokio::time::Instant::now()
                    .checked_add(timeout)
                    .map(|_| timeout)
                    .context("Invalid `REQUEST_TIMEOUT`: out of range")
            })
            .transpose()?;

        let token_ttl = parse_ttl(
            parse_var::<i64>(&var, "TOKEN_TTL")?.unwrap_or(DEFAULT_TOKEN_TTL_SECONDS),
        )
        .context("Invalid `TOKEN_TTL`")?;

        Ok(Self {
            server_address,
            token_signing_key,
            generated_signing_key,
            database_dsn: var("DATABASE_URL").unwrap_or_default(),
            request_timeout,
            token_ttl,
            initial_user_name: var("INITIAL_USER_NAME")
                .unwrap_or_else(|| DEFAULT_INITIAL_USER_NAME.to_string()),
            initial_user_email: var("INITIAL_USER_EMAIL")
                .unwrap_or_else(|| DEFAULT_INITIAL_USER_EMAIL.to_string()),
        })
    }
}

/// Parse a variable when it is set
fn parse_var<T>(var: impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(name)
        .map(|value| value.parse::<T>())
        .transpose()
        .with_context(|| format!("Invalid `{name}`"))
}

/// Token validity from seconds
///
/// # Errors
///
/// Will return `Err` for more seconds than a [`TimeDelta`] holds
pub fn parse_ttl(seconds: i64) -> Result<TimeDelta> {
    TimeDelta::try_seconds(seconds)
        .with_context(|| format!("{seconds} seconds is out of range"))
}

/// Random hex encoded key, long enough for the token service
fn generate_signing_key() -> Result<Vec<u8>> {
    let mut bytes = [0u8; MIN_KEY_LENGTH];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("Could not generate a signing key")?;

    Ok(bytes
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<String>()
        .into_bytes())
}
