//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! malformed. Sensitive values are wrapped in `secrecy::SecretString`.

use crate::error::{Error, Result};
use crate::model::ScopeMode;
use alloy::primitives::Address;
use secrecy::SecretString;
use std::str::FromStr;
use std::time::Duration;

/// Poll interval of the watch loop when `POLL_INTERVAL_SECS` is unset.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(12);

#[derive(Debug)]
pub struct Config {
    pub rpc_url: String,
    pub sequencer_address: Address,
    pub database_url: SecretString,
    /// Consecutive workable observations before a job is reported.
    pub threshold: u64,
    pub discord_webhook_url: Option<SecretString>,
    pub scope_mode: ScopeMode,
    pub poll_interval: Duration,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let threshold: u64 = required_parsed("CONSEQUENT_WORKABLE_JOBS_LIMIT")?;
        if threshold == 0 {
            return Err(Error::Config(
                "CONSEQUENT_WORKABLE_JOBS_LIMIT must be at least 1".to_string(),
            ));
        }

        let scope_mode = match optional_var("SCOPE_MODE") {
            Some(mode) => parse_var("SCOPE_MODE", &mode)?,
            None => ScopeMode::default(),
        };

        let poll_interval = match optional_var("POLL_INTERVAL_SECS") {
            Some(secs) => match parse_var("POLL_INTERVAL_SECS", &secs)? {
                0 => {
                    return Err(Error::Config(
                        "POLL_INTERVAL_SECS must be at least 1".to_string(),
                    ));
                }
                secs => Duration::from_secs(secs),
            },
            None => DEFAULT_POLL_INTERVAL,
        };

        Ok(Self {
            rpc_url: required_var("RPC_NODE_URL")?,
            sequencer_address: required_parsed("SEQUENCER_ADDRESS")?,
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            threshold,
            discord_webhook_url: optional_var("DISCORD_WEBHOOK_URL").map(SecretString::from),
            scope_mode,
            poll_interval,
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    optional_var(name)
        .ok_or_else(|| Error::Config(format!("required environment variable {name} is not set")))
}

fn required_parsed<T>(name: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_var(name, &required_var(name)?)
}

/// Unset and blank variables both count as absent.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| Error::Config(format!("invalid {name} {raw:?}: {e}")))
}
