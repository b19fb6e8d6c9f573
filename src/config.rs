use crate::{debounce, dispatch};
use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const REQUIRED_VARS: [&str; 4] = [
    "IMGUR_CLIENT_ID",
    "DISCORD_WEBHOOK",
    "PLEX_HOSTNAME_PORT",
    "X_PLEX_TOKEN",
];

const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone)]
pub struct Config {
    pub imgur_client_id: String,
    pub discord_webhook: String,
    pub plex_url: String,
    pub plex_token: String,
    pub port: u16,
    pub debounce_delay: Duration,
    pub burst_capacity: usize,
    pub webhook_calls: usize,
    pub webhook_period: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow!("Missing required environment variable: {}", key))
        };

        let webhook_calls = optional(&lookup, "WEBHOOK_RATE_CALLS", dispatch::DEFAULT_CALLS).max(1);
        let webhook_period = optional(&lookup, "WEBHOOK_RATE_PERIOD_SECONDS", 0u64);
        let webhook_period = if webhook_period == 0 {
            dispatch::default_period(webhook_calls)
        } else {
            Duration::from_secs(webhook_period)
        };

        Ok(Self {
            imgur_client_id: required("IMGUR_CLIENT_ID")?,
            discord_webhook: required("DISCORD_WEBHOOK")?,
            plex_url: required("PLEX_HOSTNAME_PORT")?,
            plex_token: required("X_PLEX_TOKEN")?,
            port: optional(&lookup, "PORT", DEFAULT_PORT),
            debounce_delay: Duration::from_secs(optional(
                &lookup,
                "DEBOUNCE_SECONDS",
                debounce::DEFAULT_DELAY.as_secs(),
            )),
            burst_capacity: optional(&lookup, "BURST_CAPACITY", debounce::DEFAULT_CAPACITY).max(1),
            webhook_calls,
            webhook_period,
        })
    }

    pub fn http_client(&self) -> Result<Client> {
        let user_agent = format!("plexrate/{}", env!("CARGO_PKG_VERSION"));
        Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .build()
            .context("Failed to build HTTP client")
    }
}

fn optional<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) if raw.trim().is_empty() => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {}={:?}, using {}", key, raw, default);
            default
        }),
    }
}
