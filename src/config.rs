//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (the admin token) are referenced by env-var name in the config
//! and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::types::ScrambleError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub race: RaceConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub roster: Vec<RosterEntry>,
    #[serde(default)]
    pub seed_users: Vec<SeedUser>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RaceConfig {
    /// How often the scheduler loop wakes up to re-evaluate.
    pub poll_interval_secs: u64,
    /// Offset from "now" at which a freshly scheduled race starts.
    pub race_interval_secs: u64,
    /// How long a race runs before it is finished and settled.
    pub race_duration_secs: u64,
    /// Scheduled races further out than this are treated as malformed.
    #[serde(default = "default_max_schedule_ahead")]
    pub max_schedule_ahead_secs: u64,
    /// Fixed seed for winner selection (replays and demos).
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

fn default_max_schedule_ahead() -> u64 {
    600
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// Env var that overrides `url` when set.
    #[serde(default)]
    pub url_env: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub enabled: bool,
    pub port: u16,
    /// Env var holding the token required by `/admin/*` routes.
    #[serde(default)]
    pub admin_token_env: Option<String>,
}

/// A competitor seeded into an empty `competitors` table.
#[derive(Debug, Deserialize, Clone)]
pub struct RosterEntry {
    pub name: String,
    pub odds: Decimal,
    pub lane: i64,
    #[serde(default)]
    pub colour: String,
}

/// A user seeded into an empty `users` table.
#[derive(Debug, Deserialize, Clone)]
pub struct SeedUser {
    pub name: String,
    pub balance: Decimal,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse and validate configuration from a TOML string.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.race.validate()?;
        for entry in &config.roster {
            if entry.odds < Decimal::ONE {
                return Err(ScrambleError::Config(format!(
                    "odds for '{}' must be at least 1.0, got {}",
                    entry.name, entry.odds
                ))
                .into());
            }
        }
        Ok(config)
    }

    /// Database URL after applying the env-var override.
    pub fn database_url(&self) -> String {
        self.database
            .url_env
            .as_deref()
            .and_then(|env| std::env::var(env).ok())
            .unwrap_or_else(|| self.database.url.clone())
    }

    /// Admin token, if one is configured and present in the environment.
    pub fn admin_token(&self) -> Option<SecretString> {
        let env = self.server.admin_token_env.as_deref()?;
        Self::resolve_env(env).ok().map(SecretString::new)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

impl RaceConfig {
    fn validate(&self) -> std::result::Result<(), ScrambleError> {
        let fields = [
            ("poll_interval_secs", self.poll_interval_secs),
            ("race_interval_secs", self.race_interval_secs),
            ("race_duration_secs", self.race_duration_secs),
            ("max_schedule_ahead_secs", self.max_schedule_ahead_secs),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(ScrambleError::Config(format!("race.{name} must be > 0")));
            }
        }
        if self.max_schedule_ahead_secs < self.race_interval_secs {
            return Err(ScrambleError::Config(
                "race.max_schedule_ahead_secs must not be shorter than race.race_interval_secs".into(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn race_interval(&self) -> Duration {
        Duration::from_secs(self.race_interval_secs)
    }

    pub fn race_duration(&self) -> Duration {
        Duration::from_secs(self.race_duration_secs)
    }

    pub fn max_schedule_ahead(&self) -> Duration {
        Duration::from_secs(self.max_schedule_ahead_secs)
    }
}
