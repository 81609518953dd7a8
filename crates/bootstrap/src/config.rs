//! Bootstrap configuration loaded from environment variables.

use std::env;

use thiserror::Error;

use gatehouse_infra::RoleSetPolicy;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Bootstrap configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    /// Postgres connection URL; the in-memory store is used when unset
    pub database_url: Option<String>,

    /// Connection pool size
    pub database_max_connections: u32,

    /// Log level used when RUST_LOG is unset
    pub log_level: String,

    /// Populate demo data on start
    pub seed: bool,

    /// Number of demo users to seed (the admin is extra)
    pub seed_users: usize,

    /// Whether explicit role assignments may leave a user with no roles
    pub role_policy: RoleSetPolicy,
}

impl BootstrapConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5u32)?;
        if database_max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: "DATABASE_MAX_CONNECTIONS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            database_url,
            database_max_connections,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            seed: parse_or(&lookup, "GATEHOUSE_SEED", true)?,
            seed_users: parse_or(&lookup, "GATEHOUSE_SEED_USERS", 20usize)?,
            role_policy: parse_or(&lookup, "GATEHOUSE_ROLE_POLICY", RoleSetPolicy::default())?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
