use std::env;
use std::time::Duration;
use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database: DatabaseConfig,
    pub rate_limit: RateLimitConfig,
    pub trusted_proxy_hops: usize,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: usize,
    pub idle_timeout: Duration,
    pub connection_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(15 * 60),
            max_requests: 500,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = parse_or(&lookup, "PORT", 3000u16)
            .context("PORT must be a valid port number")?;

        let database = DatabaseConfig::from_lookup(&lookup)?;

        let rate_limit = RateLimitConfig {
            window: Duration::from_secs(
                parse_or(&lookup, "RATE_LIMIT_WINDOW_SECS", 15 * 60u64)
                    .context("RATE_LIMIT_WINDOW_SECS must be a valid number of seconds")?,
            ),
            max_requests: parse_or(&lookup, "RATE_LIMIT_MAX_REQUESTS", 500usize)
                .context("RATE_LIMIT_MAX_REQUESTS must be a valid number")?,
        };

        let trusted_proxy_hops = parse_or(&lookup, "TRUST_PROXY_HOPS", 3usize)
            .context("TRUST_PROXY_HOPS must be a valid number")?;

        let config = Config {
            port,
            database,
            rate_limit,
            trusted_proxy_hops,
        };
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("PORT must be greater than 0");
        }

        self.database.validate()?;

        if self.rate_limit.window.is_zero() {
            anyhow::bail!("Rate limit window must be greater than 0");
        }

        if self.rate_limit.max_requests == 0 {
            anyhow::bail!("Rate limit max requests must be greater than 0");
        }

        Ok(())
    }
}

impl DatabaseConfig {
    fn from_lookup<F>(lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .context("DATABASE_URL is not defined")?;

        let max_connections = parse_or(lookup, "DATABASE_MAX_CONNECTIONS", 10usize)
            .context("DATABASE_MAX_CONNECTIONS must be a valid number")?;

        let idle_timeout_secs = parse_or(lookup, "DATABASE_IDLE_TIMEOUT", 30u64)
            .context("DATABASE_IDLE_TIMEOUT must be a valid number of seconds")?;

        let connection_timeout_secs = parse_or(lookup, "DATABASE_CONNECTION_TIMEOUT", 30u64)
            .context("DATABASE_CONNECTION_TIMEOUT must be a valid number of seconds")?;

        Ok(DatabaseConfig {
            url,
            max_connections,
            idle_timeout: Duration::from_secs(idle_timeout_secs),
            connection_timeout: Duration::from_secs(connection_timeout_secs),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.url.starts_with("postgresql://") && !self.url.starts_with("postgres://") {
            anyhow::bail!("DATABASE_URL must start with 'postgresql://' or 'postgres://'");
        }

        if self.max_connections == 0 {
            anyhow::bail!("Max connections must be greater than 0");
        }

        if self.idle_timeout.is_zero() {
            anyhow::bail!("Idle timeout must be greater than 0");
        }

        if self.connection_timeout.is_zero() {
            anyhow::bail!("Connection timeout must be greater than 0");
        }

        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => Ok(raw.trim().parse::<T>()?),
        None => Ok(default),
    }
}
