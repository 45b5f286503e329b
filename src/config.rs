use std::{fmt::Display, str::FromStr, time::Duration};

use anyhow::{anyhow, Context};
use axum::http::Uri;

/// Runtime configuration, read from the environment (and `.env` via dotenv).
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub origin: Uri,
    pub database_url: String,
    pub db_max_connections: u32,
    /// Interval between `: ping` comments on idle live streams.
    pub keep_alive: Duration,
    /// Per-session delivery queue bound; a session that falls this far behind is dropped.
    pub session_queue_capacity: usize,
    pub session_idle: time::Duration,
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let port = parse_or(&lookup, "PORT", 3000u16)?;
        let origin = lookup("ORIGIN").unwrap_or_else(|| format!("http://localhost:{port}/"));
        let origin: Uri = origin.parse().with_context(|| format!("invalid ORIGIN {origin:?}"))?;
        if origin.scheme().is_none() || origin.host().is_none() {
            return Err(anyhow!("ORIGIN must be absolute, got {origin}"));
        }

        // an explicit port in the origin wins
        let port = origin.port_u16().unwrap_or(port);

        let session_queue_capacity = parse_or(&lookup, "SESSION_QUEUE_CAPACITY", 32usize)?;
        if session_queue_capacity == 0 {
            return Err(anyhow!("SESSION_QUEUE_CAPACITY must be at least 1"));
        }

        let keep_alive = Duration::from_secs(parse_or(&lookup, "KEEP_ALIVE_SECS", 15)?);
        if keep_alive.is_zero() {
            return Err(anyhow!("KEEP_ALIVE_SECS must be at least 1"));
        }

        Ok(Config {
            port,
            origin,
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://whisperline.db?mode=rwc".to_owned()),
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 16)?,
            keep_alive,
            session_queue_capacity,
            session_idle: time::Duration::minutes(parse_or(&lookup, "SESSION_IDLE_MINUTES", 60 * 24 * 14)?),
            log_json: parse_or(&lookup, "LOG_JSON", false)?,
        })
    }

    /// Dev login is only served when running against localhost.
    pub fn is_local(&self) -> bool {
        self.origin.host() == Some("localhost")
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|err| anyhow!("invalid {key} {raw:?}: {err}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.keep_alive, Duration::from_secs(15));
        assert_eq!(config.session_queue_capacity, 32);
        assert!(config.is_local());
        assert!(!config.log_json);
    }

    #[test]
    fn origin_port_overrides_port() {
        let config = config(&[("PORT", "8080"), ("ORIGIN", "https://chat.example.com:4443/")]).unwrap();
        assert_eq!(config.port, 4443);
        assert!(!config.is_local());
    }

    #[test]
    fn rejects_garbage() {
        assert!(config(&[("PORT", "eighty")]).is_err());
        assert!(config(&[("ORIGIN", "/relative")]).is_err());
        assert!(config(&[("SESSION_QUEUE_CAPACITY", "0")]).is_err());
        assert!(config(&[("KEEP_ALIVE_SECS", "0")]).is_err());
        assert!(config(&[("KEEP_ALIVE_SECS", "-5")]).is_err());
    }
}
