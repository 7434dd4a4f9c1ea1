//! Configuration management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{self, Context, Result};

use crate::services::rate_limiter::ThrottleConfig;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// NATS server URL
    pub nats_url: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// JWT secret key for token signing/validation
    pub jwt_secret: String,

    /// Login attempts allowed per window and email
    pub login_throttle: ThrottleConfig,

    /// Target directory of `export` on the command line
    pub export_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (the process environment in production)
    pub fn from_lookup<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let nats_url = var("NATS_URL").unwrap_or_else(|| "nats://localhost:4222".to_string());

        let database_url = var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let jwt_secret = var("JWT_SECRET")
            .context("JWT_SECRET must be set, generate one with: openssl rand -base64 48")?;

        if jwt_secret.len() < 32 {
            anyhow::bail!(
                "JWT_SECRET must be at least 32 bytes (current: {} bytes). Generate one with: openssl rand -base64 48",
                jwt_secret.len()
            );
        }

        let defaults = ThrottleConfig::default();
        let max_attempts = match var("LOGIN_MAX_ATTEMPTS") {
            Some(v) => v.trim().parse::<u32>().context("LOGIN_MAX_ATTEMPTS must be a positive integer")?,
            None => defaults.max_attempts,
        };
        let window = match var("LOGIN_WINDOW_SECS") {
            Some(v) => Duration::from_secs(
                v.trim().parse::<u64>().context("LOGIN_WINDOW_SECS must be a number of seconds")?,
            ),
            None => defaults.window,
        };
        if max_attempts == 0 {
            anyhow::bail!("LOGIN_MAX_ATTEMPTS must be at least 1");
        }

        let export_dir = var("EXPORT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            nats_url,
            database_url,
            jwt_secret,
            login_throttle: ThrottleConfig { max_attempts, window },
            export_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "test-secret-key-for-jwt-at-least-32-bytes-long";

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_apply() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://test"),
            ("JWT_SECRET", SECRET),
        ]))
        .unwrap();

        assert_eq!(config.nats_url, "nats://localhost:4222");
        assert_eq!(config.login_throttle, ThrottleConfig::default());
        assert_eq!(config.export_dir, PathBuf::from("."));
    }

    #[test]
    fn test_missing_database_url_fails() {
        let result = Config::from_lookup(lookup(&[("JWT_SECRET", SECRET)]));
        assert!(result.is_err());
    }

    #[test]
    fn test_short_jwt_secret_rejected() {
        let result = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://test"),
            ("JWT_SECRET", "too-short"),
        ]));
        assert!(result.unwrap_err().to_string().contains("at least 32 bytes"));
    }

    #[test]
    fn test_throttle_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://test"),
            ("JWT_SECRET", SECRET),
            ("LOGIN_MAX_ATTEMPTS", "3"),
            ("LOGIN_WINDOW_SECS", "300"),
            ("EXPORT_DIR", "/tmp/exports"),
        ]))
        .unwrap();

        assert_eq!(config.login_throttle.max_attempts, 3);
        assert_eq!(config.login_throttle.window, Duration::from_secs(300));
        assert_eq!(config.export_dir, PathBuf::from("/tmp/exports"));
    }

    #[test]
    fn test_invalid_throttle_values_rejected() {
        let base = [("DATABASE_URL", "postgres://test"), ("JWT_SECRET", SECRET)];

        let zero = [base[0], base[1], ("LOGIN_MAX_ATTEMPTS", "0")];
        assert!(Config::from_lookup(lookup(&zero)).is_err());

        let garbage = [base[0], base[1], ("LOGIN_WINDOW_SECS", "soon")];
        assert!(Config::from_lookup(lookup(&garbage)).is_err());
    }

    #[test]
    #[ignore] // requires --test-threads=1 due to env var race
    fn test_from_env_reads_process_environment() {
        std::env::set_var("DATABASE_URL", "postgres://env");
        std::env::set_var("JWT_SECRET", SECRET);

        let config = Config::from_env().unwrap();
        assert_eq!(config.database_url, "postgres://env");
    }
}
