//! Runtime configuration: database URL, checkpoint/dead-letter directories,
//! and default safety limits, loaded from the environment.
//!
//! Grounded on the teacher's `casparian_protocol::config::SystemConfig`:
//! a plain struct built once at startup. Narrowed to the environment
//! variables this binary actually consumes, and with no bundled `.env`
//! loader dependency beyond `dotenvy`, which the teacher doesn't use but
//! every other example repo in the pack reaches for.

use etl_protocol::SafetyLimits;
use std::env;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),
    #[error("invalid value for environment variable {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

/// Canonical runtime configuration for the `etl` binary.
#[derive(Debug, Clone)]
pub struct SystemConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub checkpoint_dir: PathBuf,
    pub dead_letter_dir: PathBuf,
    pub default_limits: SafetyLimits,
}

impl SystemConfig {
    /// Load from the process environment, applying a `.env` file in the
    /// current directory first if one is present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let database_url = require_env("ETL_DATABASE_URL")?;
        let max_connections = env_or("ETL_MAX_CONNECTIONS", 10, "ETL_MAX_CONNECTIONS")?;
        let checkpoint_dir = env::var("ETL_CHECKPOINT_DIR")
            .unwrap_or_else(|_| "./etl_checkpoints".to_string())
            .into();
        let dead_letter_dir = env::var("ETL_DEAD_LETTER_DIR")
            .unwrap_or_else(|_| "./etl_dead_letters".to_string())
            .into();
        let default_limits = SafetyLimits {
            max_rows: env_opt("ETL_MAX_ROWS")?,
            max_duration_ms: env_opt("ETL_MAX_DURATION_MS")?,
            max_dead_letters: env_opt("ETL_MAX_DEAD_LETTERS")?,
            max_heap_mb: env_opt("ETL_MAX_HEAP_MB")?,
        };

        Ok(Self { database_url, max_connections, checkpoint_dir, dead_letter_dir, default_limits })
    }
}

fn require_env(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingEnv(name))
}

fn env_or(name: &'static str, default: u32, label: &'static str) -> Result<u32, ConfigError> {
    match env::var(name) {
        Ok(value) => {
            value.parse().map_err(|_| ConfigError::InvalidEnv { name: label, value })
        }
        Err(_) => Ok(default),
    }
}

fn env_opt(name: &'static str) -> Result<Option<u64>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { name, value }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_opt_absent_is_none() {
        env::remove_var("ETL_TEST_UNSET_LIMIT");
        assert_eq!(env_opt("ETL_TEST_UNSET_LIMIT").unwrap(), None);
    }

    #[test]
    fn env_opt_invalid_is_an_error() {
        env::set_var("ETL_TEST_BAD_LIMIT", "not-a-number");
        assert!(env_opt("ETL_TEST_BAD_LIMIT").is_err());
        env::remove_var("ETL_TEST_BAD_LIMIT");
    }
}
