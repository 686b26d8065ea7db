use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;

use crate::error::{IndexError, Result};

const CONFIG_FILE: &str = "config.toml";
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 20;
const DEFAULT_STAT_CONCURRENCY: usize = 4;
const ENV_PREFIX: &str = "OCFL_INDEX_";

/// Resolved configuration for the index service, after merging the TOML file, CLI flags, and
/// `OCFL_INDEX_` environment variables, in that increasing order of precedence.
#[derive(Debug, Clone)]
pub struct Config {
    pub refresh_interval: Duration,
    pub stat_concurrency: usize,
    pub database_uri: String,
    pub backing_store_location: String,
}

/// The raw, partially-populated shape loaded from `config.toml` or individual overrides. Every
/// field is optional; only `resolve()` produces a fully-populated `Config`, failing loudly if
/// the database URI or backing-store location is still unset.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, default)]
pub struct PartialConfig {
    pub refresh_interval_secs: Option<u64>,
    pub stat_concurrency: Option<usize>,
    pub database_uri: Option<String>,
    pub backing_store_location: Option<String>,
}

impl PartialConfig {
    pub fn new() -> Self {
        Self::default()
    }

    fn merge(self, overrides: PartialConfig) -> Self {
        Self {
            refresh_interval_secs: overrides.refresh_interval_secs.or(self.refresh_interval_secs),
            stat_concurrency: overrides.stat_concurrency.or(self.stat_concurrency),
            database_uri: overrides.database_uri.or(self.database_uri),
            backing_store_location: overrides
                .backing_store_location
                .or(self.backing_store_location),
        }
    }

    /// Merges in values supplied via `OCFL_INDEX_*` environment variables, which take precedence
    /// over everything already resolved.
    fn merge_env(self) -> Self {
        let env = PartialConfig {
            refresh_interval_secs: env_var("REFRESH_INTERVAL_SECS")
                .and_then(|v| v.parse().ok()),
            stat_concurrency: env_var("STAT_CONCURRENCY").and_then(|v| v.parse().ok()),
            database_uri: env_var("DATABASE_URI"),
            backing_store_location: env_var("BACKING_STORE_LOCATION"),
        };
        self.merge(env)
    }

    /// Finalizes the configuration, applying defaults for optional fields and erroring out if
    /// the required ones -- database URI and backing-store location -- are still unset.
    pub fn resolve(self) -> Result<Config> {
        let resolved = self.merge_env();

        let database_uri = resolved.database_uri.ok_or_else(|| {
            IndexError::InvalidConfiguration(
                "No database URI was configured. Set it in config.toml, pass --database, \
                or set OCFL_INDEX_DATABASE_URI."
                    .to_string(),
            )
        })?;

        let backing_store_location = resolved.backing_store_location.ok_or_else(|| {
            IndexError::InvalidConfiguration(
                "No backing store location was configured. Set it in config.toml, pass --root, \
                or set OCFL_INDEX_BACKING_STORE_LOCATION."
                    .to_string(),
            )
        })?;

        Ok(Config {
            refresh_interval: Duration::from_secs(
                resolved
                    .refresh_interval_secs
                    .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS),
            ),
            stat_concurrency: resolved
                .stat_concurrency
                .unwrap_or(DEFAULT_STAT_CONCURRENCY),
            database_uri,
            backing_store_location,
        })
    }
}

fn env_var(suffix: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, suffix)).ok()
}

/// Loads `config.toml` from the platform config directory, if present, and merges in the
/// supplied CLI-flag overrides. Does not apply environment variables or validate required
/// fields; call `PartialConfig::resolve` on the result to do that.
pub fn load_config(overrides: PartialConfig) -> Result<PartialConfig> {
    let file_config = match config_path() {
        Some(path) if path.exists() => parse_config(&path)?,
        _ => PartialConfig::new(),
    };
    Ok(file_config.merge(overrides))
}

/// The path to the index service's config file. The file may not exist.
pub fn config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

/// Reference to the index service's project directories. These do **not** necessarily exist.
pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "ocfl-index", "ocfl-index")
}

fn parse_config(config_file: impl AsRef<Path>) -> Result<PartialConfig> {
    let mut buffer = Vec::new();
    fs::File::open(config_file.as_ref())?.read_to_end(&mut buffer)?;
    let raw: HashMap<String, toml::Value> = toml::from_slice(&buffer)?;
    let merged = toml::Value::Table(raw.into_iter().collect());
    Ok(merged.try_into().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_file_config() {
        let file_config = PartialConfig {
            refresh_interval_secs: Some(10),
            stat_concurrency: Some(2),
            database_uri: Some("file.db".to_string()),
            backing_store_location: None,
        };
        let cli_overrides = PartialConfig {
            stat_concurrency: Some(8),
            backing_store_location: Some("/repo".to_string()),
            ..PartialConfig::new()
        };

        let merged = file_config.merge(cli_overrides);
        assert_eq!(Some(10), merged.refresh_interval_secs);
        assert_eq!(Some(8), merged.stat_concurrency);
        assert_eq!(Some("/repo".to_string()), merged.backing_store_location);
    }

    #[test]
    fn missing_required_fields_is_invalid_configuration() {
        let result = PartialConfig::new().resolve();
        assert!(matches!(result, Err(IndexError::InvalidConfiguration(_))));
    }

    #[test]
    fn defaults_are_applied_when_unset() {
        let config = PartialConfig {
            database_uri: Some(":memory:".to_string()),
            backing_store_location: Some("/repo".to_string()),
            ..PartialConfig::new()
        }
        .resolve()
        .unwrap();

        assert_eq!(Duration::from_secs(20), config.refresh_interval);
        assert_eq!(4, config.stat_concurrency);
    }
}
