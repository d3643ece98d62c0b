//! Configuration file management for potluck.
//!
//! Provides a TOML-based config file at `~/.config/potluck/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use potluck_core::worker::WorkerConfig;
use potluck_db::config::DbConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    #[serde(default)]
    pub worker: WorkerSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

/// Worker tuning. Every key is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSection {
    pub sweep_interval_secs: u64,
    pub attempt_timeout_secs: u64,
    pub max_concurrent_plans: usize,
    pub sweep_batch_size: i64,
    pub vote_channel: String,
    pub change_channel: String,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

impl From<&WorkerConfig> for WorkerSection {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            sweep_interval_secs: config.sweep_interval.as_secs(),
            attempt_timeout_secs: config.attempt_timeout.as_secs(),
            max_concurrent_plans: config.max_concurrent_plans,
            sweep_batch_size: config.sweep_batch_size,
            vote_channel: config.vote_channel.clone(),
            change_channel: config.change_channel.clone(),
        }
    }
}

impl WorkerSection {
    /// Convert to the worker's runtime config. Zero sizes are raised to one.
    pub fn to_worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            sweep_interval: Duration::from_secs(self.sweep_interval_secs.max(1)),
            attempt_timeout: Duration::from_secs(self.attempt_timeout_secs.max(1)),
            max_concurrent_plans: self.max_concurrent_plans.max(1),
            sweep_batch_size: self.sweep_batch_size.max(1),
            vote_channel: self.vote_channel.clone(),
            change_channel: self.change_channel.clone(),
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the potluck config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/potluck` or `~/.config/potluck`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("potluck");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("potluck")
}

/// Return the path to the potluck config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse a config file. Returns `Ok(None)` if it does not exist.
pub fn load_config_from(path: &Path) -> Result<Option<ConfigFile>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("failed to read config file at {}", path.display()));
        }
    };
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(Some(config))
}

/// Serialize and write a config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config_to(path: &Path, config: &ConfigFile) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    // The URL may carry a password.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

/// Write the config file at the default location.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    save_config_to(&config_path(), config)
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct PotluckConfig {
    pub db_config: DbConfig,
    pub worker_config: WorkerConfig,
}

impl PotluckConfig {
    /// Resolve configuration from the default config file location.
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        Self::resolve_with(cli_db_url, load_config_from(&config_path())?)
    }

    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `cli_db_url` > `POTLUCK_DATABASE_URL` env > `config_file.database.url` > `DbConfig::DEFAULT_URL`
    /// - Worker: `config_file.worker` > `WorkerConfig::default()`
    pub fn resolve_with(cli_db_url: Option<&str>, file_config: Option<ConfigFile>) -> Result<Self> {
        let db_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Ok(url) = std::env::var(DbConfig::URL_ENV_VAR) {
            url
        } else if let Some(ref cfg) = file_config {
            cfg.database.url.clone()
        } else {
            DbConfig::DEFAULT_URL.to_string()
        };
        let db_config = DbConfig::new(db_url);

        let worker_config = file_config
            .map(|cfg| cfg.worker.to_worker_config())
            .unwrap_or_default();

        Ok(Self {
            db_config,
            worker_config,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        crate::test_util::lock_env()
    }

    fn sample(url: &str) -> ConfigFile {
        ConfigFile {
            database: DatabaseSection {
                url: url.to_string(),
            },
            worker: WorkerSection::default(),
        }
    }

    #[test]
    fn save_and_load_config_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("potluck").join("config.toml");

        let mut original = sample("postgresql://testhost:5432/testdb");
        original.worker.max_concurrent_plans = 9;
        save_config_to(&path, &original).unwrap();

        let loaded = load_config_from(&path).unwrap().expect("file should exist");
        assert_eq!(loaded.database.url, original.database.url);
        assert_eq!(loaded.worker, original.worker);
    }

    #[test]
    fn missing_file_loads_as_none() {
        let tmp = tempfile::TempDir::new().unwrap();
        let loaded = load_config_from(&tmp.path().join("absent.toml")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "database = 42").unwrap();

        let err = load_config_from(&path).unwrap_err();
        assert!(
            format!("{err:#}").contains("failed to parse config file"),
            "unexpected error: {err:#}"
        );
    }

    #[test]
    fn worker_section_is_optional_and_partial() {
        let cfg: ConfigFile = toml::from_str(
            "[database]\nurl = \"postgresql://h/db\"\n\n[worker]\nsweep_interval_secs = 5\n",
        )
        .unwrap();
        assert_eq!(cfg.worker.sweep_interval_secs, 5);
        assert_eq!(cfg.worker.vote_channel, WorkerSection::default().vote_channel);

        let bare: ConfigFile = toml::from_str("[database]\nurl = \"postgresql://h/db\"\n").unwrap();
        assert_eq!(bare.worker, WorkerSection::default());
    }

    #[test]
    fn to_worker_config_raises_zeroes() {
        let section = WorkerSection {
            sweep_interval_secs: 0,
            attempt_timeout_secs: 0,
            max_concurrent_plans: 0,
            sweep_batch_size: 0,
            ..WorkerSection::default()
        };
        let config = section.to_worker_config();
        assert_eq!(config.sweep_interval, Duration::from_secs(1));
        assert_eq!(config.attempt_timeout, Duration::from_secs(1));
        assert_eq!(config.max_concurrent_plans, 1);
        assert_eq!(config.sweep_batch_size, 1);
    }

    #[cfg(unix)]
    #[test]
    fn save_config_sets_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        save_config_to(&path, &sample(DbConfig::DEFAULT_URL)).unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn resolve_with_cli_flag_overrides_all() {
        let _lock = lock_env();

        unsafe { std::env::set_var("POTLUCK_DATABASE_URL", "postgresql://env:5432/envdb") };
        let config = PotluckConfig::resolve_with(
            Some("postgresql://cli:5432/clidb"),
            Some(sample("postgresql://file:5432/filedb")),
        )
        .unwrap();
        unsafe { std::env::remove_var("POTLUCK_DATABASE_URL") };

        assert_eq!(config.db_config.database_url, "postgresql://cli:5432/clidb");
    }

    #[test]
    fn resolve_with_env_var_overrides_config_file() {
        let _lock = lock_env();

        unsafe { std::env::set_var("POTLUCK_DATABASE_URL", "postgresql://env:5432/envdb") };
        let config =
            PotluckConfig::resolve_with(None, Some(sample("postgresql://file:5432/filedb")))
                .unwrap();
        unsafe { std::env::remove_var("POTLUCK_DATABASE_URL") };

        assert_eq!(config.db_config.database_url, "postgresql://env:5432/envdb");
    }

    #[test]
    fn resolve_uses_config_file_when_no_env() {
        let _lock = lock_env();

        unsafe { std::env::remove_var("POTLUCK_DATABASE_URL") };
        let mut file = sample("postgresql://file:5432/filedb");
        file.worker.attempt_timeout_secs = 7;
        let config = PotluckConfig::resolve_with(None, Some(file)).unwrap();

        assert_eq!(config.db_config.database_url, "postgresql://file:5432/filedb");
        assert_eq!(config.worker_config.attempt_timeout, Duration::from_secs(7));
    }

    #[test]
    fn resolve_defaults_when_nothing_set() {
        let _lock = lock_env();

        unsafe { std::env::remove_var("POTLUCK_DATABASE_URL") };
        let config = PotluckConfig::resolve_with(None, None).unwrap();

        assert_eq!(config.db_config.database_url, DbConfig::DEFAULT_URL);
        let defaults = WorkerConfig::default();
        assert_eq!(config.worker_config.sweep_interval, defaults.sweep_interval);
        assert_eq!(config.worker_config.vote_channel, defaults.vote_channel);
    }

    #[test]
    fn config_path_follows_xdg_config_home() {
        let _lock = lock_env();

        let tmp = tempfile::TempDir::new().unwrap();
        let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };

        let path = config_path();

        match orig_xdg {
            Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }

        assert_eq!(path, tmp.path().join("potluck").join("config.toml"));
    }
}
