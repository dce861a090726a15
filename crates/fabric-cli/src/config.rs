//! Configuration file management for fabric.
//!
//! Provides a TOML-based config file at `~/.config/fabric/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use fabric_db::config::DbConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    #[serde(default)]
    pub pricing: PricingSection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PricingSection {
    pub refresh_interval_secs: u64,
}

impl Default for PricingSection {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 300,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SchedulerSection {
    pub drift_interval_secs: u64,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            drift_interval_secs: 600,
            warning_threshold: 0.10,
            critical_threshold: 0.25,
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the fabric config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/fabric` or `~/.config/fabric`.
/// We intentionally ignore the platform-specific `dirs::config_dir()`
/// (which returns `~/Library/Application Support` on macOS).
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("fabric");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("fabric")
}

/// Return the path to the fabric config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct FabricConfig {
    pub db_config: DbConfig,
    pub pricing_refresh_interval_secs: u64,
    pub drift_interval_secs: u64,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
}

impl FabricConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// DB URL: `cli_db_url` > `FABRIC_DATABASE_URL` env > `config_file.database.url` > `DbConfig::DEFAULT_URL`.
    /// Everything else only comes from the config file or falls back to
    /// its section default -- none of it has a CLI flag or env var of its
    /// own yet.
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let file_config = load_config().ok();

        let db_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Ok(url) = std::env::var("FABRIC_DATABASE_URL") {
            url
        } else if let Some(ref cfg) = file_config {
            cfg.database.url.clone()
        } else {
            DbConfig::DEFAULT_URL.to_string()
        };
        let db_config = DbConfig::new(db_url);

        let pricing = file_config
            .as_ref()
            .map(|c| &c.pricing)
            .cloned_or_default();
        let scheduler = file_config
            .as_ref()
            .map(|c| &c.scheduler)
            .cloned_or_default();

        Ok(Self {
            db_config,
            pricing_refresh_interval_secs: pricing.refresh_interval_secs,
            drift_interval_secs: scheduler.drift_interval_secs,
            warning_threshold: scheduler.warning_threshold,
            critical_threshold: scheduler.critical_threshold,
        })
    }
}

/// Small helper so `resolve` reads as a flat chain instead of nested
/// `match`es for each independently-defaulted section.
trait ClonedOrDefault<T> {
    fn cloned_or_default(self) -> T;
}

impl<T: Clone + Default> ClonedOrDefault<T> for Option<&T> {
    fn cloned_or_default(self) -> T {
        self.cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Tests that set/remove FABRIC_DATABASE_URL must not run concurrently
    // with each other (env vars are process-global).
    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
        LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[test]
    fn save_and_load_config_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("fabric");
        let path = dir.join("config.toml");

        let original = ConfigFile {
            database: DatabaseSection {
                url: "postgresql://testhost:5432/testdb".to_string(),
            },
            pricing: PricingSection::default(),
            scheduler: SchedulerSection::default(),
        };

        std::fs::create_dir_all(&dir).unwrap();
        let contents = toml::to_string_pretty(&original).unwrap();
        std::fs::write(&path, &contents).unwrap();

        let loaded_contents = std::fs::read_to_string(&path).unwrap();
        let loaded: ConfigFile = toml::from_str(&loaded_contents).unwrap();

        assert_eq!(loaded.database.url, original.database.url);
        assert_eq!(
            loaded.scheduler.warning_threshold,
            original.scheduler.warning_threshold
        );
    }

    #[cfg(unix)]
    #[test]
    fn save_config_sets_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("test.toml");
        std::fs::write(&file, "test").unwrap();

        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&file, perms).unwrap();

        let meta = std::fs::metadata(&file).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn resolve_with_cli_flag_overrides_all() {
        let _lock = lock_env();
        unsafe { std::env::set_var("FABRIC_DATABASE_URL", "postgresql://env:5432/envdb") };

        let config = FabricConfig::resolve(Some("postgresql://cli:5432/clidb")).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://cli:5432/clidb");

        unsafe { std::env::remove_var("FABRIC_DATABASE_URL") };
    }

    #[test]
    fn resolve_with_env_var_overrides_default() {
        let _lock = lock_env();
        unsafe { std::env::set_var("FABRIC_DATABASE_URL", "postgresql://env:5432/envdb") };

        let config = FabricConfig::resolve(None).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://env:5432/envdb");

        unsafe { std::env::remove_var("FABRIC_DATABASE_URL") };
    }

    #[test]
    fn resolve_defaults_when_nothing_set() {
        let _lock = lock_env();
        unsafe { std::env::remove_var("FABRIC_DATABASE_URL") };

        let config = FabricConfig::resolve(None).unwrap();
        assert_eq!(config.db_config.database_url, DbConfig::DEFAULT_URL);
        assert_eq!(config.drift_interval_secs, 600);
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("fabric/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
