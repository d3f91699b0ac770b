//! Process configuration loaded from environment variables.
//!
//! Values come from the process environment (optionally primed from `.env` by
//! `dotenvy` in `main`). Loading goes through a lookup function so the same
//! parsing rules can be exercised in tests without touching the real
//! environment.

use super::database::DEFAULT_DATABASE_URL;
use super::repository::{RepositoryConfig, load_config};
use crate::errors::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 600;
const DEFAULT_UPDATE_WAIT_SECS: u64 = 60;
const DEFAULT_STARTUP_DELAY_SECS: u64 = 5;
/// Upper bound for any configured delay, roughly ten years
const MAX_DELAY_SECS: u64 = 10 * 365 * 24 * 60 * 60;
const MIN_SECRET_LEN: usize = 32;
const FORBIDDEN_SECRET: &str = "super-secret-key";

/// Settings for the self-update subsystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSettings {
    /// Whether the periodic checker runs at all (`AUTO_UPDATE`)
    pub enabled: bool,
    /// Time between checks (`AUTO_UPDATE_INTERVAL`)
    pub interval: Duration,
    /// Delay between detecting and applying an update (`AUTO_UPDATE_WAIT`)
    pub wait: Duration,
    /// Delay before the first check after startup
    pub startup_delay: Duration,
    /// Whether non-admin users may read changelogs (`AUTO_UPDATE_SHOW_CHANGELOGS`)
    pub show_changelogs: bool,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(DEFAULT_UPDATE_INTERVAL_SECS),
            wait: Duration::from_secs(DEFAULT_UPDATE_WAIT_SECS),
            startup_delay: Duration::from_secs(DEFAULT_STARTUP_DELAY_SECS),
            show_changelogs: true,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP listen port
    pub port: u16,
    /// Production mode: secure cookies, trust the first proxy
    pub production: bool,
    /// `SeaORM` connection string
    pub database_url: String,
    /// Secret used for password hashing; validated at load time
    pub session_secret: String,
    /// Designated admin account name
    pub admin_username: Option<String>,
    /// Password used to seed the admin account
    pub admin_password: Option<String>,
    /// Working tree containing the version marker, changelog and restart scripts
    pub app_dir: PathBuf,
    /// Allowed browser origin for CORS
    pub cors_origin: String,
    /// Self-update settings
    pub update: UpdateSettings,
    /// Source-control settings
    pub repository: RepositoryConfig,
}

impl AppConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    /// Returns `Error::Config` if `SESSION_SECRET` is missing or weak, or if an
    /// explicitly configured TOML file cannot be loaded.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration using `lookup` to resolve variable names.
    ///
    /// # Errors
    /// See [`AppConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let session_secret = lookup("SESSION_SECRET")
            .map(|s| unescape_dollars(&s))
            .unwrap_or_default();
        validate_session_secret(&session_secret)?;

        let production = lookup("APP_ENV")
            .or_else(|| lookup("NODE_ENV"))
            .is_some_and(|env| env == "production");

        let app_dir = lookup("APP_DIR").map_or_else(
            || std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            PathBuf::from,
        );

        let repository = match lookup("SERVER_CONFIG") {
            Some(path) => load_config(path)?.repository,
            None => {
                let default_path = app_dir.join("config.toml");
                if default_path.exists() {
                    load_config(default_path)?.repository
                } else {
                    RepositoryConfig::default()
                }
            }
        };

        let update = UpdateSettings {
            enabled: flag(lookup("AUTO_UPDATE")),
            interval: nonzero_seconds(
                "AUTO_UPDATE_INTERVAL",
                lookup("AUTO_UPDATE_INTERVAL"),
                DEFAULT_UPDATE_INTERVAL_SECS,
            ),
            wait: seconds(
                "AUTO_UPDATE_WAIT",
                lookup("AUTO_UPDATE_WAIT"),
                DEFAULT_UPDATE_WAIT_SECS,
            ),
            startup_delay: seconds(
                "AUTO_UPDATE_STARTUP_DELAY",
                lookup("AUTO_UPDATE_STARTUP_DELAY"),
                DEFAULT_STARTUP_DELAY_SECS,
            ),
            show_changelogs: flag(lookup("AUTO_UPDATE_SHOW_CHANGELOGS")),
        };

        let port = lookup("PORT")
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let config = Self {
            port,
            production,
            database_url: lookup("DATABASE_URL")
                .map_or_else(|| DEFAULT_DATABASE_URL.to_string(), |url| unescape_dollars(&url)),
            session_secret,
            admin_username: lookup("ADMIN_USERNAME").filter(|s| !s.is_empty()),
            admin_password: lookup("ADMIN_PASSWORD")
                .filter(|s| !s.is_empty())
                .map(|s| unescape_dollars(&s)),
            app_dir,
            cors_origin: lookup("CORS_ORIGIN")
                .unwrap_or_else(|| "http://localhost:4200".to_string()),
            update,
            repository,
        };

        info!(
            port = config.port,
            production = config.production,
            auto_update = config.update.enabled,
            "Loaded application configuration"
        );
        Ok(config)
    }
}

/// Enabled unless explicitly set to `"false"`.
fn flag(value: Option<String>) -> bool {
    value.is_none_or(|v| v.trim() != "false")
}

fn seconds(name: &str, value: Option<String>, default: u64) -> Duration {
    let secs = match value {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{name}={raw:?} is not a number of seconds, using {default}");
            default
        }),
    };
    if secs > MAX_DELAY_SECS {
        warn!("{name}={secs} is too large, using {MAX_DELAY_SECS}");
        return Duration::from_secs(MAX_DELAY_SECS);
    }
    Duration::from_secs(secs)
}

/// Like [`seconds`], but zero falls back to the default.
fn nonzero_seconds(name: &str, value: Option<String>, default: u64) -> Duration {
    let duration = seconds(name, value, default);
    if duration.is_zero() {
        warn!("{name} must be at least one second, using {default}");
        return Duration::from_secs(default);
    }
    duration
}

/// Compose files escape `$` as `$$`.
fn unescape_dollars(value: &str) -> String {
    value.replace("$$", "$")
}

fn validate_session_secret(secret: &str) -> Result<()> {
    if secret.len() < MIN_SECRET_LEN || secret == FORBIDDEN_SECRET {
        return Err(Error::Config {
            message: format!(
                "SESSION_SECRET must be set, be at least {MIN_SECRET_LEN} characters long, and not be a default value"
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&[
            ("SESSION_SECRET", SECRET),
            ("APP_DIR", dir.path().to_str().unwrap()),
        ])
        .unwrap();

        assert_eq!(config.port, 3000);
        assert!(!config.production);
        assert_eq!(config.update, UpdateSettings::default());
        assert_eq!(config.update.interval, Duration::from_secs(600));
        assert_eq!(config.update.wait, Duration::from_secs(60));
        assert_eq!(config.repository, RepositoryConfig::default());
        assert!(config.admin_username.is_none());
    }

    #[test]
    fn test_update_flags_and_intervals() {
        let config = load(&[
            ("SESSION_SECRET", SECRET),
            ("AUTO_UPDATE", "false"),
            ("AUTO_UPDATE_SHOW_CHANGELOGS", "false"),
            ("AUTO_UPDATE_INTERVAL", "30"),
            ("AUTO_UPDATE_WAIT", "not-a-number"),
        ])
        .unwrap();

        assert!(!config.update.enabled);
        assert!(!config.update.show_changelogs);
        assert_eq!(config.update.interval, Duration::from_secs(30));
        // Unparsable values fall back to the default
        assert_eq!(config.update.wait, Duration::from_secs(60));
    }

    #[test]
    fn test_zero_interval_falls_back_to_default() {
        let config = load(&[
            ("SESSION_SECRET", SECRET),
            ("AUTO_UPDATE_INTERVAL", "0"),
            ("AUTO_UPDATE_WAIT", "0"),
        ])
        .unwrap();

        assert_eq!(config.update.interval, Duration::from_secs(600));
        // Applying immediately is allowed
        assert_eq!(config.update.wait, Duration::ZERO);
    }

    #[test]
    fn test_huge_delays_are_capped() {
        let config = load(&[
            ("SESSION_SECRET", SECRET),
            ("AUTO_UPDATE_STARTUP_DELAY", "18446744073709551615"),
            ("AUTO_UPDATE_INTERVAL", "18446744073709551615"),
        ])
        .unwrap();

        assert_eq!(config.update.startup_delay, Duration::from_secs(MAX_DELAY_SECS));
        assert_eq!(config.update.interval, Duration::from_secs(MAX_DELAY_SECS));
    }

    #[test]
    fn test_any_value_other_than_false_enables() {
        let config = load(&[("SESSION_SECRET", SECRET), ("AUTO_UPDATE", "0")]).unwrap();
        assert!(config.update.enabled);
    }

    #[test]
    fn test_rejects_short_or_default_secret() {
        assert!(matches!(load(&[]), Err(Error::Config { .. })));
        assert!(matches!(
            load(&[("SESSION_SECRET", "short")]),
            Err(Error::Config { .. })
        ));
        assert!(matches!(
            load(&[("SESSION_SECRET", "super-secret-key")]),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_unescapes_compose_dollars() {
        let config = load(&[
            ("SESSION_SECRET", "$$abcdefghijklmnopqrstuvwxyz0123456789"),
            ("ADMIN_PASSWORD", "pa$$word1"),
        ])
        .unwrap();
        assert!(config.session_secret.starts_with("$abc"));
        assert_eq!(config.admin_password.as_deref(), Some("pa$word1"));
    }

    #[test]
    fn test_production_mode() {
        let config = load(&[("SESSION_SECRET", SECRET), ("NODE_ENV", "production")]).unwrap();
        assert!(config.production);
    }

    #[test]
    fn test_reads_repository_section_from_app_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "[repository]\nbranch = \"stable\"\n",
        )
        .unwrap();

        let config = load(&[
            ("SESSION_SECRET", SECRET),
            ("APP_DIR", dir.path().to_str().unwrap()),
        ])
        .unwrap();
        assert_eq!(config.repository.remote_ref(), "origin/stable");
    }
}
