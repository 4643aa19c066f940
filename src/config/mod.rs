//! Stored settings backed by SQLite.
//!
//! Only the names in [`Setting`] can be stored, so a typo on the command
//! line is rejected before it reaches the database. Use `":memory:"` for
//! tests.

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use rusqlite::{Connection, OptionalExtension, params};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use crate::consts::DEFAULT_BASE_URL;

/// A value the connector reads from the settings store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum Setting {
    /// Parallel API key, sent as `x-api-key`.
    ApiKey,
    /// Override for the API host.
    BaseUrl,
}

impl Setting {
    pub const ALL: [Setting; 2] = [Setting::ApiKey, Setting::BaseUrl];

    pub fn as_str(self) -> &'static str {
        match self {
            Setting::ApiKey => "api_key",
            Setting::BaseUrl => "base_url",
        }
    }

    /// Secrets are masked whenever they are printed.
    pub fn is_secret(self) -> bool {
        matches!(self, Setting::ApiKey)
    }

    /// Normalise a value before it is stored.
    fn normalize(self, value: &str) -> Result<String> {
        let value = value.trim();
        if value.is_empty() {
            bail!("{self} cannot be empty");
        }
        match self {
            Setting::ApiKey => Ok(value.to_string()),
            Setting::BaseUrl => {
                if !(value.starts_with("http://") || value.starts_with("https://")) {
                    bail!("base_url must start with http:// or https://, got {value}");
                }
                Ok(value.trim_end_matches('/').to_string())
            }
        }
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Setting {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Setting::ALL
            .into_iter()
            .find(|setting| setting.as_str() == s)
            .with_context(|| {
                let known: Vec<&str> = Setting::ALL.iter().map(|known| known.as_str()).collect();
                format!("unknown setting: {s} (expected one of: {})", known.join(", "))
            })
    }
}

/// Persistent settings store.
pub struct Config {
    conn: Mutex<Connection>,
}

impl Config {
    /// Open or create the settings table in the given database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).context("failed to open config database")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS settings (
                name  TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .context("failed to create settings table")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    pub fn get(&self, setting: Setting) -> Result<Option<String>> {
        self.conn()
            .query_row(
                "SELECT value FROM settings WHERE name = ?1",
                [setting.as_str()],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("failed to read {setting}"))
    }

    /// Validate and store a value, replacing any previous one.
    pub fn set(&self, setting: Setting, value: &str) -> Result<()> {
        let value = setting.normalize(value)?;
        self.conn()
            .execute(
                "INSERT INTO settings (name, value) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET value = excluded.value",
                params![setting.as_str(), value],
            )
            .with_context(|| format!("failed to store {setting}"))?;
        Ok(())
    }

    /// Remove a stored value. Returns whether anything was stored.
    pub fn remove(&self, setting: Setting) -> Result<bool> {
        let removed = self
            .conn()
            .execute("DELETE FROM settings WHERE name = ?1", [setting.as_str()])
            .with_context(|| format!("failed to remove {setting}"))?;
        Ok(removed > 0)
    }

    /// Every stored setting, in [`Setting::ALL`] order.
    pub fn entries(&self) -> Result<Vec<(Setting, String)>> {
        let mut entries = Vec::new();
        for setting in Setting::ALL {
            if let Some(value) = self.get(setting)? {
                entries.push((setting, value));
            }
        }
        Ok(entries)
    }

    /// Resolve the API key.
    /// Priority: stored key → environment variable.
    pub fn api_key(&self, env_var: &str) -> Result<Option<String>> {
        if let Some(key) = self.get(Setting::ApiKey)?
            && !key.is_empty()
        {
            return Ok(Some(key));
        }

        if let Ok(key) = std::env::var(env_var)
            && !key.is_empty()
        {
            return Ok(Some(key));
        }

        Ok(None)
    }

    /// Stored base URL, or the public API host.
    pub fn base_url(&self) -> Result<String> {
        Ok(self
            .get(Setting::BaseUrl)?
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem_config() -> Config {
        Config::open(":memory:").unwrap()
    }

    #[test]
    fn setting_names_round_trip() {
        for setting in Setting::ALL {
            assert_eq!(setting.as_str().parse::<Setting>().unwrap(), setting);
        }
    }

    #[test]
    fn unknown_setting_lists_known_names() {
        let err = "model".parse::<Setting>().unwrap_err().to_string();
        assert!(err.contains("unknown setting: model"));
        assert!(err.contains("api_key, base_url"));
    }

    #[test]
    fn get_returns_none_when_unset() {
        assert!(mem_config().get(Setting::ApiKey).unwrap().is_none());
    }

    #[test]
    fn set_overwrites_existing() {
        let config = mem_config();
        config.set(Setting::ApiKey, "old").unwrap();
        config.set(Setting::ApiKey, "new").unwrap();
        assert_eq!(config.get(Setting::ApiKey).unwrap().unwrap(), "new");
    }

    #[test]
    fn set_rejects_blank_value() {
        let config = mem_config();
        assert!(config.set(Setting::ApiKey, "   ").is_err());
        assert!(config.get(Setting::ApiKey).unwrap().is_none());
    }

    #[test]
    fn base_url_must_be_http() {
        let config = mem_config();
        let err = config.set(Setting::BaseUrl, "api.parallel.ai").unwrap_err();
        assert!(err.to_string().contains("http:// or https://"));

        config.set(Setting::BaseUrl, "http://localhost:9000/").unwrap();
        assert_eq!(
            config.get(Setting::BaseUrl).unwrap().unwrap(),
            "http://localhost:9000"
        );
    }

    #[test]
    fn remove_reports_whether_stored() {
        let config = mem_config();
        config.set(Setting::BaseUrl, "http://localhost").unwrap();
        assert!(config.remove(Setting::BaseUrl).unwrap());
        assert!(config.get(Setting::BaseUrl).unwrap().is_none());
        assert!(!config.remove(Setting::BaseUrl).unwrap());
    }

    #[test]
    fn entries_follow_setting_order() {
        let config = mem_config();
        config.set(Setting::BaseUrl, "https://example.test").unwrap();
        config.set(Setting::ApiKey, "k").unwrap();
        assert_eq!(
            config.entries().unwrap(),
            vec![
                (Setting::ApiKey, "k".to_string()),
                (Setting::BaseUrl, "https://example.test".to_string()),
            ]
        );
    }

    #[test]
    fn stored_api_key_wins_over_env() {
        let config = mem_config();
        config.set(Setting::ApiKey, "stored").unwrap();
        // PATH is always set, so it stands in for a populated env var.
        assert_eq!(config.api_key("PATH").unwrap().unwrap(), "stored");
    }

    #[test]
    fn api_key_falls_back_to_env() {
        let config = mem_config();
        let path = std::env::var("PATH").unwrap();
        assert_eq!(config.api_key("PATH").unwrap().unwrap(), path);
    }

    #[test]
    fn api_key_none_when_nothing_configured() {
        let config = mem_config();
        assert!(
            config
                .api_key("PARALLEL_FLOW_TEST_UNSET_VARIABLE")
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn base_url_defaults_to_public_host() {
        let config = mem_config();
        assert_eq!(config.base_url().unwrap(), "https://api.parallel.ai");
        config.set(Setting::BaseUrl, "http://localhost:9000").unwrap();
        assert_eq!(config.base_url().unwrap(), "http://localhost:9000");
    }

    #[test]
    fn persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config-test.db");
        let path_str = path.to_str().unwrap();

        {
            let config = Config::open(path_str).unwrap();
            config.set(Setting::ApiKey, "persisted").unwrap();
        }

        {
            let config = Config::open(path_str).unwrap();
            assert_eq!(config.get(Setting::ApiKey).unwrap().unwrap(), "persisted");
        }
    }
}
