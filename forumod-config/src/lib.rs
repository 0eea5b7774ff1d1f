//! System-level configuration for the forum moderation engine.
//!
//! Everything here is process-wide and shared by every subsystem (as
//! opposed to `forumod_model::UserConfig`, which is owned per-user).
//! Persistent file *management* — hot directories, a TOML/YAML editing
//! wizard, rewriting the file back on every admin edit — is the explicit
//! Non-goal from `spec.md` §1; this crate only parses a config file into
//! [`SystemConfig`] once at startup and validates it.

mod error;
mod users;

pub use error::ConfigError;
pub use users::UsersConfigLoader;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Database connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `sqlite://...` or `postgres://...`, per §6 "Relational database
    /// (SQLite or PostgreSQL)".
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://forumod.db".to_string(),
            max_connections: 5,
        }
    }
}

/// Pagination and rate-limit parameters consulted by the Spider (§4.2).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// How many thread-list pages to scan forward each pass.
    pub thread_page_forward: u32,
    /// How many post pages (from page 2) to scan forward within a
    /// thread.
    pub post_page_forward: u32,
    /// How many post pages to scan backward from the thread's last page.
    pub post_page_backward: u32,
    /// How many comment pages to scan backward from a post's last page.
    pub comment_page_backward: u32,
    /// Minimum seconds between any two outbound upstream requests
    /// (`EtaSleep` cooldown, §4.2).
    pub query_cd: f64,
    /// Seconds to sleep between complete passes over the need set
    /// (§4.3 `crawl()`).
    pub loop_cd: f64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            thread_page_forward: 3,
            post_page_forward: 3,
            post_page_backward: 3,
            comment_page_backward: 1,
            query_cd: 1.0,
            loop_cd: 30.0,
        }
    }
}

/// TTL policy for cached rows the classifier and sweepers consult.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// `PID_CACHE_EXPIRE` (§3): content cache rows older than this (in
    /// seconds) are pruned by the sweeper. Default 7 days.
    pub pid_cache_expire_secs: i64,
    /// How often the sweeper runs, in seconds.
    pub sweep_interval_secs: u64,
    /// Root directory of the disk-backed confirmation store (C8, §4.7),
    /// one `cacache` cache per account underneath it.
    pub confirm_cache_dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            pid_cache_expire_secs: 7 * 24 * 3600,
            sweep_interval_secs: 3600,
            confirm_cache_dir: PathBuf::from("./forumod-cache/confirm"),
        }
    }
}

/// The process-wide configuration loaded once at startup (§6 "Process
/// lifecycle signals": "Startup reads system config").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub database: DatabaseConfig,
    pub scan: ScanConfig,
    pub cache: CacheConfig,
}

impl SystemConfig {
    /// Validates invariants a malformed config file could otherwise
    /// violate silently (`spec.md` §7: the only fatal startup condition
    /// named there is "inability to open the database" — so this fails
    /// fast rather than letting the Spider misbehave at runtime on a
    /// nonsensical number).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.is_empty() {
            return Err(ConfigError::Invalid("database.url must not be empty".into()));
        }
        if self.scan.thread_page_forward == 0 {
            return Err(ConfigError::Invalid(
                "scan.thread_page_forward must be >= 1".into(),
            ));
        }
        if self.scan.query_cd < 0.0 {
            return Err(ConfigError::Invalid("scan.query_cd must be >= 0".into()));
        }
        if self.scan.loop_cd < 0.0 {
            return Err(ConfigError::Invalid("scan.loop_cd must be >= 0".into()));
        }
        if self.cache.pid_cache_expire_secs <= 0 {
            return Err(ConfigError::Invalid(
                "cache.pid_cache_expire_secs must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Loads and validates a [`SystemConfig`] from a TOML file.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, parses it as TOML, fills in defaults for missing
    /// fields, and validates the result.
    pub fn load(path: impl AsRef<Path>) -> Result<SystemConfig, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        Self::parse(&raw)
    }

    /// Parses a config already read into memory, e.g. for embedding a
    /// default config in a test fixture.
    pub fn parse(raw: &str) -> Result<SystemConfig, ConfigError> {
        let cfg: SystemConfig = toml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_all_defaults() {
        let cfg = ConfigLoader::parse("").unwrap();
        assert_eq!(cfg.scan.thread_page_forward, 3);
        assert_eq!(cfg.cache.pid_cache_expire_secs, 7 * 24 * 3600);
    }

    #[test]
    fn partial_override_keeps_remaining_defaults() {
        let cfg = ConfigLoader::parse(
            r#"
            [scan]
            query_cd = 2.5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.scan.query_cd, 2.5);
        assert_eq!(cfg.scan.thread_page_forward, 3);
    }

    #[test]
    fn rejects_negative_cooldown() {
        let err = ConfigLoader::parse(
            r#"
            [scan]
            query_cd = -1.0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forumod.toml");
        std::fs::write(&path, "[database]\nurl = \"sqlite://test.db\"\n").unwrap();
        let cfg = ConfigLoader::load(&path).unwrap();
        assert_eq!(cfg.database.url, "sqlite://test.db");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ConfigLoader::load("/nonexistent/forumod.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
