//! Configuration management for helpdeskd.
//!
//! Loads settings from /etc/helpdesk/config.toml or uses defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::password::ScryptCost;

/// Config file path
pub const CONFIG_PATH: &str = "/etc/helpdesk/config.toml";

/// Default config file path for fallback
pub const DEFAULT_CONFIG_PATH: &str = "/var/lib/helpdesk/config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP server binds to
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:7870".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "/var/lib/helpdesk/helpdesk.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Admin session cookie settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Session lifetime in hours
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: i64,

    /// Add the Secure attribute (enable behind TLS)
    #[serde(default)]
    pub secure_cookie: bool,
}

fn default_cookie_name() -> String {
    "helpdesk_admin_session".to_string()
}

fn default_ttl_hours() -> i64 {
    12
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            ttl_hours: default_ttl_hours(),
            secure_cookie: false,
        }
    }
}

/// Admin presence feed settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// SSE keep-alive comment interval
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    /// Fallback database poll interval
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,

    /// Max admins replayed when a subscriber connects
    #[serde(default = "default_backlog_limit")]
    pub backlog_limit: usize,

    /// Max admins fetched per fallback poll
    #[serde(default = "default_poll_limit")]
    pub poll_limit: usize,
}

fn default_heartbeat_secs() -> u64 {
    20
}

fn default_poll_secs() -> u64 {
    4
}

fn default_backlog_limit() -> usize {
    300
}

fn default_poll_limit() -> usize {
    200
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_heartbeat_secs(),
            poll_secs: default_poll_secs(),
            backlog_limit: default_backlog_limit(),
            poll_limit: default_poll_limit(),
        }
    }
}

/// Admin account created by `helpdeskd seed` and on first start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
    pub name: String,
}

/// Complete daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HelpdeskConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub presence: PresenceConfig,

    /// Cost for newly hashed passwords. Stored records keep their own.
    #[serde(default)]
    pub password: ScryptCost,

    #[serde(default)]
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl HelpdeskConfig {
    /// Load config from the first path that exists, or defaults.
    /// An explicitly requested path must load.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }

        Ok(Self::load_from_path(Path::new(CONFIG_PATH))
            .or_else(|_| Self::load_from_path(Path::new(DEFAULT_CONFIG_PATH)))
            .unwrap_or_else(|e| {
                warn!("Config not found, using defaults: {}", e);
                HelpdeskConfig::default()
            }))
    }

    /// Load config from specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: HelpdeskConfig =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = HelpdeskConfig::default();

        assert_eq!(config.server.bind, "127.0.0.1:7870");
        assert_eq!(config.session.ttl_hours, 12);
        assert_eq!(config.presence.heartbeat_secs, 20);
        assert_eq!(config.presence.poll_secs, 4);
        assert_eq!(config.password, ScryptCost::DEFAULT);
        assert!(config.bootstrap_admin.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
bind = "0.0.0.0:9000"

[session]
secure_cookie = true

[bootstrap_admin]
username = "root"
password = "changeme"
name = "Root"
"#
        )
        .unwrap();

        let config = HelpdeskConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert!(config.session.secure_cookie);
        assert_eq!(config.session.cookie_name, "helpdesk_admin_session");
        assert_eq!(config.database.path, "/var/lib/helpdesk/helpdesk.db");
        assert_eq!(config.bootstrap_admin.unwrap().username, "root");
    }

    #[test]
    fn test_partial_password_section() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
bind = "0.0.0.0:1"

[password]
log_n = 15
"#
        )
        .unwrap();

        let config = HelpdeskConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:1");
        assert_eq!(config.password.log_n, 15);
        assert_eq!(config.password.r, 8);
        assert_eq!(config.password.p, 1);
    }

    #[test]
    fn test_explicit_missing_path_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(HelpdeskConfig::load(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
