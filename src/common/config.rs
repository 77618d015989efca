//! Server configuration
//!
//! TOML-backed settings for the gateway. Every field has a default that
//! works for a local deployment, so a missing file is not an error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::common::{Error, Result};

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address for the ActiveSync endpoint
    pub bind_addr: String,
    /// SQLite database holding devices and sync state
    pub state_db_path: PathBuf,
    /// SQLite database holding the mailbox content
    pub mail_db_path: PathBuf,
    /// Lower clamp for Ping HeartbeatInterval, seconds
    pub heartbeat_min_secs: u64,
    /// Upper clamp for Ping HeartbeatInterval, seconds
    pub heartbeat_max_secs: u64,
    /// Log level: error, warn, info, debug, trace
    pub log_level: String,
    /// Write logs to a rotating file in addition to the console
    pub log_to_file: bool,
    /// Mailbox accounts served by the built-in authenticator
    pub users: Vec<UserEntry>,
}

/// One account in the `[[users]]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntry {
    pub id: i64,
    pub email: String,
    pub password: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("airgate");
        Self {
            bind_addr: "127.0.0.1:8443".to_string(),
            state_db_path: data_dir.join("state.db"),
            mail_db_path: data_dir.join("mail.db"),
            heartbeat_min_secs: 60,
            heartbeat_max_secs: 3540,
            log_level: "info".to_string(),
            log_to_file: true,
            users: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load from a file if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Clamp a client-requested heartbeat to the configured window
    pub fn clamp_heartbeat(&self, requested: u64) -> u64 {
        requested.clamp(self.heartbeat_min_secs, self.heartbeat_max_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_usable() {
        let config = ServerConfig::default();
        assert!(!config.bind_addr.is_empty());
        assert_eq!(config.heartbeat_min_secs, 60);
        assert_eq!(config.heartbeat_max_secs, 3540);
    }

    #[test]
    fn test_clamp_heartbeat() {
        let config = ServerConfig::default();
        assert_eq!(config.clamp_heartbeat(5), 60);
        assert_eq!(config.clamp_heartbeat(900), 900);
        assert_eq!(config.clamp_heartbeat(100_000), 3540);
    }

    #[test]
    fn test_parse_partial_toml() {
        let parsed: ServerConfig = toml::from_str("bind_addr = \"0.0.0.0:443\"").unwrap();
        assert_eq!(parsed.bind_addr, "0.0.0.0:443");
        assert_eq!(parsed.log_level, "info");
    }
}
