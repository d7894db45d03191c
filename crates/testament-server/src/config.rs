//! Server configuration — parsed from TOML file + environment variable overrides.
//!
//! Priority: environment variables > config file > defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// General server settings
    #[serde(default)]
    pub server: ServerSection,

    /// Escrow monitoring settings
    pub escrow: EscrowSection,
}

/// General server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Data directory (SQLite DB, watch state)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Check interval in seconds (default: 10 minutes)
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            check_interval_secs: default_check_interval(),
            log_level: default_log_level(),
        }
    }
}

/// Escrow monitoring settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowSection {
    /// File the height-oracle collaborator keeps current (single decimal
    /// number, non-decreasing)
    pub height_file: PathBuf,

    /// Custody account identity holding all escrowed funds
    #[serde(default = "default_custody_account")]
    pub custody_account: String,

    /// Warning window in blocks before a release threshold
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold_blocks: u64,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_data_dir() -> PathBuf {
    PathBuf::from("/data")
}

fn default_check_interval() -> u64 {
    600 // 10 minutes
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_custody_account() -> String {
    "escrow-custody".to_string()
}

fn default_warning_threshold() -> u64 {
    144 // ~1 day at one block per 10 minutes
}

// ============================================================================
// Loading & environment override
// ============================================================================

impl ServerConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: ServerConfig =
            toml::from_str(&contents).with_context(|| "Failed to parse TOML config")?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `TESTAMENT_DATA_DIR`
    /// - `TESTAMENT_CHECK_INTERVAL`
    /// - `TESTAMENT_LOG_LEVEL`
    /// - `TESTAMENT_HEIGHT_FILE`
    /// - `TESTAMENT_CUSTODY_ACCOUNT`
    /// - `TESTAMENT_WARNING_THRESHOLD`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("TESTAMENT_DATA_DIR") {
            self.server.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("TESTAMENT_CHECK_INTERVAL") {
            if let Ok(secs) = v.parse::<u64>() {
                self.server.check_interval_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("TESTAMENT_LOG_LEVEL") {
            self.server.log_level = v;
        }
        if let Ok(v) = std::env::var("TESTAMENT_HEIGHT_FILE") {
            self.escrow.height_file = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("TESTAMENT_CUSTODY_ACCOUNT") {
            self.escrow.custody_account = v;
        }
        if let Ok(v) = std::env::var("TESTAMENT_WARNING_THRESHOLD") {
            if let Ok(blocks) = v.parse::<u64>() {
                self.escrow.warning_threshold_blocks = blocks;
            }
        }
    }

    /// Path of the escrow database inside the data directory.
    pub fn db_path(&self) -> PathBuf {
        self.server.data_dir.join("testament.db")
    }

    /// Path of the watch state file inside the data directory.
    pub fn watch_state_path(&self) -> PathBuf {
        self.server.data_dir.join("watch_state.json")
    }

    /// Validate that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        // Height file must be configured
        anyhow::ensure!(
            !self.escrow.height_file.as_os_str().is_empty(),
            "escrow.height_file must not be empty"
        );

        // Custody account must be named
        anyhow::ensure!(
            !self.escrow.custody_account.is_empty(),
            "escrow.custody_account must not be empty"
        );

        // Check interval must be at least 60 seconds
        anyhow::ensure!(
            self.server.check_interval_secs >= 60,
            "server.check_interval_secs must be >= 60"
        );

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn minimal_toml() -> &'static str {
        r#"
[escrow]
height_file = "/data/height"
"#
    }

    fn full_toml() -> &'static str {
        r#"
[server]
data_dir = "/custom/data"
check_interval_secs = 3600
log_level = "debug"

[escrow]
height_file = "/oracle/height"
custody_account = "vault-custody"
warning_threshold_blocks = 288
"#
    }

    #[test]
    fn test_parse_minimal_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", minimal_toml()).unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.escrow.height_file, PathBuf::from("/data/height"));
        assert_eq!(config.server.check_interval_secs, 600); // default
        assert_eq!(config.server.log_level, "info"); // default
        assert_eq!(config.escrow.custody_account, "escrow-custody"); // default
        assert_eq!(config.escrow.warning_threshold_blocks, 144); // default
    }

    #[test]
    fn test_parse_full_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", full_toml()).unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.server.check_interval_secs, 3600);
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.escrow.custody_account, "vault-custody");
        assert_eq!(config.escrow.warning_threshold_blocks, 288);
        assert_eq!(config.db_path(), PathBuf::from("/custom/data/testament.db"));
        assert_eq!(
            config.watch_state_path(),
            PathBuf::from("/custom/data/watch_state.json")
        );
    }

    #[test]
    fn test_missing_escrow_section_fails() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[server]\nlog_level = \"debug\"\n").unwrap();

        assert!(ServerConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", minimal_toml()).unwrap();

        let mut config = ServerConfig::from_file(file.path()).unwrap();

        std::env::set_var("TESTAMENT_DATA_DIR", "/env/data");
        std::env::set_var("TESTAMENT_CHECK_INTERVAL", "1800");
        std::env::set_var("TESTAMENT_CUSTODY_ACCOUNT", "env-custody");

        config.apply_env_overrides();

        assert_eq!(config.server.data_dir, PathBuf::from("/env/data"));
        assert_eq!(config.server.check_interval_secs, 1800);
        assert_eq!(config.escrow.custody_account, "env-custody");

        std::env::remove_var("TESTAMENT_DATA_DIR");
        std::env::remove_var("TESTAMENT_CHECK_INTERVAL");
        std::env::remove_var("TESTAMENT_CUSTODY_ACCOUNT");
    }

    #[test]
    fn test_validation_ok() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", minimal_toml()).unwrap();
        let config = ServerConfig::from_file(file.path()).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_empty_custody() {
        let toml = r#"
[escrow]
height_file = "/data/height"
custody_account = ""
"#;
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", toml).unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_check_interval_too_low() {
        let toml = r#"
[server]
check_interval_secs = 30

[escrow]
height_file = "/data/height"
"#;
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", toml).unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", full_toml()).unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        let serialized = toml::to_string_pretty(&config).unwrap();

        // Should be valid TOML that re-parses
        let reparsed: ServerConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(reparsed.escrow.custody_account, config.escrow.custody_account);
        assert_eq!(
            reparsed.server.check_interval_secs,
            config.server.check_interval_secs
        );
    }
}
