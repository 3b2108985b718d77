//! Configuration loading and root folder resolution
//!
//! Both processes must agree on the root folder, since it holds the shared
//! database and the sample attachment folders. Resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`SLB_ROOT_FOLDER`)
//! 3. `root_folder` key in the user TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! Handshake timings and the web bind address come from `<root>/slb.toml`,
//! falling back to the user config file, then to compiled defaults. A missing
//! or malformed file is never fatal.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "SLB_ROOT_FOLDER";

/// Per-installation config file, looked up inside the root folder
pub const CONFIG_FILE_NAME: &str = "slb.toml";

/// Shared SQLite database file, inside the root folder
pub const DATABASE_FILE_NAME: &str = "sample_log_book.db";

/// Attachment folders, inside the root folder
pub const ATTACHMENTS_DIR_NAME: &str = "samples";

const APP_DIR_NAME: &str = "sample-log-book";

/// Contents of a TOML config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Root folder (only honored from the user config file)
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub handshake: HandshakeTimings,

    #[serde(default)]
    pub web: WebConfig,
}

/// Timing constants of the host/web handshake
///
/// All values are in milliseconds except the enrollment timeout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HandshakeTimings {
    /// Host loop period while scanning
    pub idle_poll_ms: u64,
    /// Timeout handed to the reader for each poll
    pub reader_timeout_ms: u64,
    /// How long a known tag stays "present" after its last detection
    pub known_dwell_ms: u64,
    /// How often the host re-reads the store while awaiting acknowledgment
    pub ack_poll_ms: u64,
    /// Delay after which the web clears its acknowledgment pulse
    pub ack_reset_ms: u64,
    /// Web scan watcher period
    pub consumer_poll_ms: u64,
    /// Give up on an unanswered enrollment prompt. `None` waits forever.
    pub enrollment_timeout_secs: Option<u64>,
}

impl Default for HandshakeTimings {
    fn default() -> Self {
        Self {
            idle_poll_ms: 100,
            reader_timeout_ms: 100,
            known_dwell_ms: 3000,
            ack_poll_ms: 1000,
            ack_reset_ms: 2000,
            consumer_poll_ms: 1000,
            enrollment_timeout_secs: None,
        }
    }
}

impl HandshakeTimings {
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn reader_timeout(&self) -> Duration {
        Duration::from_millis(self.reader_timeout_ms)
    }

    pub fn known_dwell(&self) -> Duration {
        Duration::from_millis(self.known_dwell_ms)
    }

    pub fn ack_poll(&self) -> Duration {
        Duration::from_millis(self.ack_poll_ms)
    }

    pub fn ack_reset(&self) -> Duration {
        Duration::from_millis(self.ack_reset_ms)
    }

    pub fn consumer_poll(&self) -> Duration {
        Duration::from_millis(self.consumer_poll_ms)
    }

    pub fn enrollment_timeout(&self) -> Option<Duration> {
        self.enrollment_timeout_secs.map(Duration::from_secs)
    }

    /// Reject zero periods, which would turn the polling loops into spins
    pub fn validate(&self) -> Result<()> {
        let periods = [
            ("idle_poll_ms", self.idle_poll_ms),
            ("ack_poll_ms", self.ack_poll_ms),
            ("consumer_poll_ms", self.consumer_poll_ms),
        ];
        for (name, value) in periods {
            if value == 0 {
                return Err(Error::Config(format!("handshake.{} must be > 0", name)));
            }
        }
        if self.enrollment_timeout_secs == Some(0) {
            return Err(Error::Config(
                "handshake.enrollment_timeout_secs must be > 0 (omit it to wait forever)"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Web interface settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub bind: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
        }
    }
}

/// Resolves the root folder using the priority order above
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
        }
    }

    /// Set the command-line override
    pub fn with_cli_arg(mut self, cli_arg: Option<PathBuf>) -> Self {
        self.cli_arg = cli_arg;
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            info!("{}: root folder from command line: {}", self.module_name, path.display());
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                info!("{}: root folder from {}: {}", self.module_name, ROOT_FOLDER_ENV, path);
                return PathBuf::from(path);
            }
        }

        if let Some(path) = user_config_path() {
            if let Some(config) = read_toml_config(&path) {
                if let Some(root) = config.root_folder {
                    info!("{}: root folder from {}: {}", self.module_name, path.display(), root.display());
                    return root;
                }
            }
        }

        let fallback = default_root_folder();
        info!("{}: using default root folder: {}", self.module_name, fallback.display());
        fallback
    }
}

/// Creates the root folder layout and hands out the derived paths
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder)?;
        std::fs::create_dir_all(self.attachments_path())?;
        Ok(())
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }

    pub fn attachments_path(&self) -> PathBuf {
        self.root_folder.join(ATTACHMENTS_DIR_NAME)
    }

    pub fn config_path(&self) -> PathBuf {
        self.root_folder.join(CONFIG_FILE_NAME)
    }
}

/// Load the effective configuration for a root folder
///
/// `<root>/slb.toml` wins over the user config file. Neither is required.
pub fn load_config(root_folder: &Path) -> TomlConfig {
    let candidates = std::iter::once(root_folder.join(CONFIG_FILE_NAME)).chain(user_config_path());

    for path in candidates {
        if !path.exists() {
            continue;
        }
        if let Some(config) = read_toml_config(&path) {
            info!("Loaded configuration from {}", path.display());
            return config;
        }
    }

    info!("No configuration file found, using defaults");
    TomlConfig::default()
}

fn read_toml_config(path: &Path) -> Option<TomlConfig> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str::<TomlConfig>(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!("Ignoring malformed config file {}: {}", path.display(), e);
            None
        }
    }
}

/// `~/.config/sample-log-book/config.toml` (platform equivalent elsewhere)
fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("config.toml"))
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from("/var/lib/sample-log-book"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join(APP_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/sample-log-book"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\sample-log-book"))
    } else {
        PathBuf::from("./sample_log_book_data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings() {
        let t = HandshakeTimings::default();
        assert_eq!(t.idle_poll(), Duration::from_millis(100));
        assert_eq!(t.known_dwell(), Duration::from_secs(3));
        assert_eq!(t.ack_reset(), Duration::from_secs(2));
        assert_eq!(t.consumer_poll(), Duration::from_secs(1));
        assert!(t.enrollment_timeout().is_none());
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            [handshake]
            known_dwell_ms = 2500
            enrollment_timeout_secs = 600
            "#,
        )
        .unwrap();
        assert_eq!(config.handshake.known_dwell_ms, 2500);
        assert_eq!(config.handshake.idle_poll_ms, 100);
        assert_eq!(config.handshake.enrollment_timeout(), Some(Duration::from_secs(600)));
        assert_eq!(config.web.bind, "0.0.0.0:5000");
        assert!(config.root_folder.is_none());
    }

    #[test]
    fn test_validate_rejects_zero_periods() {
        let t = HandshakeTimings {
            ack_poll_ms: 0,
            ..Default::default()
        };
        assert!(matches!(t.validate(), Err(Error::Config(_))));

        let t = HandshakeTimings {
            enrollment_timeout_secs: Some(0),
            ..Default::default()
        };
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_initializer_paths() {
        let init = RootFolderInitializer::new(PathBuf::from("/srv/slb"));
        assert_eq!(init.database_path(), PathBuf::from("/srv/slb/sample_log_book.db"));
        assert_eq!(init.attachments_path(), PathBuf::from("/srv/slb/samples"));
        assert_eq!(init.config_path(), PathBuf::from("/srv/slb/slb.toml"));
    }
}
