//! Configuration file for the emulator monitor client
//!
//! Settings are read from a TOML file. Every key is optional; missing
//! keys take their default value.
//!
//! ```toml
//! [connection]
//! socket = "/tmp/emu-monitor.sock"
//! connect_attempts = 5
//! read_timeout_ms = 50
//!
//! [target]
//! address_max = 0xffff
//! max_payload = 65536
//!
//! [view]
//! window_height = 20
//! page_size = 6
//!
//! [log]
//! file = "emu-monitor.log"
//! ```
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Deserialize(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub connection: Connection,
    pub target: Target,
    pub view: View,
    pub log: Log,
}

/// How to reach the monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Connection {
    /// Path of the monitor's unix socket
    pub socket: PathBuf,
    /// Connection attempts before giving up, with exponential back-off
    pub connect_attempts: usize,
    /// How long a single read waits before reporting that nothing arrived
    pub read_timeout_ms: u64,
}

impl Default for Connection {
    fn default() -> Self {
        Self {
            socket: std::env::temp_dir().join("emu-monitor.sock"),
            connect_attempts: 5,
            read_timeout_ms: 50,
        }
    }
}

/// Properties of the emulated machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Target {
    pub address_max: u32,
    /// Largest message payload accepted from the monitor
    pub max_payload: usize,
}

impl Default for Target {
    fn default() -> Self {
        Self {
            address_max: 0xffff,
            max_payload: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct View {
    /// Instructions shown in the source view
    pub window_height: usize,
    /// Lines moved by a page up/down
    pub page_size: usize,
}

impl Default for View {
    fn default() -> Self {
        Self {
            window_height: 20,
            page_size: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Log {
    pub file: PathBuf,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            file: PathBuf::from("emu-monitor.log"),
        }
    }
}

/// `<config dir>/emu-monitor/config.toml`, if the platform has a config dir
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("emu-monitor").join("config.toml"))
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one the default location is
    /// tried, and a missing file there yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_path(path),
            None => match default_path() {
                Some(path) if path.is_file() => Self::from_path(&path),
                Some(path) => {
                    tracing::debug!(path = %path.display(), "no config file, using defaults");
                    Ok(Self::default())
                }
                None => {
                    tracing::debug!("no config directory, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        tracing::debug!(path = %path.display(), "loading config file");
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.view.window_height == 0 {
            return Err(ConfigError::Invalid("view.window_height must be at least 1".to_string()));
        }
        if self.view.page_size == 0 {
            return Err(ConfigError::Invalid("view.page_size must be at least 1".to_string()));
        }
        if self.connection.connect_attempts == 0 {
            return Err(ConfigError::Invalid(
                "connection.connect_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = Config::parse(
            r#"
            [target]
            address_max = 0x7fff

            [view]
            window_height = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.target.address_max, 0x7fff);
        assert_eq!(config.target.max_payload, 64 * 1024);
        assert_eq!(config.view.window_height, 8);
        assert_eq!(config.view.page_size, 6);
        assert_eq!(config.connection, Connection::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Config::parse("[view]\nheight = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Deserialize(_)));
    }

    #[test]
    fn zero_window_height_is_invalid() {
        let err = Config::parse("[view]\nwindow_height = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn load_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[connection]\nsocket = \"/run/gb.sock\"\nconnect_attempts = 2\n\n[log]\nfile = \"/tmp/m.log\""
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.connection.socket, PathBuf::from("/run/gb.sock"));
        assert_eq!(config.connection.connect_attempts, 2);
        assert_eq!(config.connection.read_timeout_ms, 50);
        assert_eq!(config.log.file, PathBuf::from("/tmp/m.log"));
    }

    #[test]
    fn explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[view\nwindow_height = ").unwrap();
        assert!(matches!(
            Config::load(Some(file.path())),
            Err(ConfigError::Deserialize(_))
        ));
    }
}
