//! Client-side configuration loading
//!
//! Loads server and connection settings from the shared config file
//! (`~/.config/tischat/config.toml`).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tischat_protocol::{LineEnding, Vocabulary, DEFAULT_MAX_LINE_LENGTH};
use tischat_utils::{LogConfig, LogOutput, Result, TischatError, DEFAULT_LOG_FILE};

/// Port tischat-server listens on unless told otherwise
pub const DEFAULT_PORT: u16 = 4020;

/// Everything read from config.toml
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server: ServerConfig,
    pub connection: ConnectionConfig,
    pub protocol: ProtocolConfig,
    pub logging: LoggingConfig,
}

/// Server to log in to
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: DEFAULT_PORT,
        }
    }
}

/// Transport tuning
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Give up on a connect attempt after this many seconds (0 = never)
    pub connect_timeout_secs: u64,
    /// Worker threads for socket I/O and decoding
    pub io_threads: usize,
    pub max_line_length: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            io_threads: 2,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEndingSetting {
    Lf,
    #[default]
    Crlf,
}

impl From<LineEndingSetting> for LineEnding {
    fn from(setting: LineEndingSetting) -> Self {
        match setting {
            LineEndingSetting::Lf => LineEnding::Lf,
            LineEndingSetting::Crlf => LineEnding::CrLf,
        }
    }
}

/// Wire protocol settings
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub line_ending: LineEndingSetting,
}

/// `[logging]`; `TISCHAT_LOG` wins over `level`
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub stderr: bool,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            stderr: false,
            file: Some(DEFAULT_LOG_FILE.into()),
        }
    }
}

impl ClientConfig {
    /// Load from the default config file.
    ///
    /// Returns defaults if the file doesn't exist or can't be parsed.
    pub fn load() -> Self {
        let path = tischat_utils::config_file();

        if !path.exists() {
            tracing::debug!("Config file not found, using defaults");
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Load from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TischatError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| TischatError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        if config.connection.io_threads == 0 {
            return Err(TischatError::ConfigInvalid {
                path: path.to_path_buf(),
                message: "io_threads must be at least 1".into(),
            });
        }

        tracing::debug!(
            host = %config.server.host,
            port = config.server.port,
            "Loaded client config"
        );
        Ok(config)
    }

    /// Subscriber settings for [`tischat_utils::init_logging_with_config`]
    pub fn log_config(&self) -> LogConfig {
        let logging = &self.logging;
        let destination = match (logging.stderr, logging.file.is_some()) {
            (true, true) => LogOutput::Both,
            (false, true) => LogOutput::File,
            _ => LogOutput::Stderr,
        };

        LogConfig {
            destination,
            directives: tischat_utils::directives_from_env(&logging.level),
            log_file: logging.file.clone().unwrap_or_else(|| DEFAULT_LOG_FILE.into()),
            ..LogConfig::default()
        }
    }

    /// Settings for a [`DispatchHub`](crate::DispatchHub) speaking TISCaP
    pub fn hub_config(&self) -> HubConfig {
        let vocabulary =
            Vocabulary::tiscap().with_line_ending(self.protocol.line_ending.into());

        HubConfig {
            vocabulary: Arc::new(vocabulary),
            connect_timeout: match self.connection.connect_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            io_threads: self.connection.io_threads,
            max_line_length: self.connection.max_line_length,
        }
    }
}

/// What a hub needs to run
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub vocabulary: Arc<Vocabulary>,
    pub connect_timeout: Option<Duration>,
    pub io_threads: usize,
    pub max_line_length: usize,
}

impl HubConfig {
    pub fn with_vocabulary(vocabulary: Vocabulary) -> Self {
        Self {
            vocabulary: Arc::new(vocabulary),
            ..Self::default()
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        ClientConfig::default().hub_config()
    }
}
