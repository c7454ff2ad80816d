//! Tracing subscriber setup
//!
//! A chat UI usually owns the terminal, so the client preset writes to a file
//! under [`paths::log_dir`] and stays quiet unless `TISCHAT_LOG` says otherwise.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::{paths, Result, TischatError};

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "TISCHAT_LOG";

/// Log file used when none is named
pub const DEFAULT_LOG_FILE: &str = "tischat.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stderr,
    File,
    Both,
}

impl LogOutput {
    fn to_stderr(self) -> bool {
        matches!(self, Self::Stderr | Self::Both)
    }

    fn to_file(self) -> bool {
        matches!(self, Self::File | Self::Both)
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub destination: LogOutput,
    /// `EnvFilter` directives, e.g. "info" or "tischat_client=debug"
    pub directives: String,
    /// Also log span enter/exit
    pub spans: bool,
    /// Include file and line of the call site
    pub source_location: bool,
    /// File name inside the log dir
    pub log_file: String,
    /// Overrides [`paths::log_dir`]
    pub log_dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            destination: LogOutput::Stderr,
            directives: "info".into(),
            spans: false,
            source_location: false,
            log_file: DEFAULT_LOG_FILE.into(),
            log_dir: None,
        }
    }
}

impl LogConfig {
    /// File logging at `warn`, or whatever `TISCHAT_LOG` holds
    pub fn client() -> Self {
        Self {
            destination: LogOutput::File,
            directives: directives_from_env("warn"),
            ..Self::default()
        }
    }

    /// Everything at `debug` on stderr, with spans and call sites
    pub fn development() -> Self {
        Self {
            directives: "debug".into(),
            spans: true,
            source_location: true,
            ..Self::default()
        }
    }

    fn span_events(&self) -> FmtSpan {
        if self.spans {
            FmtSpan::ENTER | FmtSpan::EXIT
        } else {
            FmtSpan::NONE
        }
    }

    fn log_path(&self) -> (PathBuf, &str) {
        let dir = self.log_dir.clone().unwrap_or_else(paths::log_dir);
        (dir, &self.log_file)
    }
}

/// `TISCHAT_LOG` if set, else `fallback`
pub fn directives_from_env(fallback: &str) -> String {
    std::env::var(LOG_ENV).unwrap_or_else(|_| fallback.to_owned())
}

pub fn init_logging() -> Result<()> {
    init_logging_with_config(LogConfig::default())
}

/// Install the global subscriber described by `config`.
///
/// Fails on a bad filter, an unopenable log file, or when a subscriber is
/// already installed.
pub fn init_logging_with_config(config: LogConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.directives)
        .map_err(|e| TischatError::config(format!("Invalid log filter: {}", e)))?;

    let stderr_layer = config.destination.to_stderr().then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_thread_names(true)
            .with_span_events(config.span_events())
            .with_file(config.source_location)
            .with_line_number(config.source_location)
    });

    let file_layer = if config.destination.to_file() {
        let (dir, name) = config.log_path();
        let file = open_log_file(&dir, name)?;
        Some(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_thread_names(true)
                .with_span_events(config.span_events())
                .with_file(config.source_location)
                .with_line_number(config.source_location),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| TischatError::internal(format!("Failed to init logging: {}", e)))
}

/// Append to `dir/name`, creating `dir` first
fn open_log_file(dir: &Path, name: &str) -> Result<File> {
    let write_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| TischatError::FileWrite { path, source }
    };

    std::fs::create_dir_all(dir).map_err(write_error(dir))?;
    let path = dir.join(name);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(write_error(&path))
}
