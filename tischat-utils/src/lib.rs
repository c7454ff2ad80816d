//! tischat-utils: Common utilities shared across tischat crates
//!
//! This crate provides:
//! - Unified error types ([`TischatError`], [`ConnectionError`], [`Result`])
//! - Logging infrastructure ([`init_logging`], [`LogConfig`])
//! - XDG-compliant path utilities ([`paths`] module)

pub mod error;
pub mod logging;
pub mod paths;

pub use error::{ConnectionError, Result, TischatError};
pub use logging::{
    directives_from_env, init_logging, init_logging_with_config, LogConfig, LogOutput,
    DEFAULT_LOG_FILE, LOG_ENV,
};

pub use paths::{config_dir, config_file, log_dir, state_dir};
