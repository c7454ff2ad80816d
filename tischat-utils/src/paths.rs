//! Path utilities for tischat
//!
//! Resolves XDG Base Directory locations for config and state.

use directories::ProjectDirs;
use std::path::PathBuf;

const APP_NAME: &str = "tischat";

/// `pick` from the platform dirs, else `$HOME/<fallback>/tischat`
fn resolve(pick: impl FnOnce(&ProjectDirs) -> Option<PathBuf>, fallback: &[&str]) -> PathBuf {
    ProjectDirs::from("", "", APP_NAME)
        .as_ref()
        .and_then(pick)
        .unwrap_or_else(|| {
            let home = std::env::var_os("HOME").map_or_else(|| PathBuf::from("/tmp"), PathBuf::from);
            fallback.iter().fold(home, |dir, part| dir.join(part)).join(APP_NAME)
        })
}

/// `$XDG_CONFIG_HOME/tischat`, falling back to `~/.config/tischat`
pub fn config_dir() -> PathBuf {
    resolve(|dirs| Some(dirs.config_dir().to_path_buf()), &[".config"])
}

/// `config.toml` inside [`config_dir`]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// `$XDG_STATE_HOME/tischat`, falling back to `~/.local/state/tischat`
pub fn state_dir() -> PathBuf {
    resolve(|dirs| dirs.state_dir().map(|d| d.to_path_buf()), &[".local", "state"])
}

/// Where [`crate::init_logging_with_config`] writes log files
pub fn log_dir() -> PathBuf {
    state_dir().join("log")
}
