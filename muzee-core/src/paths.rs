//! Path constants for configuration, database and log files.

use std::path::PathBuf;

/// The name of the configuration directory under ~/.config/
pub const CONFIG_DIR_NAME: &str = "muzee";

/// The name of the main configuration file
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// The name of the SQLite database file
pub const DATABASE_FILE_NAME: &str = "muzee.db";

/// The name of the log file written when file logging is enabled
pub const LOG_FILE_NAME: &str = "muzee.log";

/// Get the configuration directory path (~/.config/muzee/)
#[must_use]
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join(CONFIG_DIR_NAME)
}

/// Get the config file path (~/.config/muzee/config.toml)
#[must_use]
pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Get the default database path (`~/.config/muzee/muzee.db`)
#[must_use]
pub fn database_path() -> PathBuf {
    config_dir().join(DATABASE_FILE_NAME)
}

/// Get the log file path (`~/.config/muzee/muzee.log`)
#[must_use]
pub fn log_file_path() -> PathBuf {
    config_dir().join(LOG_FILE_NAME)
}
