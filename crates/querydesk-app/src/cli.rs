//! CLI argument definitions for the QueryDesk server.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::{Path, PathBuf};

/// QueryDesk - ask questions about your data in plain language.
#[derive(Parser, Debug)]
#[command(name = "querydesk", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Address to bind the API server to.
    #[arg(long = "host")]
    pub host: Option<String>,

    /// API server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// SQLite database file (or ":memory:").
    #[arg(long = "db")]
    pub db: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Do not load the sample data into an empty database.
    #[arg(long = "no-seed")]
    pub no_seed: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > QUERYDESK_CONFIG env var > ~/.querydesk/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("QUERYDESK_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the API server port.
    ///
    /// Priority: --port flag > QUERYDESK_PORT env var > config file value.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        if let Some(p) = self.port {
            return p;
        }
        if let Ok(val) = std::env::var("QUERYDESK_PORT") {
            if let Ok(p) = val.parse::<u16>() {
                return p;
            }
        }
        config_port
    }

    /// Resolve the bind address. Priority: --host flag > config file value.
    pub fn resolve_host(&self, config_host: &str) -> String {
        self.host.clone().unwrap_or_else(|| config_host.to_string())
    }

    /// Resolve the log level. Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }

    /// Resolve the database location.
    ///
    /// Priority: --db flag > config file value. Relative config paths live
    /// under the data directory; `:memory:` is passed through.
    pub fn resolve_db_path(&self, config_path: &str, data_dir: &str) -> PathBuf {
        if let Some(ref p) = self.db {
            return p.clone();
        }
        let path = Path::new(config_path);
        if config_path == ":memory:" || path.is_absolute() {
            return path.to_path_buf();
        }
        expand_home(data_dir).join(path)
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(dir: &str) -> PathBuf {
    match dir.strip_prefix("~/").or_else(|| dir.strip_prefix("~\\")) {
        Some(rest) => home_dir().join(rest),
        None => PathBuf::from(dir),
    }
}

fn home_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    let home = std::env::var("USERPROFILE");
    #[cfg(not(target_os = "windows"))]
    let home = std::env::var("HOME");
    home.map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    home_dir().join(".querydesk").join("config.toml")
}
