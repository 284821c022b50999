use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{QueryDeskError, Result};

/// Top-level configuration for the QueryDesk service.
///
/// Loaded from `~/.querydesk/config.toml` by default. Each section corresponds
/// to one layer of the service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryDeskConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub collaborators: CollaboratorConfig,
}

impl QueryDeskConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: QueryDeskConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| QueryDeskError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory holding the SQLite file when `database.path` is relative.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.querydesk/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Relational engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file name or path. `:memory:` opens an in-memory database.
    pub path: String,
    /// Populate the sample tables on first start.
    pub seed_sample_data: bool,
    /// Hard cap on rows returned by a single read.
    pub max_rows: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "querydesk.db".to_string(),
            seed_sample_data: true,
            max_rows: 500,
        }
    }
}

/// Conversation pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Maximum query length in characters.
    pub max_query_length: usize,
    /// Number of recent history entries handed to handlers as context.
    pub context_turns: usize,
    /// Number of history entries returned with each reply.
    pub reply_history_limit: usize,
    /// Row limit used by template SQL when the query names none.
    pub default_row_limit: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_query_length: 2000,
            context_turns: 10,
            reply_history_limit: 10,
            default_row_limit: 50,
        }
    }
}

/// Timeouts for the external classification, generation, and database calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaboratorConfig {
    pub classify_timeout_ms: u64,
    pub generation_timeout_ms: u64,
    pub query_timeout_ms: u64,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            classify_timeout_ms: 2_000,
            generation_timeout_ms: 8_000,
            query_timeout_ms: 5_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = QueryDeskConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.database.path, "querydesk.db");
        assert!(config.database.seed_sample_data);
        assert_eq!(config.chat.max_query_length, 2000);
        assert_eq!(config.chat.reply_history_limit, 10);
        assert_eq!(config.collaborators.classify_timeout_ms, 2_000);
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
log_level = "debug"

[server]
host = "0.0.0.0"
port = 9090

[database]
path = ":memory:"
seed_sample_data = false
max_rows = 20

[collaborators]
classify_timeout_ms = 150
"#;
        let file = create_temp_config(content);
        let config = QueryDeskConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.database.path, ":memory:");
        assert!(!config.database.seed_sample_data);
        assert_eq!(config.database.max_rows, 20);
        assert_eq!(config.collaborators.classify_timeout_ms, 150);
        // Unset fields in a present section keep their defaults
        assert_eq!(config.collaborators.query_timeout_ms, 5_000);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let content = r#"
[chat]
context_turns = 3
"#;
        let file = create_temp_config(content);
        let config = QueryDeskConfig::load(file.path()).unwrap();
        assert_eq!(config.chat.context_turns, 3);
        assert_eq!(config.chat.max_query_length, 2000);
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = QueryDeskConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.general.data_dir, "~/.querydesk/data");
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("this is [not valid");
        let err = QueryDeskConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, QueryDeskError::Config(_)));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = QueryDeskConfig::default();
        config.server.port = 7070;
        config.save(&path).unwrap();
        assert!(path.exists());

        let reloaded = QueryDeskConfig::load(&path).unwrap();
        assert_eq!(reloaded.server.port, 7070);
        assert_eq!(reloaded.database.max_rows, config.database.max_rows);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let file = create_temp_config("");
        let config = QueryDeskConfig::load(file.path()).unwrap();
        assert_eq!(config.chat.default_row_limit, 50);
        assert_eq!(config.collaborators.generation_timeout_ms, 8_000);
    }
}
