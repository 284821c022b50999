use thiserror::Error;

/// Top-level error type for the QueryDesk system.
///
/// Subsystem crates define their own error types and implement
/// `From<SubsystemError> for QueryDeskError` (or the reverse) so that the `?`
/// operator works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QueryDeskError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query execution error: {0}")]
    Execution(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown role: {0}")]
    UnknownRole(String),
}

impl From<toml::de::Error> for QueryDeskError {
    fn from(err: toml::de::Error) -> Self {
        QueryDeskError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for QueryDeskError {
    fn from(err: toml::ser::Error) -> Self {
        QueryDeskError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for QueryDeskError {
    fn from(err: serde_json::Error) -> Self {
        QueryDeskError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for QueryDesk operations.
pub type Result<T> = std::result::Result<T, QueryDeskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QueryDeskError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: QueryDeskError = io_err.into();
        assert!(matches!(err, QueryDeskError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_display_all_variants() {
        let cases: Vec<(QueryDeskError, &str)> = vec![
            (
                QueryDeskError::Storage("disk full".to_string()),
                "Storage error: disk full",
            ),
            (
                QueryDeskError::Execution("no such table: x".to_string()),
                "Query execution error: no such table: x",
            ),
            (
                QueryDeskError::Schema("empty".to_string()),
                "Schema error: empty",
            ),
            (
                QueryDeskError::Api("bind failed".to_string()),
                "API error: bind failed",
            ),
            (
                QueryDeskError::Serialization("eof".to_string()),
                "Serialization error: eof",
            ),
            (
                QueryDeskError::UnknownRole("guest".to_string()),
                "Unknown role: guest",
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.to_string(), expected);
        }
    }

    #[test]
    fn test_toml_error_conversion() {
        let parse_err = toml::from_str::<toml::Value>("not = = toml").unwrap_err();
        let err: QueryDeskError = parse_err.into();
        assert!(matches!(err, QueryDeskError::Config(_)));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{broken").unwrap_err();
        let err: QueryDeskError = json_err.into();
        assert!(matches!(err, QueryDeskError::Serialization(_)));
    }
}
