use thiserror::Error;

/// Top-level error type for Hatch.
///
/// Subsystem crates define their own error enums and convert into
/// `HatchError` (or from it) so that `?` works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for HatchError {
    fn from(err: toml::de::Error) -> Self {
        HatchError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for HatchError {
    fn from(err: toml::ser::Error) -> Self {
        HatchError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for HatchError {
    fn from(err: serde_json::Error) -> Self {
        HatchError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Hatch operations.
pub type Result<T> = std::result::Result<T, HatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HatchError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");

        let err = HatchError::NotFound("idea 42".to_string());
        assert_eq!(err.to_string(), "Not found: idea 42");

        let err = HatchError::Upstream("timeout".to_string());
        assert_eq!(err.to_string(), "Upstream error: timeout");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: HatchError = io_err.into();
        assert!(matches!(err, HatchError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_toml_error_conversion() {
        let parse_err = toml::from_str::<toml::Value>("not = [valid").unwrap_err();
        let err: HatchError = parse_err.into();
        assert!(matches!(err, HatchError::Config(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: HatchError = parse_err.into();
        assert!(matches!(err, HatchError::Serialization(_)));
    }
}
