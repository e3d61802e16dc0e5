/// Crate-wide error type for bukusync
///
/// Controller operations report `SyncError` to their caller; this enum wraps those
/// together with the I/O, configuration and HTTP failures the rest of the crate can hit.
#[derive(Debug, thiserror::Error)]
pub enum BukusyncError {
    /// I/O errors (config files, runtime setup)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Controller operation errors
    #[error(transparent)]
    Sync(#[from] crate::models::errors::SyncError),

    /// Remote store errors
    #[error(transparent)]
    Store(#[from] crate::models::errors::StoreError),

    /// Invalid input or arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// YAML parsing/serialization errors
    #[error("YAML error: {0}")]
    Yaml(String),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Generic error for cases that don't fit other categories
    #[error("{0}")]
    Other(String),
}

/// Result type alias using BukusyncError
pub type Result<T> = std::result::Result<T, BukusyncError>;

impl From<String> for BukusyncError {
    fn from(s: String) -> Self {
        BukusyncError::Other(s)
    }
}

impl From<&str> for BukusyncError {
    fn from(s: &str) -> Self {
        BukusyncError::Other(s.to_string())
    }
}

impl From<serde_yaml::Error> for BukusyncError {
    fn from(err: serde_yaml::Error) -> Self {
        BukusyncError::Yaml(err.to_string())
    }
}

impl From<serde_json::Error> for BukusyncError {
    fn from(err: serde_json::Error) -> Self {
        BukusyncError::Json(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::errors::{StoreError, SyncError};

    #[test]
    fn test_sync_error_is_transparent() {
        let err: BukusyncError = SyncError::NotAuthenticated.into();
        assert_eq!(err.to_string(), "Not authenticated");
    }

    #[test]
    fn test_store_error_conversion() {
        let err: BukusyncError = StoreError::Unavailable("connection reset".to_string()).into();
        assert!(matches!(err, BukusyncError::Store(_)));
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_string_conversion() {
        let err: BukusyncError = "boom".into();
        assert!(matches!(err, BukusyncError::Other(ref s) if s == "boom"));
    }

    #[test]
    fn test_yaml_conversion() {
        let yaml_err = serde_yaml::from_str::<u32>("not: [a number").unwrap_err();
        let err: BukusyncError = yaml_err.into();
        assert!(matches!(err, BukusyncError::Yaml(_)));
    }
}
