//! Error types for Temporal-Graph

use thiserror::Error;

/// Result type alias for Temporal-Graph operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Temporal-Graph
#[derive(Error, Debug)]
pub enum Error {
    /// A value broke an invariant at the call that introduced it
    /// (calendar field out of range, empty span, span outside a lifespan).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Stored data is inconsistent (malformed partition description,
    /// type fact naming an unregistered type).
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// The requested entity, property or partition does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Schema registry or store configuration is unusable
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// `true` for the expected "does not exist" condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// `true` when stored data was found to be inconsistent.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(Error::NotFound("x".into()).is_not_found());
        assert!(!Error::Validation("x".into()).is_not_found());
        assert!(Error::Corruption("x".into()).is_corruption());
    }

    #[test]
    fn test_serde_error_conversion() {
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
