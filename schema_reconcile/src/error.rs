//! Error types for schema reconciliation

use thiserror::Error;

use crate::schema::types::Side;

/// Result type for reconciliation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed cause carried by [`Error::SourceReadError`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error types for schema reconciliation
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Error reading the {side} schema: {source}")]
    SourceReadError {
        side: Side,
        #[source]
        source: BoxError,
    },

    #[error("Cannot convert the data type: {0}")]
    TypeMappingError(String),

    #[error("Name collision in the {side} schema: `{first}` and `{second}` differ only by case")]
    NameCollision {
        side: Side,
        first: String,
        second: String,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl Error {
    /// Wrap a collaborator failure as a read error for one side.
    ///
    /// Type mapping failures pass through untouched so callers can still
    /// match on them directly.
    pub fn source_read(side: Side, error: Error) -> Self {
        match error {
            Error::TypeMappingError(_) | Error::SourceReadError { .. } => error,
            other => Error::SourceReadError {
                side,
                source: Box::new(other),
            },
        }
    }
}

/// Convert Serde JSON errors
impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::SerializationError(error.to_string())
    }
}

/// Convert Serde YAML errors
impl From<serde_yaml::Error> for Error {
    fn from(error: serde_yaml::Error) -> Self {
        Error::SerializationError(error.to_string())
    }
}

/// Convert TOML deserialization errors
impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::SerializationError(error.to_string())
    }
}

/// Convert TOML serialization errors
impl From<toml::ser::Error> for Error {
    fn from(error: toml::ser::Error) -> Self {
        Error::SerializationError(error.to_string())
    }
}
