//! Error types for cubeserve

use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown set, version, detail level, format or cell.
    /// Adapters map this to a 404-equivalent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Missing or invalid startup input. Fatal at startup only.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Fetch failure against the remote source. Retried on the next cycle.
    #[error("transport error: {0}")]
    Transport(String),

    /// An object carrying no usable bounds was offered to an octree.
    #[error("invalid bounds: {0}")]
    InvalidBounds(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot encoding error: {0}")]
    Encoding(String),
}

impl Error {
    /// Shorthand for a [`Error::NotFound`] naming what was missing.
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    /// Whether this error should surface as "not found" to callers.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_helper() {
        let err = Error::not_found("set 'alpha'");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "not found: set 'alpha'");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err: Error = io.into();
        assert!(!err.is_not_found());
        assert!(err.to_string().starts_with("IO error"));
    }
}
