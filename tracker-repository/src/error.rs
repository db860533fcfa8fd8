//! Crate-level error type for setup paths
//!
//! Repository calls return [`RepositoryError`]; this type covers loading
//! configuration, installing tracing and connecting to the database.

use thiserror::Error;

use crate::repository::RepositoryError;

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised outside individual repository operations
///
/// Large error variants are boxed to reduce stack size
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Database bootstrap error
    #[error("Database error: {0}")]
    Database(String),

    /// Repository operation error
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

// Manual From implementation for the boxed variant
impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_is_transparent() {
        let err: Error = RepositoryError::not_found("meals", 4).into();
        assert_eq!(
            err.to_string(),
            "Repository not_found error during get_by_id: Entity not found [meals: 4]"
        );
    }

    #[test]
    fn test_figment_error_is_boxed() {
        let figment_err = figment::Figment::new()
            .extract::<crate::config::Config>()
            .unwrap_err();
        let err: Error = figment_err.into();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().starts_with("Configuration error"));
    }
}
