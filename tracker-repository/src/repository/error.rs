//! Repository error types
//!
//! Every repository operation returns a [`RepositoryError`] that records which
//! operation failed, the category of failure and, when known, the collection
//! and identifier involved.
//!
//! # Example
//!
//! ```rust
//! use tracker_repository::repository::{RepositoryError, RepositoryErrorKind};
//!
//! let error = RepositoryError::not_found("exercises", 42);
//! assert!(matches!(error.kind, RepositoryErrorKind::NotFound));
//! assert_eq!(error.entity_id.as_deref(), Some("42"));
//! ```

use std::fmt;

/// Operation being performed when the repository error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    /// Fetching a single entity by ID
    GetById,
    /// Listing entities
    GetAll,
    /// Listing one page of entities
    GetAllPaginated,
    /// Fetching the first entity matching options
    FindOne,
    /// Counting entities matching options
    Count,
    /// Checking if an entity exists
    Exists,
    /// Creating a new entity
    Create,
    /// Updating an existing entity
    Update,
    /// Deleting an entity (soft when supported)
    Delete,
    /// Permanently removing an entity
    DeleteHard,
    /// Restoring a soft-deleted entity
    Restore,
    /// Creating several entities at once
    CreateBatch,
    /// Updating several entities in one transaction
    UpdateBatch,
    /// Deleting several entities at once
    DeleteBatch,
    /// Fetching the entity recorded on a date
    GetByDate,
    /// Listing entities within a date range
    GetByDateRange,
    /// Running a unit of work
    Transaction,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GetById => "get_by_id",
            Self::GetAll => "get_all",
            Self::GetAllPaginated => "get_all_paginated",
            Self::FindOne => "find_one",
            Self::Count => "count",
            Self::Exists => "exists",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::DeleteHard => "delete_hard",
            Self::Restore => "restore",
            Self::CreateBatch => "create_batch",
            Self::UpdateBatch => "update_batch",
            Self::DeleteBatch => "delete_batch",
            Self::GetByDate => "get_by_date",
            Self::GetByDateRange => "get_by_date_range",
            Self::Transaction => "transaction",
        };
        f.write_str(name)
    }
}

/// Category of repository error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// No row matched where exactly one was expected
    NotFound,
    /// Uniqueness constraint violated
    AlreadyExists,
    /// Request rejected before reaching the store
    ValidationFailed,
    /// Store could not be reached
    ConnectionFailed,
    /// Deadline exceeded
    Timeout,
    /// Caller cancelled the operation
    Cancelled,
    /// Any other store failure
    Store,
    /// Row could not be converted to or from the entity type
    Serialization,
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::ValidationFailed => "validation_failed",
            Self::ConnectionFailed => "connection_failed",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Store => "store",
            Self::Serialization => "serialization",
        };
        f.write_str(name)
    }
}

/// Structured repository error with operation context
///
/// ```rust
/// use tracker_repository::repository::{RepositoryError, RepositoryOperation};
///
/// let error = RepositoryError::not_found("meals", 7).with_operation(RepositoryOperation::Update);
/// assert_eq!(
///     error.to_string(),
///     "Repository not_found error during update: Entity not found [meals: 7]"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryError {
    /// The operation being performed when the error occurred
    pub operation: RepositoryOperation,
    /// The category of error
    pub kind: RepositoryErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Collection of the entity involved (e.g., "exercises")
    pub entity_type: Option<String>,
    /// The ID of the entity involved
    pub entity_id: Option<String>,
}

impl RepositoryError {
    /// Create a new repository error
    pub fn new(
        operation: RepositoryOperation,
        kind: RepositoryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            entity_type: None,
            entity_id: None,
        }
    }

    /// Create a "not found" error with entity context
    pub fn not_found(entity_type: impl Into<String>, entity_id: impl fmt::Display) -> Self {
        Self::new(
            RepositoryOperation::GetById,
            RepositoryErrorKind::NotFound,
            "Entity not found",
        )
        .with_entity(entity_type, entity_id)
    }

    /// Create a "not found" error for a query that matched nothing
    pub fn no_match(operation: RepositoryOperation, entity_type: impl Into<String>) -> Self {
        let mut error = Self::new(operation, RepositoryErrorKind::NotFound, "No matching entity");
        error.entity_type = Some(entity_type.into());
        error
    }

    /// Create an "already exists" error
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::Create,
            RepositoryErrorKind::AlreadyExists,
            message,
        )
    }

    /// Create a validation failed error
    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::GetAll,
            RepositoryErrorKind::ValidationFailed,
            message,
        )
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::GetAll,
            RepositoryErrorKind::ConnectionFailed,
            message,
        )
    }

    /// Create a timeout error
    pub fn timeout(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::Timeout, message)
    }

    /// Create a cancellation error
    pub fn cancelled(operation: RepositoryOperation) -> Self {
        Self::new(
            operation,
            RepositoryErrorKind::Cancelled,
            "Operation cancelled by caller",
        )
    }

    /// Wrap a store failure
    pub fn store(message: impl Into<String>) -> Self {
        Self::new(RepositoryOperation::GetAll, RepositoryErrorKind::Store, message)
    }

    /// Create a serialization error
    pub fn serialization(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::Serialization, message)
    }

    /// Add entity context to an existing error
    #[must_use]
    pub fn with_entity(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl fmt::Display,
    ) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.to_string());
        self
    }

    /// Set the collection when the store did not already record one
    #[must_use]
    pub fn with_collection(mut self, collection: &str) -> Self {
        if self.entity_type.is_none() {
            self.entity_type = Some(collection.to_string());
        }
        self
    }

    /// Set the operation that caused the error
    #[must_use]
    pub fn with_operation(mut self, operation: RepositoryOperation) -> Self {
        self.operation = operation;
        self
    }

    /// True when zero rows matched where one was expected
    pub fn is_not_found(&self) -> bool {
        self.kind == RepositoryErrorKind::NotFound
    }

    /// True when the caller's context was cancelled or its deadline passed
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self.kind,
            RepositoryErrorKind::Cancelled | RepositoryErrorKind::Timeout
        )
    }

    /// Check if this error is retriable (transient errors that may succeed on retry)
    ///
    /// ```rust
    /// use tracker_repository::repository::RepositoryError;
    ///
    /// assert!(RepositoryError::connection_failed("Connection reset").is_retriable());
    /// assert!(!RepositoryError::not_found("foods", 1).is_retriable());
    /// ```
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            RepositoryErrorKind::ConnectionFailed | RepositoryErrorKind::Timeout
        )
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let (Some(entity_type), Some(entity_id)) = (&self.entity_type, &self.entity_id) {
            write!(f, " [{}: {}]", entity_type, entity_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for RepositoryError {}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(RepositoryOperation::GetAll, err.to_string())
    }
}

/// Result type for repository operations
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;
