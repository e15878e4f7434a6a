use common::ProductId;
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced product does not exist.
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    /// A customer with the same email address is already registered.
    ///
    /// Surfaced as its own variant so the API can report it to the user
    /// instead of folding it into a generic storage failure.
    #[error("email already registered")]
    DuplicateEmail,

    /// A row lock could not be acquired within the configured wait.
    ///
    /// The caller may retry the whole unit of work.
    #[error("row lock wait timed out")]
    LockTimeout,

    /// A storage-level constraint was violated.
    #[error("constraint violated: {0}")]
    ConstraintViolation(String),

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
