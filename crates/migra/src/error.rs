//! Error types for the migration engine.

use thiserror::Error;

/// Result type alias for migration engine operations.
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Error types surfaced by `Sources` loading/saving and `Manager` execution.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Source tree malformed, missing, or logically inconsistent.
    #[error("{0}")]
    WrongMigrationData(String),

    /// Bad parameter to a public operation (unknown version name, missing
    /// destination directory, unsupported script-kind coercion).
    #[error("invalid argument '{argument}': {message}")]
    InvalidArgument { argument: String, message: String },

    /// Unrecognized URI scheme passed to `Sources::load`.
    #[error("unsupported url schema '{0}'")]
    NotSupportedUrlSchema(String),

    /// Recognized but unimplemented URI scheme (`http+tar+gz`, `https+tar+gz`).
    #[error("'{0}' sources are not implemented")]
    NotImplemented(String),

    /// Operation invoked in an illegal state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Cooperative cancellation acknowledged.
    #[error("cancelled")]
    Cancelled,

    /// Error originating from the database driver, propagated unchanged.
    #[error("driver error: {0}")]
    Driver(#[from] Box<dyn std::error::Error + Send + Sync>),

    /// Generic engine failure not covered by a more specific variant.
    #[error("migration error: {0}")]
    Migration(String),
}

impl MigrationError {
    /// Build a [`MigrationError::WrongMigrationData`].
    pub fn wrong_data(message: impl Into<String>) -> Self {
        Self::WrongMigrationData(message.into())
    }

    /// Build a [`MigrationError::InvalidArgument`].
    pub fn invalid_argument(argument: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument: argument.into(),
            message: message.into(),
        }
    }

    /// Wrap an arbitrary driver-origin error as [`MigrationError::Driver`].
    pub fn driver(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Driver(Box::new(err))
    }

    /// True if this is a cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
