//! PostgreSQL-specific error classification, wrapped into
//! [`migra::MigrationError::Driver`] at the call site.

use thiserror::Error;

/// Errors originating from the Postgres driver, classified by SQLSTATE the
/// same way `pgorm`'s `OrmError::from_db_error` does, before being handed to
/// the engine as an opaque [`migra::MigrationError::Driver`].
#[derive(Debug, Error)]
pub enum PgDriverError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    #[error("pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("unique constraint violation: {0}")]
    UniqueViolation(String),

    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("check constraint violation: {0}")]
    CheckViolation(String),
}

impl PgDriverError {
    /// Classify a `tokio_postgres::Error` by SQLSTATE, falling back to the
    /// generic `Query` variant when no more specific code matches.
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let constraint = db_err.constraint().unwrap_or("unknown");
            let message = db_err.message();
            match db_err.code().code() {
                "23505" => return Self::UniqueViolation(format!("{constraint}: {message}")),
                "23503" => return Self::ForeignKeyViolation(format!("{constraint}: {message}")),
                "23514" => return Self::CheckViolation(format!("{constraint}: {message}")),
                _ => {}
            }
        }
        Self::Query(err)
    }
}

/// Wrap a [`PgDriverError`] as a [`migra::MigrationError::Driver`].
pub(crate) fn driver_err(err: impl Into<PgDriverError>) -> migra::MigrationError {
    migra::MigrationError::driver(err.into())
}
