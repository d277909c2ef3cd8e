//! The database driver facade (spec §4.7): the narrow, dialect-agnostic
//! contract the engine consumes. Concrete connections, pooling, and wire
//! protocols live in a per-dialect crate (e.g. `migra-postgres`); this module
//! only names the shape.

use crate::cancel::CancellationToken;
use crate::error::MigrationResult;
use std::future::Future;

/// A bind parameter. Deliberately minimal — the engine itself never binds
/// parameters to install/rollback scripts (it submits their content as a
/// single unparameterized statement); this exists for scripted steps that
/// issue parameterized queries through the same provider.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Text(String),
    Bytes(Vec<u8>),
}

/// A connection (or transaction) capable of running SQL text.
///
/// This is the only surface the engine touches on a provider.
pub trait Provider: Send + Sync {
    /// Run one SQL statement, returning the number of rows affected.
    fn execute_sql(
        &self,
        cancel: &CancellationToken,
        sql: &str,
        params: &[SqlParam],
    ) -> impl Future<Output = MigrationResult<u64>> + Send;

    /// Build a statement bound to `sql`, to be `execute`d separately.
    fn statement<'p>(&'p self, sql: &'p str) -> Statement<'p, Self>
    where
        Self: Sized,
    {
        Statement { provider: self, sql }
    }
}

/// A single SQL text bound to a provider, per spec §4.7
/// (`Provider.statement(sql) -> Statement`).
pub struct Statement<'p, P: Provider + ?Sized> {
    provider: &'p P,
    sql: &'p str,
}

impl<'p, P: Provider + ?Sized> Statement<'p, P> {
    /// Execute this statement, awaiting completion before the caller advances.
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        params: &[SqlParam],
    ) -> MigrationResult<u64> {
        self.provider.execute_sql(cancel, self.sql, params).await
    }
}

/// The engine's only injection point: a factory capable of producing scoped
/// connections with guaranteed release on every exit path (success,
/// exception, cancellation).
pub trait DriverFactory: Send + Sync {
    type Provider: Provider;

    /// Acquire a short-lived, non-transactional connection — used for the
    /// version-table existence check and creation (spec §4.4 step 4).
    fn create(
        &self,
        cancel: &CancellationToken,
    ) -> impl Future<Output = MigrationResult<Self::Provider>> + Send;

    /// Scoped acquisition: `worker` runs with a fresh provider that is
    /// released when `worker` returns, panics, or cancellation is observed.
    fn using_provider<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        worker: F,
    ) -> impl Future<Output = MigrationResult<T>> + Send
    where
        F: FnOnce(Self::Provider) -> Fut + Send,
        Fut: Future<Output = MigrationResult<T>> + Send,
        T: Send;

    /// As [`DriverFactory::using_provider`], but additionally opens a
    /// transaction on entry: commits iff `worker` returns `Ok`, otherwise
    /// rolls back before releasing the connection.
    fn using_provider_with_transaction<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        worker: F,
    ) -> impl Future<Output = MigrationResult<T>> + Send
    where
        F: FnOnce(Self::Provider) -> Fut + Send,
        Fut: Future<Output = MigrationResult<T>> + Send,
        T: Send;
}
