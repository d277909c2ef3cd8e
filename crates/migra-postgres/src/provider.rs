//! [`migra::driver::Provider`] implementation over a pooled
//! `tokio_postgres` connection.

use crate::error::driver_err;
use migra::cancel::CancellationToken;
use migra::driver::{Provider, SqlParam};
use migra::error::MigrationResult;
use std::sync::Arc;
use tokio_postgres::types::ToSql;

/// A pooled connection, shared (via `Arc`) between the provider handed to
/// callers and the driver factory's own `BEGIN`/`COMMIT`/`ROLLBACK`
/// bracketing — see [`crate::driver::PgDriverFactory::using_provider_with_transaction`].
#[derive(Clone)]
pub struct PgProvider {
    pub(crate) client: Arc<deadpool_postgres::Object>,
}

impl Provider for PgProvider {
    /// Submits `sql` to the connection.
    ///
    /// Unparameterized calls (the engine's own install/rollback script
    /// submission, per spec §4.4) go through `batch_execute`, which accepts
    /// multi-statement SQL text — migration scripts routinely contain more
    /// than one DDL statement, and `tokio_postgres::Client::execute` only
    /// accepts a single statement. Parameterized calls (scripted steps
    /// issuing queries through [`migra::step::ExecuteStep`]) go through
    /// `execute`, which reports the affected row count; `batch_execute`
    /// reports none, so unparameterized calls return `0`.
    async fn execute_sql(
        &self,
        cancel: &CancellationToken,
        sql: &str,
        params: &[SqlParam],
    ) -> MigrationResult<u64> {
        cancel.check()?;
        if params.is_empty() {
            self.client
                .batch_execute(sql)
                .await
                .map_err(|e| driver_err(crate::error::PgDriverError::from_db_error(e)))?;
            Ok(0)
        } else {
            let bound: Vec<Box<dyn ToSql + Sync + Send>> =
                params.iter().map(to_tosql).collect();
            let refs: Vec<&(dyn ToSql + Sync)> =
                bound.iter().map(|b| b.as_ref() as &(dyn ToSql + Sync)).collect();
            let affected = self
                .client
                .execute(sql, &refs)
                .await
                .map_err(|e| driver_err(crate::error::PgDriverError::from_db_error(e)))?;
            Ok(affected)
        }
    }
}

fn to_tosql(param: &SqlParam) -> Box<dyn ToSql + Sync + Send> {
    match param.clone() {
        SqlParam::Null => Box::new(Option::<String>::None),
        SqlParam::Bool(v) => Box::new(v),
        SqlParam::I64(v) => Box::new(v),
        SqlParam::F64(v) => Box::new(v),
        SqlParam::Text(v) => Box::new(v),
        SqlParam::Bytes(v) => Box::new(v),
    }
}
