//! `DialectHooks` for PostgreSQL: version-table lifecycle and version-log
//! bookkeeping (spec §4.4 "Dialect hooks").

use crate::error::driver_err;
use crate::provider::PgProvider;
use migra::cancel::CancellationToken;
use migra::error::{MigrationError, MigrationResult};
use migra::manager::DialectHooks;

const DEFAULT_TABLE_NAME: &str = "__migration";

/// PostgreSQL implementation of the seven dialect hooks `Manager` requires.
///
/// The table name is owned here (not by `Manager`, which only carries it
/// for display/reporting) — construct this with the same name passed to
/// `Manager::with_version_table_name` when overriding the default.
pub struct PostgresHooks {
    table_name: String,
}

impl Default for PostgresHooks {
    fn default() -> Self {
        Self::new()
    }
}

impl PostgresHooks {
    /// Hooks using the default `__migration` table name.
    pub fn new() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
        }
    }

    /// Hooks using a custom version table name.
    pub fn with_table_name(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
        }
    }

    fn table(&self) -> &str {
        &self.table_name
    }
}

/// `42P01` is Postgres's SQLSTATE for `undefined_table`.
const UNDEFINED_TABLE: &str = "42P01";

impl DialectHooks for PostgresHooks {
    type Provider = PgProvider;

    async fn get_current_version(
        &self,
        cancel: &CancellationToken,
        provider: &Self::Provider,
    ) -> MigrationResult<Option<String>> {
        cancel.check()?;
        let sql = format!(
            "SELECT version FROM {} ORDER BY version DESC LIMIT 1",
            self.table()
        );
        match provider.client.query_opt(&sql, &[]).await {
            Ok(row) => Ok(row.map(|r| r.get::<_, String>("version"))),
            Err(e) if is_undefined_table(&e) => Ok(None),
            Err(e) => Err(driver_err(crate::error::PgDriverError::from_db_error(e))),
        }
    }

    async fn is_version_table_exist(
        &self,
        cancel: &CancellationToken,
        provider: &Self::Provider,
    ) -> MigrationResult<bool> {
        cancel.check()?;
        let row = provider
            .client
            .query_one("SELECT to_regclass($1) IS NOT NULL AS exists", &[&self.table()])
            .await
            .map_err(|e| driver_err(crate::error::PgDriverError::from_db_error(e)))?;
        Ok(row.get::<_, bool>("exists"))
    }

    async fn create_version_table(
        &self,
        cancel: &CancellationToken,
        provider: &Self::Provider,
    ) -> MigrationResult<()> {
        cancel.check()?;
        let sql = format!(
            "CREATE TABLE {} (\
                version text PRIMARY KEY, \
                log text NOT NULL, \
                applied_at timestamptz NOT NULL DEFAULT now()\
            )",
            self.table()
        );
        provider
            .client
            .batch_execute(&sql)
            .await
            .map_err(|e| driver_err(crate::error::PgDriverError::from_db_error(e)))
    }

    async fn verify_version_table_structure(
        &self,
        cancel: &CancellationToken,
        provider: &Self::Provider,
    ) -> MigrationResult<()> {
        cancel.check()?;
        let rows = provider
            .client
            .query(
                "SELECT column_name FROM information_schema.columns WHERE table_name = $1",
                &[&self.table()],
            )
            .await
            .map_err(|e| driver_err(crate::error::PgDriverError::from_db_error(e)))?;
        let columns: Vec<String> = rows.iter().map(|r| r.get("column_name")).collect();
        for required in ["version", "log"] {
            if !columns.iter().any(|c| c == required) {
                return Err(MigrationError::InvalidOperation(format!(
                    "version table '{}' is missing required column '{required}'",
                    self.table()
                )));
            }
        }
        Ok(())
    }

    async fn is_version_log_exist(
        &self,
        cancel: &CancellationToken,
        provider: &Self::Provider,
        version: &str,
    ) -> MigrationResult<bool> {
        cancel.check()?;
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE version = $1) AS exists",
            self.table()
        );
        let row = provider
            .client
            .query_one(&sql, &[&version])
            .await
            .map_err(|e| driver_err(crate::error::PgDriverError::from_db_error(e)))?;
        Ok(row.get::<_, bool>("exists"))
    }

    async fn insert_version_log(
        &self,
        cancel: &CancellationToken,
        provider: &Self::Provider,
        version: &str,
        log_text: &str,
    ) -> MigrationResult<()> {
        cancel.check()?;
        let sql = format!(
            "INSERT INTO {} (version, log, applied_at) VALUES ($1, $2, now())",
            self.table()
        );
        provider
            .client
            .execute(&sql, &[&version, &log_text])
            .await
            .map_err(|e| driver_err(crate::error::PgDriverError::from_db_error(e)))?;
        Ok(())
    }

    async fn remove_version_log(
        &self,
        cancel: &CancellationToken,
        provider: &Self::Provider,
        version: &str,
    ) -> MigrationResult<()> {
        cancel.check()?;
        let sql = format!("DELETE FROM {} WHERE version = $1", self.table());
        provider
            .client
            .execute(&sql, &[&version])
            .await
            .map_err(|e| driver_err(crate::error::PgDriverError::from_db_error(e)))?;
        Ok(())
    }
}

fn is_undefined_table(err: &tokio_postgres::Error) -> bool {
    err.as_db_error()
        .map(|db_err| db_err.code().code() == UNDEFINED_TABLE)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_name_is_dunder_migration() {
        let hooks = PostgresHooks::new();
        assert_eq!(hooks.table(), "__migration");
    }

    #[test]
    fn custom_table_name_is_honored() {
        let hooks = PostgresHooks::with_table_name("schema_versions");
        assert_eq!(hooks.table(), "schema_versions");
    }
}
