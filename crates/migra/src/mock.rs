//! In-memory `DriverFactory`/`DialectHooks` test double.
//!
//! The engine's own test suite exercises version planning, ordering, and
//! cancellation behavior against this mock rather than a live database —
//! the same spirit as the teacher's migration tests operating purely against
//! temp directories (`crates/pgorm/src/migrate.rs`'s `#[cfg(test)]` module),
//! generalized here because the engine also needs a driver double.

use crate::cancel::CancellationToken;
use crate::driver::{DriverFactory, Provider, SqlParam};
use crate::error::MigrationResult;
use crate::manager::DialectHooks;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct State {
    table_exists: bool,
    logs: BTreeMap<String, String>,
    executed: Vec<String>,
}

/// Shared backing state for a [`MockDriverFactory`] + [`MockHooks`] pair.
pub struct MockBackend {
    state: Arc<Mutex<State>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    pub fn driver(&self) -> MockDriverFactory {
        MockDriverFactory {
            state: self.state.clone(),
        }
    }

    pub fn hooks(&self) -> MockHooks {
        MockHooks {
            state: self.state.clone(),
        }
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.state.lock().expect("mock state poisoned").executed.clone()
    }

    pub fn clear_executed_sql(&self) {
        self.state.lock().expect("mock state poisoned").executed.clear();
    }

    pub fn log_text_for(&self, version: &str) -> Option<String> {
        self.state
            .lock()
            .expect("mock state poisoned")
            .logs
            .get(version)
            .cloned()
    }
}

/// A provider that records every submitted SQL text instead of running it.
#[derive(Clone)]
pub struct MockProvider {
    state: Arc<Mutex<State>>,
}

impl Provider for MockProvider {
    async fn execute_sql(
        &self,
        cancel: &CancellationToken,
        sql: &str,
        _params: &[SqlParam],
    ) -> MigrationResult<u64> {
        cancel.check()?;
        self.state
            .lock()
            .expect("mock state poisoned")
            .executed
            .push(sql.to_string());
        Ok(1)
    }
}

/// A [`DriverFactory`] whose scoped acquisitions never fail to release —
/// there is no real connection to leak.
pub struct MockDriverFactory {
    state: Arc<Mutex<State>>,
}

impl DriverFactory for MockDriverFactory {
    type Provider = MockProvider;

    async fn create(&self, cancel: &CancellationToken) -> MigrationResult<Self::Provider> {
        cancel.check()?;
        Ok(MockProvider {
            state: self.state.clone(),
        })
    }

    async fn using_provider<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        worker: F,
    ) -> MigrationResult<T>
    where
        F: FnOnce(Self::Provider) -> Fut + Send,
        Fut: Future<Output = MigrationResult<T>> + Send,
        T: Send,
    {
        cancel.check()?;
        worker(self.create(cancel).await?).await
    }

    async fn using_provider_with_transaction<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        worker: F,
    ) -> MigrationResult<T>
    where
        F: FnOnce(Self::Provider) -> Fut + Send,
        Fut: Future<Output = MigrationResult<T>> + Send,
        T: Send,
    {
        // The mock has no real transaction to begin/commit/rollback: scripts
        // mutate shared state directly, and these tests only assert on
        // commit-path outcomes, never on abort-and-restore semantics.
        cancel.check()?;
        worker(self.create(cancel).await?).await
    }
}

/// A [`DialectHooks`] impl backed by the same in-memory state.
pub struct MockHooks {
    state: Arc<Mutex<State>>,
}

impl DialectHooks for MockHooks {
    type Provider = MockProvider;

    async fn get_current_version(
        &self,
        cancel: &CancellationToken,
        _provider: &Self::Provider,
    ) -> MigrationResult<Option<String>> {
        cancel.check()?;
        Ok(self
            .state
            .lock()
            .expect("mock state poisoned")
            .logs
            .keys()
            .next_back()
            .cloned())
    }

    async fn is_version_table_exist(
        &self,
        cancel: &CancellationToken,
        _provider: &Self::Provider,
    ) -> MigrationResult<bool> {
        cancel.check()?;
        Ok(self.state.lock().expect("mock state poisoned").table_exists)
    }

    async fn create_version_table(
        &self,
        cancel: &CancellationToken,
        _provider: &Self::Provider,
    ) -> MigrationResult<()> {
        cancel.check()?;
        self.state.lock().expect("mock state poisoned").table_exists = true;
        Ok(())
    }

    async fn verify_version_table_structure(
        &self,
        cancel: &CancellationToken,
        _provider: &Self::Provider,
    ) -> MigrationResult<()> {
        cancel.check()
    }

    async fn is_version_log_exist(
        &self,
        cancel: &CancellationToken,
        _provider: &Self::Provider,
        version: &str,
    ) -> MigrationResult<bool> {
        cancel.check()?;
        Ok(self
            .state
            .lock()
            .expect("mock state poisoned")
            .logs
            .contains_key(version))
    }

    async fn insert_version_log(
        &self,
        cancel: &CancellationToken,
        _provider: &Self::Provider,
        version: &str,
        log_text: &str,
    ) -> MigrationResult<()> {
        cancel.check()?;
        self.state
            .lock()
            .expect("mock state poisoned")
            .logs
            .insert(version.to_string(), log_text.to_string());
        Ok(())
    }

    async fn remove_version_log(
        &self,
        cancel: &CancellationToken,
        _provider: &Self::Provider,
        version: &str,
    ) -> MigrationResult<()> {
        cancel.check()?;
        self.state.lock().expect("mock state poisoned").logs.remove(version);
        Ok(())
    }
}
