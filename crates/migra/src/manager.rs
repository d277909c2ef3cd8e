//! The migration execution engine: version planning, transactional
//! execution, and log assembly (spec §4.4).

use crate::cancel::CancellationToken;
use crate::driver::{DriverFactory, Provider};
use crate::error::MigrationResult;
use crate::log::CaptureLogger;
use crate::source::{Script, ScriptKind, Sources, VersionBundle};
use crate::step;
use std::future::Future;
use tracing::Span;

#[cfg(windows)]
const EOL: &str = "\r\n";
#[cfg(not(windows))]
const EOL: &str = "\n";

const DEFAULT_VERSION_TABLE_NAME: &str = "__migration";

/// The seven dialect-specific hooks a concrete `Manager` subtype supplies
/// (spec §4.4 "Dialect hooks").
pub trait DialectHooks: Send + Sync {
    type Provider: Provider;

    /// `MAX(version)` across the version table, or `None` if the table is
    /// absent or empty.
    fn get_current_version(
        &self,
        cancel: &CancellationToken,
        provider: &Self::Provider,
    ) -> impl Future<Output = MigrationResult<Option<String>>> + Send;

    fn is_version_table_exist(
        &self,
        cancel: &CancellationToken,
        provider: &Self::Provider,
    ) -> impl Future<Output = MigrationResult<bool>> + Send;

    fn create_version_table(
        &self,
        cancel: &CancellationToken,
        provider: &Self::Provider,
    ) -> impl Future<Output = MigrationResult<()>> + Send;

    /// Invoked only when [`DialectHooks::is_version_table_exist`] returned
    /// `true` (design note §9: the spec leaves the alternative ambiguous;
    /// this is the reading formalized here).
    fn verify_version_table_structure(
        &self,
        cancel: &CancellationToken,
        provider: &Self::Provider,
    ) -> impl Future<Output = MigrationResult<()>> + Send;

    fn is_version_log_exist(
        &self,
        cancel: &CancellationToken,
        provider: &Self::Provider,
        version: &str,
    ) -> impl Future<Output = MigrationResult<bool>> + Send;

    fn insert_version_log(
        &self,
        cancel: &CancellationToken,
        provider: &Self::Provider,
        version: &str,
        log_text: &str,
    ) -> impl Future<Output = MigrationResult<()>> + Send;

    fn remove_version_log(
        &self,
        cancel: &CancellationToken,
        provider: &Self::Provider,
        version: &str,
    ) -> impl Future<Output = MigrationResult<()>> + Send;
}

/// What `Manager::install` actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    installed: Vec<String>,
}

impl InstallReport {
    /// Versions installed, in the order they were committed.
    pub fn installed_versions(&self) -> &[String] {
        &self.installed
    }
}

/// What `Manager::rollback` actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackReport {
    rolled_back: Vec<String>,
    skipped: Vec<String>,
}

impl RollbackReport {
    /// Versions rolled back, in the order they were committed.
    pub fn rolled_back_versions(&self) -> &[String] {
        &self.rolled_back
    }

    /// Versions skipped because no version log row was present (spec §8
    /// property 8: a warning, not an error).
    pub fn skipped_versions(&self) -> &[String] {
        &self.skipped
    }
}

/// The migration execution engine. Generic over a [`DriverFactory`] and the
/// [`DialectHooks`] a concrete dialect supplies.
pub struct Manager<D, H>
where
    D: DriverFactory,
    H: DialectHooks<Provider = D::Provider>,
{
    sources: Sources,
    driver: D,
    hooks: H,
    root_span: Span,
    version_table_name: String,
}

impl<D, H> Manager<D, H>
where
    D: DriverFactory,
    H: DialectHooks<Provider = D::Provider>,
{
    /// Construction options per spec §4.4:
    /// `{sources, driverFactory, log, versionTableName (default "__migration")}`.
    pub fn new(sources: Sources, driver: D, hooks: H) -> Self {
        Self {
            sources,
            driver,
            hooks,
            root_span: tracing::info_span!("migra_manager"),
            version_table_name: DEFAULT_VERSION_TABLE_NAME.to_string(),
        }
    }

    /// Override the default `__migration` version table name.
    pub fn with_version_table_name(mut self, name: impl Into<String>) -> Self {
        self.version_table_name = name.into();
        self
    }

    /// Nest this manager's per-version capture loggers under an existing
    /// tracing span instead of a fresh `migra_manager` root.
    pub fn with_root_span(mut self, span: Span) -> Self {
        self.root_span = span;
        self
    }

    pub fn sources(&self) -> &Sources {
        &self.sources
    }

    pub fn version_table_name(&self) -> &str {
        &self.version_table_name
    }

    /// Read the currently recorded schema version, or `None` if no version
    /// table exists or it is empty.
    pub async fn current_version(
        &self,
        cancel: &CancellationToken,
    ) -> MigrationResult<Option<String>> {
        cancel.check()?;
        let provider = self.driver.create(cancel).await?;
        self.hooks.get_current_version(cancel, &provider).await
    }

    /// The versions `install` would apply, without executing anything
    /// (spec §8 properties 5 and 7).
    pub fn plan_install(&self, current: Option<&str>, target: Option<&str>) -> Vec<String> {
        let mut versions: Vec<String> = self
            .sources
            .version_names()
            .into_iter()
            .map(String::from)
            .collect();
        versions.sort();
        if let Some(current) = current {
            versions.retain(|v| v.as_str() > current);
        }
        if let Some(target) = target {
            versions.retain(|v| v.as_str() <= target);
        }
        versions
    }

    /// The versions `rollback` would apply, without executing anything
    /// (spec §8 properties 6 and 7).
    pub fn plan_rollback(&self, current: Option<&str>, target: Option<&str>) -> Vec<String> {
        let mut versions: Vec<String> = self
            .sources
            .version_names()
            .into_iter()
            .map(String::from)
            .collect();
        versions.sort();
        versions.reverse();
        if let Some(current) = current {
            versions.retain(|v| v.as_str() <= current);
        }
        if let Some(target) = target {
            versions.retain(|v| v.as_str() > target);
        }
        versions
    }

    /// Bring the database forward to `target_version` (or the newest known
    /// version if `None`), one transaction per version, in ascending order.
    pub async fn install(
        &self,
        cancel: &CancellationToken,
        target_version: Option<&str>,
    ) -> MigrationResult<InstallReport> {
        cancel.check()?;
        let current = self.current_version(cancel).await?;
        let planned = self.plan_install(current.as_deref(), target_version);

        self.driver
            .using_provider(cancel, |provider| async move {
                cancel.check()?;
                if !self.hooks.is_version_table_exist(cancel, &provider).await? {
                    self.hooks.create_version_table(cancel, &provider).await?;
                } else {
                    self.hooks
                        .verify_version_table_structure(cancel, &provider)
                        .await?;
                }
                Ok(())
            })
            .await?;

        let mut installed = Vec::with_capacity(planned.len());
        for version in &planned {
            cancel.check()?;
            let bundle = self.sources.version_bundle(version)?;
            let logger = CaptureLogger::new(&self.root_span, version);

            self.driver
                .using_provider_with_transaction(cancel, |provider| async move {
                    run_install_scripts(cancel, &provider, bundle, &logger).await?;
                    let log_text = logger.flush();
                    self.hooks
                        .insert_version_log(cancel, &provider, version, &log_text)
                        .await
                })
                .await?;

            installed.push(version.clone());
        }

        Ok(InstallReport { installed })
    }

    /// Roll the database back to `target_version` (or all the way if
    /// `None`), one transaction per version, in descending order.
    pub async fn rollback(
        &self,
        cancel: &CancellationToken,
        target_version: Option<&str>,
    ) -> MigrationResult<RollbackReport> {
        cancel.check()?;
        let current = self.current_version(cancel).await?;
        let planned = self.plan_rollback(current.as_deref(), target_version);

        let mut rolled_back = Vec::new();
        let mut skipped = Vec::new();
        for version in &planned {
            cancel.check()?;
            let logger = CaptureLogger::new(&self.root_span, version);

            let applied = self
                .driver
                .using_provider_with_transaction(cancel, |provider| async move {
                    if !self
                        .hooks
                        .is_version_log_exist(cancel, &provider, version)
                        .await?
                    {
                        logger.warn(format!(
                            "Skip rollback for version '{version}' due this does not present inside database."
                        ));
                        return Ok(false);
                    }

                    let bundle = self.sources.version_bundle(version)?;
                    run_rollback_scripts(cancel, &provider, bundle, &logger).await?;
                    self.hooks
                        .remove_version_log(cancel, &provider, version)
                        .await?;
                    Ok(true)
                })
                .await?;

            if applied {
                rolled_back.push(version.clone());
            } else {
                skipped.push(version.clone());
            }
        }

        Ok(RollbackReport {
            rolled_back,
            skipped,
        })
    }
}

async fn run_install_scripts<P: Provider>(
    cancel: &CancellationToken,
    provider: &P,
    bundle: &VersionBundle,
    logger: &CaptureLogger,
) -> MigrationResult<()> {
    for name in bundle.install_script_names() {
        cancel.check()?;
        let script = bundle
            .get_install_script(name)
            .expect("name enumerated from install_script_names");
        run_script(cancel, provider, bundle.version_name(), script, logger).await?;
    }
    Ok(())
}

async fn run_rollback_scripts<P: Provider>(
    cancel: &CancellationToken,
    provider: &P,
    bundle: &VersionBundle,
    logger: &CaptureLogger,
) -> MigrationResult<()> {
    for name in bundle.rollback_script_names().into_iter().rev() {
        cancel.check()?;
        let script = bundle
            .get_rollback_script(name)
            .expect("name enumerated from rollback_script_names");
        run_script(cancel, provider, bundle.version_name(), script, logger).await?;
    }
    Ok(())
}

async fn run_script<P: Provider>(
    cancel: &CancellationToken,
    provider: &P,
    version_name: &str,
    script: &Script,
    logger: &CaptureLogger,
) -> MigrationResult<()> {
    match script.kind() {
        ScriptKind::Sql => {
            logger.info(format!("Execute SQL script: {}", script.name()));
            logger.trace(format!("{EOL}{}", script.content()));
            provider.execute_sql(cancel, script.content(), &[]).await?;
            Ok(())
        }
        ScriptKind::Javascript => match step::javascript_step() {
            Some(handler) => {
                logger.info(format!("Execute script step: {}", script.name()));
                logger.trace(format!("{EOL}{}", script.content()));
                handler.run(cancel, provider, logger, script).await
            }
            None => {
                logger.warn(format!(
                    "Skip script '{version_name}:{}' due unknown kind of script",
                    script.name()
                ));
                Ok(())
            }
        },
        ScriptKind::Unknown => {
            logger.warn(format!(
                "Skip script '{version_name}:{}' due unknown kind of script",
                script.name()
            ));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;

    fn sources_with(versions: &[(&str, &[&str], &[&str])]) -> Sources {
        crate::source::sources_for_test(versions)
    }

    #[tokio::test]
    async fn s4_install_plan_filters_by_current_and_target() {
        let backend = MockBackend::new();
        let sources = sources_with(&[
            ("v0001", &["01-init.sql"], &[]),
            ("v0002", &["01-add.sql"], &["01-drop.sql"]),
            ("vXXXX", &["1-x.sql"], &[]),
        ]);
        let manager = Manager::new(sources, backend.driver(), backend.hooks());
        let cancel = CancellationToken::new();
        let report = manager
            .install(&cancel, Some("v0002"))
            .await
            .unwrap();
        // nothing installed yet, so current_version is None: everything up to v0002 installs
        assert_eq!(report.installed_versions(), &["v0001", "v0002"]);
    }

    #[tokio::test]
    async fn s4_install_plan_with_current_version_set() {
        let backend = MockBackend::new();
        let sources = sources_with(&[
            ("v0001", &["01-init.sql"], &[]),
            ("v0002", &["01-add.sql"], &["01-drop.sql"]),
            ("vXXXX", &["1-x.sql"], &[]),
        ]);
        let manager = Manager::new(sources, backend.driver(), backend.hooks());
        let cancel = CancellationToken::new();
        manager.install(&cancel, Some("v0001")).await.unwrap();

        let planned = manager.plan_install(Some("v0001"), Some("v0002"));
        assert_eq!(planned, vec!["v0002".to_string()]);
    }

    #[tokio::test]
    async fn s5_rollback_plan_filters_descending() {
        let backend = MockBackend::new();
        let sources = sources_with(&[
            ("v0001", &["01-init.sql"], &["01-drop.sql"]),
            ("v0002", &["01-add.sql"], &["01-drop.sql"]),
            ("vXXXX", &["1-x.sql"], &["1-drop.sql"]),
        ]);
        let manager = Manager::new(sources, backend.driver(), backend.hooks());
        let cancel = CancellationToken::new();
        manager.install(&cancel, None).await.unwrap();

        let planned = manager.plan_rollback(Some("vXXXX"), Some("v0001"));
        assert_eq!(planned, vec!["vXXXX".to_string(), "v0002".to_string()]);
    }

    #[tokio::test]
    async fn install_then_rollback_executes_scripts_in_order() {
        let backend = MockBackend::new();
        let sources = sources_with(&[
            ("v0001", &["01-init.sql", "50-seed.sql"], &["50-seed.sql", "01-init.sql"]),
            ("v0002", &["01-add.sql"], &["01-add.sql"]),
        ]);
        let manager = Manager::new(sources, backend.driver(), backend.hooks());
        let cancel = CancellationToken::new();

        manager.install(&cancel, None).await.unwrap();
        assert_eq!(
            backend.executed_sql(),
            vec![
                "content:v0001:01-init.sql",
                "content:v0001:50-seed.sql",
                "content:v0002:01-add.sql",
            ]
        );
        assert_eq!(
            manager.current_version(&cancel).await.unwrap().as_deref(),
            Some("v0002")
        );

        backend.clear_executed_sql();
        manager.rollback(&cancel, None).await.unwrap();
        assert_eq!(
            backend.executed_sql(),
            vec![
                "content:v0002:01-add.sql",
                "content:v0001:50-seed.sql",
                "content:v0001:01-init.sql",
            ]
        );
        assert_eq!(manager.current_version(&cancel).await.unwrap(), None);
    }

    #[tokio::test]
    async fn s8_rollback_skips_missing_log_with_warning() {
        let backend = MockBackend::new();
        let sources = sources_with(&[("v0001", &["01-init.sql"], &["01-drop.sql"])]);
        let manager = Manager::new(sources, backend.driver(), backend.hooks());
        let cancel = CancellationToken::new();

        // Rolling back without ever installing: no log row is present.
        let report = manager.rollback(&cancel, None).await.unwrap();
        assert!(report.rolled_back_versions().is_empty());
        assert_eq!(report.skipped_versions(), &["v0001"]);
    }

    #[tokio::test]
    async fn s9_cancellation_before_any_statement_leaves_db_unchanged() {
        let backend = MockBackend::new();
        let sources = sources_with(&[("v0001", &["01-init.sql"], &[])]);
        let manager = Manager::new(sources, backend.driver(), backend.hooks());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = manager.install(&cancel, None).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(backend.executed_sql().is_empty());
        assert!(manager.current_version(&CancellationToken::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_kind_script_warns_and_is_skipped() {
        let backend = MockBackend::new();
        let sources = sources_with(&[("v0001", &["01-init.sql", "99-notes.txt"], &[])]);
        let manager = Manager::new(sources, backend.driver(), backend.hooks());
        let cancel = CancellationToken::new();

        manager.install(&cancel, None).await.unwrap();
        assert_eq!(backend.executed_sql(), vec!["content:v0001:01-init.sql"]);
        let log = backend.log_text_for("v0001").unwrap();
        assert!(log.contains("unknown kind of script"));
    }
}
