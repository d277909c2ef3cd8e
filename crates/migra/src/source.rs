//! The migration source model: `Script`, `VersionBundle`, `Sources`.
//!
//! Everything in this module is immutable after construction. `Sources::map`
//! and `VersionBundle`'s internal transform both return new instances rather
//! than mutating in place.

use crate::cancel::CancellationToken;
use crate::error::{MigrationError, MigrationResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use url::Url;

/// Classification of a script, derived from its filename extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    Sql,
    Javascript,
    Unknown,
}

impl ScriptKind {
    /// Derive a kind from a file's extension. Matching is case-sensitive:
    /// only the literal extensions `.sql` and `.js` are recognized.
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("sql") => ScriptKind::Sql,
            Some("js") => ScriptKind::Javascript,
            _ => ScriptKind::Unknown,
        }
    }
}

/// Which subdirectory (and execution order) a script belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Install,
    Rollback,
}

impl Direction {
    fn dir_name(self) -> &'static str {
        match self {
            Direction::Install => "install",
            Direction::Rollback => "rollback",
        }
    }
}

/// One migration file: name, kind, origin path, and textual content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    name: String,
    kind: ScriptKind,
    file: PathBuf,
    content: String,
}

impl Script {
    /// Filename relative to its direction directory (e.g. `01-init.sql`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind derived from the filename extension at load time.
    pub fn kind(&self) -> ScriptKind {
        self.kind
    }

    /// Absolute origin path at load time. Preserved unchanged by `map`.
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Textual (UTF-8) body.
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Context passed to the content mapper invoked once per script by
/// [`Sources::map`].
#[derive(Debug, Clone, Copy)]
pub struct MapContext<'a> {
    pub version_name: &'a str,
    pub direction: Direction,
    pub item_name: &'a str,
}

/// Immutable container for one version's install set and rollback set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionBundle {
    version_name: String,
    install_scripts: BTreeMap<String, Script>,
    rollback_scripts: BTreeMap<String, Script>,
}

impl VersionBundle {
    /// The directory name this bundle was loaded from (e.g. `v0001`).
    pub fn version_name(&self) -> &str {
        &self.version_name
    }

    /// Install script names, ASCII-ascending.
    pub fn install_script_names(&self) -> Vec<&str> {
        self.install_scripts.keys().map(String::as_str).collect()
    }

    /// Rollback script names, ASCII-ascending.
    pub fn rollback_script_names(&self) -> Vec<&str> {
        self.rollback_scripts.keys().map(String::as_str).collect()
    }

    /// Look up an install script by name.
    pub fn get_install_script(&self, name: &str) -> Option<&Script> {
        self.install_scripts.get(name)
    }

    /// Look up a rollback script by name.
    pub fn get_rollback_script(&self, name: &str) -> Option<&Script> {
        self.rollback_scripts.get(name)
    }

    fn mapped<F>(&self, f: &mut F) -> VersionBundle
    where
        F: FnMut(&str, MapContext<'_>) -> String,
    {
        VersionBundle {
            version_name: self.version_name.clone(),
            install_scripts: map_direction(
                &self.version_name,
                Direction::Install,
                &self.install_scripts,
                f,
            ),
            rollback_scripts: map_direction(
                &self.version_name,
                Direction::Rollback,
                &self.rollback_scripts,
                f,
            ),
        }
    }
}

fn map_direction<F>(
    version_name: &str,
    direction: Direction,
    scripts: &BTreeMap<String, Script>,
    f: &mut F,
) -> BTreeMap<String, Script>
where
    F: FnMut(&str, MapContext<'_>) -> String,
{
    scripts
        .iter()
        .map(|(name, script)| {
            let ctx = MapContext {
                version_name,
                direction,
                item_name: name,
            };
            let content = f(&script.content, ctx);
            (
                name.clone(),
                Script {
                    name: script.name.clone(),
                    kind: script.kind,
                    file: script.file.clone(),
                    content,
                },
            )
        })
        .collect()
}

/// Immutable tree: ordered set of `VersionBundle`s.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sources {
    versions: BTreeMap<String, VersionBundle>,
}

impl Sources {
    /// Version names, ASCII-ascending.
    pub fn version_names(&self) -> Vec<&str> {
        self.versions.keys().map(String::as_str).collect()
    }

    /// Look up a version bundle by name.
    pub fn get_version_bundle(&self, version_name: &str) -> Option<&VersionBundle> {
        self.versions.get(version_name)
    }

    /// Look up a version bundle, failing with `InvalidArgument` if absent.
    pub fn version_bundle(&self, version_name: &str) -> MigrationResult<&VersionBundle> {
        self.versions.get(version_name).ok_or_else(|| {
            MigrationError::invalid_argument(
                "versionName",
                format!("unknown version '{version_name}'"),
            )
        })
    }

    /// Load sources from a URI. Dispatches on scheme: `file` is implemented;
    /// `http+tar+gz`/`https+tar+gz` fail with `NotImplemented`; anything else
    /// fails with `NotSupportedUrlSchema`.
    pub async fn load(cancel: &CancellationToken, uri: &str) -> MigrationResult<Self> {
        let parsed = Url::parse(uri)
            .map_err(|e| MigrationError::invalid_argument("uri", e.to_string()))?;
        match parsed.scheme() {
            "file" => {
                let path = parsed.to_file_path().map_err(|_| {
                    MigrationError::wrong_data(format!("invalid file uri '{uri}'"))
                })?;
                Self::load_from_filesystem(cancel, &path).await
            }
            "http+tar+gz" | "https+tar+gz" => {
                Err(MigrationError::NotImplemented(parsed.scheme().to_string()))
            }
            other => Err(MigrationError::NotSupportedUrlSchema(other.to_string())),
        }
    }

    /// Load sources from a directory tree of the form
    /// `root/<version>/{install,rollback}/<script>`.
    pub async fn load_from_filesystem(
        cancel: &CancellationToken,
        root_dir: impl AsRef<Path>,
    ) -> MigrationResult<Self> {
        let root_dir = root_dir.as_ref();
        cancel.check()?;

        if !path_exists(root_dir).await {
            return Err(MigrationError::wrong_data(format!(
                "Migration directory '{}' is not exist",
                root_dir.display()
            )));
        }

        let mut versions = BTreeMap::new();
        let mut entries = fs::read_dir(root_dir).await.map_err(load_err)?;
        while let Some(entry) = entries.next_entry().await.map_err(load_err)? {
            cancel.check()?;
            let file_type = entry.file_type().await.map_err(load_err)?;
            if !file_type.is_dir() {
                continue;
            }
            let version_name = entry.file_name().to_string_lossy().into_owned();
            let version_dir = entry.path();
            let install_scripts =
                load_direction(cancel, &version_dir.join("install")).await?;
            let rollback_scripts =
                load_direction(cancel, &version_dir.join("rollback")).await?;
            versions.insert(
                version_name.clone(),
                VersionBundle {
                    version_name,
                    install_scripts,
                    rollback_scripts,
                },
            );
        }

        Ok(Sources { versions })
    }

    /// Return a new `Sources` where every script's content has been replaced
    /// by `f(old_content, ctx)`. `name`, `kind`, and `file` are preserved.
    /// `f` is invoked exactly once per script, in ASCII-ascending order
    /// within each version (install scripts, then rollback scripts).
    pub fn map<F>(&self, mut f: F) -> Sources
    where
        F: FnMut(&str, MapContext<'_>) -> String,
    {
        let versions = self
            .versions
            .iter()
            .map(|(name, bundle)| (name.clone(), bundle.mapped(&mut f)))
            .collect();
        Sources { versions }
    }

    /// Serialize this tree back to a directory. `dest_dir` must already
    /// exist; per-version and `install`/`rollback` subdirectories are
    /// created as needed.
    pub async fn save_to_filesystem(
        &self,
        cancel: &CancellationToken,
        dest_dir: impl AsRef<Path>,
    ) -> MigrationResult<()> {
        let dest_dir = dest_dir.as_ref();
        cancel.check()?;

        if !path_exists(dest_dir).await {
            return Err(MigrationError::invalid_argument(
                "destinationDirectory",
                format!("'{}' does not exist", dest_dir.display()),
            ));
        }

        for (version_name, bundle) in &self.versions {
            cancel.check()?;
            let version_dir = dest_dir.join(version_name);
            fs::create_dir_all(&version_dir).await.map_err(save_err)?;
            save_direction(
                cancel,
                &version_dir.join(Direction::Install.dir_name()),
                &bundle.install_scripts,
            )
            .await?;
            save_direction(
                cancel,
                &version_dir.join(Direction::Rollback.dir_name()),
                &bundle.rollback_scripts,
            )
            .await?;
        }

        Ok(())
    }
}

async fn path_exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

async fn load_direction(
    cancel: &CancellationToken,
    dir: &Path,
) -> MigrationResult<BTreeMap<String, Script>> {
    cancel.check()?;
    if !path_exists(dir).await {
        return Ok(BTreeMap::new());
    }

    let mut scripts = BTreeMap::new();
    let mut entries = fs::read_dir(dir).await.map_err(load_err)?;
    while let Some(entry) = entries.next_entry().await.map_err(load_err)? {
        cancel.check()?;
        let file_type = entry.file_type().await.map_err(load_err)?;
        if !file_type.is_file() {
            continue;
        }

        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let content = fs::read_to_string(&path).await.map_err(load_err)?;
        let kind = ScriptKind::from_path(&path);
        let file = fs::canonicalize(&path).await.unwrap_or_else(|_| path.clone());

        scripts.insert(
            name.clone(),
            Script {
                name,
                kind,
                file,
                content,
            },
        );
    }

    Ok(scripts)
}

async fn save_direction(
    cancel: &CancellationToken,
    dir: &Path,
    scripts: &BTreeMap<String, Script>,
) -> MigrationResult<()> {
    cancel.check()?;
    fs::create_dir_all(dir).await.map_err(save_err)?;
    for (name, script) in scripts {
        cancel.check()?;
        fs::write(dir.join(name), &script.content)
            .await
            .map_err(save_err)?;
    }
    Ok(())
}

fn load_err(e: std::io::Error) -> MigrationError {
    MigrationError::wrong_data(e.to_string())
}

fn save_err(e: std::io::Error) -> MigrationError {
    MigrationError::Migration(e.to_string())
}

/// Build a [`Sources`] tree in memory for tests elsewhere in the crate,
/// without touching the filesystem. Every script's content is the literal
/// string `content:<version>:<name>`, so a test asserting on submitted SQL
/// text can assert on that format directly instead of reading files back.
#[cfg(test)]
pub(crate) fn sources_for_test(versions: &[(&str, &[&str], &[&str])]) -> Sources {
    let mut bundles = BTreeMap::new();
    for (version_name, install_names, rollback_names) in versions {
        let install_scripts = install_names
            .iter()
            .map(|name| ((*name).to_string(), script_for_test(version_name, name)))
            .collect();
        let rollback_scripts = rollback_names
            .iter()
            .map(|name| ((*name).to_string(), script_for_test(version_name, name)))
            .collect();
        bundles.insert(
            version_name.to_string(),
            VersionBundle {
                version_name: version_name.to_string(),
                install_scripts,
                rollback_scripts,
            },
        );
    }
    Sources { versions: bundles }
}

#[cfg(test)]
fn script_for_test(version_name: &str, name: &str) -> Script {
    Script {
        name: name.to_string(),
        kind: ScriptKind::from_path(Path::new(name)),
        file: PathBuf::from(format!("/test/{version_name}/{name}")),
        content: format!("content:{version_name}:{name}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    async fn write_tree(root: &Path) {
        for (version, install, rollback) in [
            ("v0001", vec![("01-init.sql", "CREATE TABLE t(id int);")], vec![]),
            (
                "v0002",
                vec![("01-add-col.sql", "ALTER TABLE t ADD COLUMN x int;")],
                vec![("01-drop-col.sql", "ALTER TABLE t DROP COLUMN x;")],
            ),
            (
                "vXXXX",
                vec![("1-create-something.sql", "CREATE TABLE s(id int);")],
                vec![
                    ("2-drop-something.js", "// 2-drop-something.js rollback \n"),
                    ("99-notes.txt", "not a real script"),
                ],
            ),
        ] {
            let vdir = root.join(version);
            for (dirname, files) in [("install", &install), ("rollback", &rollback)] {
                let dir = vdir.join(dirname);
                tokio::fs::create_dir_all(&dir).await.unwrap();
                for (name, content) in files {
                    tokio::fs::write(dir.join(name), content).await.unwrap();
                }
            }
        }
    }

    #[tokio::test]
    async fn s1_load_lists_versions_ascending() {
        let dir = tempdir();
        write_tree(&dir).await;
        let cancel = CancellationToken::new();
        let sources = Sources::load_from_filesystem(&cancel, &dir).await.unwrap();
        assert_eq!(sources.version_names(), vec!["v0001", "v0002", "vXXXX"]);
        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn s2_map_preserves_names() {
        let dir = tempdir();
        write_tree(&dir).await;
        let cancel = CancellationToken::new();
        let sources = Sources::load_from_filesystem(&cancel, &dir).await.unwrap();

        let transformed = sources.map(|_content, ctx| format!("{}:{}", ctx.version_name, ctx.item_name));
        assert_eq!(transformed.version_names(), vec!["v0001", "v0002", "vXXXX"]);
        for name in transformed.version_names() {
            let original = sources.get_version_bundle(name).unwrap();
            let mapped = transformed.get_version_bundle(name).unwrap();
            assert_eq!(original.install_script_names(), mapped.install_script_names());
            assert_eq!(original.rollback_script_names(), mapped.rollback_script_names());
        }
        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn s3_script_content_access_after_mapping() {
        let dir = tempdir();
        write_tree(&dir).await;
        let cancel = CancellationToken::new();
        let sources = Sources::load_from_filesystem(&cancel, &dir).await.unwrap();
        let transformed = sources.map(|content, _ctx| content.to_string());

        let script = transformed
            .get_version_bundle("vXXXX")
            .unwrap()
            .get_rollback_script("2-drop-something.js")
            .unwrap();
        assert_eq!(script.content(), "// 2-drop-something.js rollback \n");
        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn s6_unknown_extension_yields_unknown_kind() {
        let dir = tempdir();
        write_tree(&dir).await;
        let cancel = CancellationToken::new();
        let sources = Sources::load_from_filesystem(&cancel, &dir).await.unwrap();
        let script = sources
            .get_version_bundle("vXXXX")
            .unwrap()
            .get_rollback_script("99-notes.txt")
            .unwrap();
        assert_eq!(script.kind(), ScriptKind::Unknown);
        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn mapper_totality_exactly_once_per_script() {
        let dir = tempdir();
        write_tree(&dir).await;
        let cancel = CancellationToken::new();
        let sources = Sources::load_from_filesystem(&cancel, &dir).await.unwrap();

        let seen = std::sync::Mutex::new(HashSet::new());
        let _ = sources.map(|content, ctx| {
            let key = (
                ctx.version_name.to_string(),
                format!("{:?}", ctx.direction),
                ctx.item_name.to_string(),
            );
            assert!(seen.lock().unwrap().insert(key), "mapper called twice for the same script");
            content.to_string()
        });
        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn load_save_round_trip() {
        let dir = tempdir();
        write_tree(&dir).await;
        let cancel = CancellationToken::new();
        let sources = Sources::load_from_filesystem(&cancel, &dir).await.unwrap();

        let dest = tempdir();
        tokio::fs::create_dir_all(&dest).await.unwrap();
        sources.save_to_filesystem(&cancel, &dest).await.unwrap();

        let reloaded = Sources::load_from_filesystem(&cancel, &dest).await.unwrap();
        assert_eq!(sources, reloaded);

        tokio::fs::remove_dir_all(&dir).await.ok();
        tokio::fs::remove_dir_all(&dest).await.ok();
    }

    #[tokio::test]
    async fn load_missing_directory_fails() {
        let cancel = CancellationToken::new();
        let err = Sources::load_from_filesystem(&cancel, "/nonexistent/path/for/migra/tests")
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::WrongMigrationData(_)));
    }

    #[tokio::test]
    async fn save_requires_existing_destination() {
        let dir = tempdir();
        write_tree(&dir).await;
        let cancel = CancellationToken::new();
        let sources = Sources::load_from_filesystem(&cancel, &dir).await.unwrap();

        let missing_dest = dir.join("does-not-exist");
        let err = sources
            .save_to_filesystem(&cancel, &missing_dest)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::InvalidArgument { .. }));
        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn load_unsupported_scheme_fails() {
        let cancel = CancellationToken::new();
        let err = Sources::load(&cancel, "ftp://example.com/migrations")
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::NotSupportedUrlSchema(_)));
    }

    #[tokio::test]
    async fn load_remote_archive_scheme_not_implemented() {
        let cancel = CancellationToken::new();
        let err = Sources::load(&cancel, "https+tar+gz://example.com/migrations.tar.gz")
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::NotImplemented(_)));
    }

    fn tempdir() -> PathBuf {
        let nonce = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("migra-source-test-{nonce}"));
        std::fs::create_dir_all(&dir).expect("mkdir");
        dir
    }
}
