//! # migra
//!
//! A schema migration engine for relational databases.
//!
//! `migra` brings a target database from its currently recorded schema
//! version to a requested target version by executing an ordered series of
//! versioned install/rollback scripts inside transactional boundaries,
//! recording outcomes in a bookkeeping table, and supporting symmetric
//! rollback.
//!
//! Two subsystems do the work:
//!
//! - [`source`]: an immutable, in-memory representation of a versioned tree
//!   of install/rollback scripts (`Sources`), loaded from a filesystem URI,
//!   transformable via [`source::Sources::map`], and serializable back to
//!   disk.
//! - [`manager`]: the execution engine (`Manager<D, H>`) that computes the
//!   ordered set of versions to apply, drives per-version transactional
//!   execution, and maintains the version-history table through a
//!   dialect-specific [`manager::DialectHooks`] implementation.
//!
//! The database driver itself is an external collaborator behind the
//! [`driver::DriverFactory`]/[`driver::Provider`] traits — this crate never
//! speaks to a database directly. See `migra-postgres` for a concrete
//! dialect.

pub mod cancel;
pub mod driver;
pub mod error;
pub mod log;
pub mod manager;
pub mod source;
pub mod step;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use cancel::CancellationToken;
pub use error::{MigrationError, MigrationResult};
pub use manager::{InstallReport, Manager, RollbackReport};
pub use source::{Direction, MapContext, Script, ScriptKind, Sources, VersionBundle};
