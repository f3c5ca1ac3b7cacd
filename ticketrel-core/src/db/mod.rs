//! Database abstraction layer for ticket relations
//!
//! The relation system talks to storage through the `RelationBackend` trait;
//! SQLite is the only relational store implemented.

mod migration;
mod sqlite_backend;
mod traits;

pub use migration::{current_version, needs_upgrade, upgrade, SCHEMA_VERSION};
pub use sqlite_backend::SqliteBackend;
pub use traits::{DatabaseStats, RelationBackend};

use std::path::Path;
use std::sync::Arc;

use crate::error::Result;

/// Opens an existing database or creates a new one, upgrading its schema
pub fn open_or_create(path: &Path) -> Result<Arc<dyn RelationBackend>> {
    log::debug!("Opening relations database at {}", path.display());
    Ok(Arc::new(SqliteBackend::new(path)?))
}
