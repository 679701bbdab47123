//! Catalog storage
//!
//! Each catalog is one SQLite file holding a tenant's sources, their
//! tracking state and every item discovered for them. Catalogs are opened
//! independently; nothing is shared between them.

pub mod catalog;
pub mod schema;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use catalog::{Catalog, SourceStatus};
pub use schema::init_schema;

/// Catalog storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Lock contention on the catalog file; retry later
    #[error("catalog busy: {0}")]
    Busy(#[source] rusqlite::Error),

    #[error("cannot open catalog {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("sqlite error: {0}")]
    Sqlite(#[source] rusqlite::Error),

    #[error("catalog connection lock poisoned")]
    LockPoisoned,

    #[error("source record missing after upsert: {url}")]
    MissingSource { url: String },
}

impl StorageError {
    /// Whether this is lock contention rather than a real failure
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(
                    e.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                Self::Busy(err)
            }
            _ => Self::Sqlite(err),
        }
    }
}

/// Every `*.db` file directly inside `dir`, sorted by path
pub fn discover_catalogs(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "db") {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}
