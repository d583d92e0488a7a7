//! Store database bootstrap.
//!
//! # Responsibility
//! - Open and configure the connection behind one entity store.
//! - Migrate store-owned bookkeeping tables before any entity table is touched.
//!
//! # Invariants
//! - Every error names the bootstrap step that failed.
//! - A store never receives a connection whose migrations are incomplete.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub(crate) use open::FOLD_CASE_FUNCTION;
pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Failure while opening or preparing a store database.
#[derive(Debug)]
pub enum DbError {
    /// The database at `location` could not be opened or created.
    Open {
        location: String,
        source: rusqlite::Error,
    },
    /// A connection setting such as `journal_mode` was refused.
    Configure {
        setting: &'static str,
        source: rusqlite::Error,
    },
    /// Migration `version` failed and was rolled back.
    Migration {
        version: u32,
        source: rusqlite::Error,
    },
    /// The file carries bookkeeping tables from a newer build.
    NewerStoreFormat { found: u32, supported: u32 },
    /// A statement against an already prepared database failed.
    Statement(rusqlite::Error),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open { location, source } => {
                write!(f, "cannot open store database at {location}: {source}")
            }
            Self::Configure { setting, source } => {
                write!(f, "cannot apply `{setting}` to store database: {source}")
            }
            Self::Migration { version, source } => {
                write!(f, "store migration {version} failed: {source}")
            }
            Self::NewerStoreFormat { found, supported } => write!(
                f,
                "store database format {found} is newer than supported {supported}"
            ),
            Self::Statement(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Open { source, .. }
            | Self::Configure { source, .. }
            | Self::Migration { source, .. } => Some(source),
            Self::Statement(err) => Some(err),
            Self::NewerStoreFormat { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Statement(value)
    }
}
