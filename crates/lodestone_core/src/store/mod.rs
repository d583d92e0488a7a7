//! Relational persistence of dynamic entities.
//!
//! # Responsibility
//! - Derive one table per registered entity type from the schema catalog.
//! - Write, read, filter and count entities; keep freshness metadata.
//!
//! # Invariants
//! - Entities are validated before any SQL mutation.
//! - Every write call is atomic: all entities become visible or none do.
//! - A closed store rejects every operation with `StoreError::Closed`.

use crate::db::DbError;
use crate::model::EntityError;
use crate::schema::SchemaError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

mod codec;
mod filter;
mod freshness;
mod layout;
mod sqlite_store;

pub use filter::Filter;
pub use freshness::{timestamp_now, FreshnessRecord, TIMESTAMP_FORMAT};
pub(crate) use layout::ID_COLUMN;
pub use layout::{ColumnEncoding, ColumnLayout, TableLayout};
pub use sqlite_store::Store;

pub type StoreResult<T> = Result<T, StoreError>;

/// Backing database location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    InMemory,
}

/// Options for [`Store::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub location: StoreLocation,
    /// Drop every registered entity table and all freshness records on open.
    pub reset_existing: bool,
}

impl StoreConfig {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: StoreLocation::File(path.into()),
            reset_existing: false,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            location: StoreLocation::InMemory,
            reset_existing: false,
        }
    }

    pub fn with_reset(mut self, reset_existing: bool) -> Self {
        self.reset_existing = reset_existing;
        self
    }
}

/// Store operation error.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    Schema(SchemaError),
    Entity(EntityError),
    Closed,
    TransactionAlreadyOpen,
    NoTransaction,
    TransactionLeftOpen,
    EmptyFilterSet,
    UnregisteredEntityType(String),
    MixedFilterTypes {
        expected: String,
        found: String,
    },
    InvalidFilterValue {
        entity_type: String,
        attribute: String,
        value: String,
    },
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Schema(err) => write!(f, "{err}"),
            Self::Entity(err) => write!(f, "{err}"),
            Self::Closed => write!(f, "store is closed"),
            Self::TransactionAlreadyOpen => write!(f, "a transaction is already open"),
            Self::NoTransaction => write!(f, "no transaction is open"),
            Self::TransactionLeftOpen => {
                write!(f, "store closed with an open transaction; staged changes were rolled back")
            }
            Self::EmptyFilterSet => write!(f, "query and count require at least one filter"),
            Self::UnregisteredEntityType(name) => {
                write!(f, "entity type `{name}` is not registered with this store")
            }
            Self::MixedFilterTypes { expected, found } => write!(
                f,
                "filter bound to `{found}` cannot be combined with filters on `{expected}`"
            ),
            Self::InvalidFilterValue {
                entity_type,
                attribute,
                value,
            } => write!(
                f,
                "value `{value}` cannot be compared with `{attribute}` in type `{entity_type}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted entity data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Schema(err) => Some(err),
            Self::Entity(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Statement(value))
    }
}

impl From<SchemaError> for StoreError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}

impl From<EntityError> for StoreError {
    fn from(value: EntityError) -> Self {
        Self::Entity(value)
    }
}
