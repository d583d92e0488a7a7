//! Declarative schema definitions for dynamic entities.
//!
//! # Responsibility
//! - Load the tabular schema workbook once per process.
//! - Expose per-type attribute definitions to the entity model and store.
//!
//! # Invariants
//! - Configuration errors (missing source, malformed header/cardinality,
//!   unresolved datatype, reserved attribute name) are fatal; no partially loaded catalog exists.
//! - The installed catalog is shared read-only and never re-initialized.

use log::info;
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;

mod attribute;
mod catalog;
mod sheet;

pub use attribute::{AttributeDefinition, Cardinality, Datatype};
pub use catalog::{EntityTypeSchema, SchemaCatalog};

static INSTALLED_CATALOG: OnceCell<Arc<SchemaCatalog>> = OnceCell::new();

pub type SchemaResult<T> = Result<T, SchemaError>;

/// Schema configuration error.
#[derive(Debug)]
pub enum SchemaError {
    MissingSource(PathBuf),
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Csv {
        sheet: String,
        source: csv::Error,
    },
    MalformedHeader {
        sheet: String,
        column: usize,
        expected: &'static str,
        found: String,
    },
    MalformedCardinality {
        sheet: String,
        attribute: String,
        value: String,
    },
    MalformedDatatype {
        sheet: String,
        attribute: String,
        value: String,
    },
    UnresolvedDatatype {
        sheet: String,
        attribute: String,
        datatype: String,
    },
    DuplicateAttribute {
        sheet: String,
        attribute: String,
    },
    ReservedAttribute {
        sheet: String,
        attribute: String,
    },
    DuplicateEntityType(String),
    UnknownEntityType(String),
    AlreadyInstalled,
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingSource(path) => {
                write!(f, "schema source `{}` does not exist", path.display())
            }
            Self::Io { path, source } => {
                write!(f, "cannot read schema source `{}`: {source}", path.display())
            }
            Self::Csv { sheet, source } => write!(f, "invalid schema sheet `{sheet}`: {source}"),
            Self::MalformedHeader {
                sheet,
                column,
                expected,
                found,
            } => write!(
                f,
                "invalid sheet structure in `{sheet}`: column {column} must be `{expected}`, found `{found}`"
            ),
            Self::MalformedCardinality {
                sheet,
                attribute,
                value,
            } => write!(
                f,
                "invalid cardinality `{value}` for attribute `{attribute}` in sheet `{sheet}`"
            ),
            Self::MalformedDatatype {
                sheet,
                attribute,
                value,
            } => write!(
                f,
                "invalid datatype `{value}` for attribute `{attribute}` in sheet `{sheet}`"
            ),
            Self::UnresolvedDatatype {
                sheet,
                attribute,
                datatype,
            } => write!(
                f,
                "attribute `{attribute}` in sheet `{sheet}` references unknown type `{datatype}`"
            ),
            Self::DuplicateAttribute { sheet, attribute } => {
                write!(f, "attribute `{attribute}` declared twice in sheet `{sheet}`")
            }
            Self::ReservedAttribute { sheet, attribute } => write!(
                f,
                "attribute `{attribute}` in sheet `{sheet}` uses a name reserved by the store"
            ),
            Self::DuplicateEntityType(name) => write!(f, "entity type `{name}` declared twice"),
            Self::UnknownEntityType(name) => {
                write!(f, "schema definition not found for type `{name}`")
            }
            Self::AlreadyInstalled => write!(f, "schema catalog is already installed"),
        }
    }
}

impl Error for SchemaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Csv { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Installs the process-wide catalog.
///
/// Returns the shared handle that components receive explicitly.
///
/// # Errors
/// - `AlreadyInstalled` when a catalog was installed before.
pub fn install(catalog: SchemaCatalog) -> SchemaResult<Arc<SchemaCatalog>> {
    let shared = Arc::new(catalog);
    INSTALLED_CATALOG
        .set(Arc::clone(&shared))
        .map_err(|_| SchemaError::AlreadyInstalled)?;
    info!(
        "event=schema_install module=schema status=ok types={}",
        shared.entity_types().count()
    );
    Ok(shared)
}

/// Returns the installed catalog, if any.
pub fn installed() -> Option<Arc<SchemaCatalog>> {
    INSTALLED_CATALOG.get().cloned()
}
