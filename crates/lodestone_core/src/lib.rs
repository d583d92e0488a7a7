//! Schema-validated dynamic entity store with incremental loading.
//!
//! Entity types are declared in tabular schema sheets, validated on every
//! attribute access, persisted to SQLite and reloaded only when their
//! upstream sources change.

pub mod db;
pub mod load;
pub mod logging;
pub mod model;
pub mod schema;
pub mod store;

pub use load::{
    BoxError, GroupOutcome, GroupReport, LoadError, LoadOrchestrator, LoadResult, Loader,
    LocalFileSource, RunReport, Source,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::{
    Entity, EntityError, EntityFactory, EntityId, EntityRegistry, EntityResult, EntitySequence,
    RawAttributes, Value, Violation, TYPE_TAG,
};
pub use schema::{
    AttributeDefinition, Cardinality, Datatype, EntityTypeSchema, SchemaCatalog, SchemaError,
    SchemaResult,
};
pub use store::{
    Filter, FreshnessRecord, Store, StoreConfig, StoreError, StoreLocation, StoreResult,
};
