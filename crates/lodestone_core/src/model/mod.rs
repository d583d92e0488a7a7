//! Dynamic entity model.
//!
//! # Responsibility
//! - Define the schema-validated entity and its attribute values.
//! - Define the lazily materialized result sequence returned by queries.
//!
//! # Invariants
//! - Every entity is bound to a type declared in its schema catalog.
//! - Attribute reads and writes are validated against that catalog.

mod entity;
mod sequence;
mod value;

pub use entity::{
    Entity, EntityError, EntityId, EntityResult, RawAttributes, Violation, TYPE_TAG,
};
pub use sequence::{EntityFactory, EntityIter, EntityRegistry, EntitySequence, IntoEntities, RawRow};
pub use value::Value;
