#![allow(dead_code)]

use lodestone_core::{Entity, SchemaCatalog, Store, StoreConfig};
use std::path::PathBuf;
use std::sync::Arc;

pub const ENTITY_TYPES: &[&str] = &["Record", "Companion", "Strict"];

pub fn schema_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/schema")
}

pub fn catalog() -> Arc<SchemaCatalog> {
    Arc::new(SchemaCatalog::load(schema_dir()).unwrap())
}

pub fn memory_store() -> Store {
    Store::open(StoreConfig::in_memory(), catalog(), ENTITY_TYPES).unwrap()
}

pub fn record(store: &Store) -> Entity {
    Entity::new(store.catalog(), "Record").unwrap()
}

pub fn tagged(store: &Store, tags: &[&str]) -> Entity {
    let mut entity = record(store);
    entity.set("tags", tags.to_vec()).unwrap();
    entity
}
