//! Lazily materialized query results.
//!
//! # Responsibility
//! - Carry raw storage rows of one entity type out of the store.
//! - Build entities through the registered factory only when iterated.
//!
//! # Invariants
//! - Every call to [`EntitySequence::iter`] starts from the first row.
//! - Rows produced by one sequence all share the same entity type.

use super::entity::{Entity, EntityId, RawAttributes};
use crate::schema::SchemaCatalog;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Builds a concrete entity from a raw storage row.
pub type EntityFactory = fn(Arc<SchemaCatalog>, &str, Option<EntityId>, RawAttributes) -> Entity;

/// Entity type name -> factory used when materializing query rows.
#[derive(Clone, Default)]
pub struct EntityRegistry {
    factories: BTreeMap<String, EntityFactory>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` for `entity_type`, replacing any earlier one.
    pub fn register(&mut self, entity_type: impl Into<String>, factory: EntityFactory) {
        self.factories.insert(entity_type.into(), factory);
    }

    /// Registers the plain [`Entity::restore`] constructor.
    pub fn register_default(&mut self, entity_type: impl Into<String>) {
        self.register(entity_type, Entity::restore);
    }

    pub fn factory(&self, entity_type: &str) -> Option<EntityFactory> {
        self.factories.get(entity_type).copied()
    }

    pub fn contains(&self, entity_type: &str) -> bool {
        self.factories.contains_key(entity_type)
    }
}

impl Debug for EntityRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

/// One stored row before materialization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub id: EntityId,
    pub attributes: RawAttributes,
}

/// Restartable sequence of entities built from raw rows.
#[derive(Clone)]
pub struct EntitySequence {
    entity_type: String,
    catalog: Arc<SchemaCatalog>,
    factory: EntityFactory,
    rows: Vec<RawRow>,
}

impl EntitySequence {
    pub(crate) fn new(
        entity_type: &str,
        catalog: Arc<SchemaCatalog>,
        factory: EntityFactory,
        rows: Vec<RawRow>,
    ) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            catalog,
            factory,
            rows,
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Fresh iterator over the sequence; entities are built on demand.
    pub fn iter(&self) -> EntityIter<'_> {
        EntityIter {
            sequence: self,
            position: 0,
        }
    }

    fn materialize(&self, row: &RawRow) -> Entity {
        (self.factory)(
            Arc::clone(&self.catalog),
            &self.entity_type,
            Some(row.id),
            row.attributes.clone(),
        )
    }
}

impl Debug for EntitySequence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitySequence")
            .field("entity_type", &self.entity_type)
            .field("rows", &self.rows)
            .finish()
    }
}

/// Borrowing iterator returned by [`EntitySequence::iter`].
pub struct EntityIter<'a> {
    sequence: &'a EntitySequence,
    position: usize,
}

impl Iterator for EntityIter<'_> {
    type Item = Entity;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.sequence.rows.get(self.position)?;
        self.position += 1;
        Some(self.sequence.materialize(row))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.sequence.rows.len() - self.position;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for EntityIter<'_> {}

impl<'a> IntoIterator for &'a EntitySequence {
    type Item = Entity;
    type IntoIter = EntityIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Owning iterator returned by `EntitySequence::into_iter`.
pub struct IntoEntities {
    entity_type: String,
    catalog: Arc<SchemaCatalog>,
    factory: EntityFactory,
    rows: std::vec::IntoIter<RawRow>,
}

impl Iterator for IntoEntities {
    type Item = Entity;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        Some((self.factory)(
            Arc::clone(&self.catalog),
            &self.entity_type,
            Some(row.id),
            row.attributes,
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl IntoIterator for EntitySequence {
    type Item = Entity;
    type IntoIter = IntoEntities;

    fn into_iter(self) -> Self::IntoIter {
        IntoEntities {
            entity_type: self.entity_type,
            catalog: self.catalog,
            factory: self.factory,
            rows: self.rows.into_iter(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EntityRegistry, EntitySequence, RawRow};
    use crate::model::{Entity, RawAttributes, Value, TYPE_TAG};
    use crate::schema::SchemaCatalog;
    use std::sync::Arc;
    use uuid::Uuid;

    fn catalog() -> Arc<SchemaCatalog> {
        let sheet = "Attribute,Description,Datatype,Cardinality,Application\nname,,String,0..1,\n";
        Arc::new(SchemaCatalog::from_sheets([("Item", sheet)]).unwrap())
    }

    fn row(name: &str) -> RawRow {
        let mut attributes = RawAttributes::new();
        attributes.insert(TYPE_TAG.to_string(), Value::from("Item"));
        attributes.insert("name".to_string(), Value::from(name));
        RawRow {
            id: Uuid::new_v4(),
            attributes,
        }
    }

    #[test]
    fn iteration_restarts_from_first_row() {
        let sequence = EntitySequence::new(
            "Item",
            catalog(),
            Entity::restore,
            vec![row("a"), row("b")],
        );

        let first: Vec<_> = sequence.iter().map(|entity| entity.raw("name").cloned()).collect();
        let second: Vec<_> = sequence.iter().map(|entity| entity.raw("name").cloned()).collect();
        assert_eq!(first, second);
        assert_eq!(sequence.iter().len(), 2);
    }

    #[test]
    fn registry_falls_back_to_nothing_for_unknown_type() {
        let mut registry = EntityRegistry::new();
        registry.register_default("Item");
        assert!(registry.contains("Item"));
        assert!(registry.factory("Other").is_none());
    }

    #[test]
    fn materialized_entities_keep_row_identity() {
        let source = row("a");
        let id = source.id;
        let sequence = EntitySequence::new("Item", catalog(), Entity::restore, vec![source]);
        let entity = sequence.into_iter().next().unwrap();
        assert_eq!(entity.id(), Some(id));
        assert_eq!(entity.type_name(), "Item");
    }
}
