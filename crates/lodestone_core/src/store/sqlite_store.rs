//! SQLite-backed entity store.
//!
//! # Responsibility
//! - Own the single connection and the per-type table layouts.
//! - Implement atomic writes, explicit batch transactions and filtered reads.
//!
//! # Invariants
//! - Only entity types passed to `open` are readable or writable.
//! - Rows are upserted by internal identity; a persisted entity keeps its id.
//! - `close` or drop with an open explicit transaction rolls it back.

use super::codec::{decode, encode};
use super::filter::{where_clause, Filter};
use super::freshness::{self, FreshnessRecord};
use super::layout::TableLayout;
use super::{StoreConfig, StoreError, StoreLocation, StoreResult};
use crate::db::{open_db, open_db_in_memory};
use crate::model::{
    Entity, EntityFactory, EntityRegistry, EntitySequence, RawAttributes, RawRow, Value, TYPE_TAG,
};
use crate::schema::SchemaCatalog;
use log::{debug, error, info, warn};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, Row};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Persistence engine for schema-declared entity types.
#[derive(Debug)]
pub struct Store {
    conn: Option<Connection>,
    catalog: Arc<SchemaCatalog>,
    registry: EntityRegistry,
    layouts: BTreeMap<String, TableLayout>,
    transaction_open: bool,
}

impl Store {
    /// Opens the backing database and applies the layout of `entity_types`.
    ///
    /// # Errors
    /// - `Schema(UnknownEntityType)` when a type is missing from the catalog.
    /// - `Db` for connection, migration or DDL failures.
    pub fn open(
        config: StoreConfig,
        catalog: Arc<SchemaCatalog>,
        entity_types: &[&str],
    ) -> StoreResult<Self> {
        let started_at = Instant::now();

        let mut layouts = BTreeMap::new();
        let mut registry = EntityRegistry::new();
        for entity_type in entity_types {
            let schema = catalog.require(entity_type)?;
            layouts.insert(entity_type.to_string(), TableLayout::derive(schema));
            registry.register_default(*entity_type);
        }

        let mut conn = match &config.location {
            StoreLocation::File(path) => open_db(path)?,
            StoreLocation::InMemory => open_db_in_memory()?,
        };

        let tx = conn.transaction()?;
        if config.reset_existing {
            for layout in layouts.values() {
                layout.drop_table(&tx)?;
            }
            let cleared = freshness::clear(&tx)?;
            info!(
                "event=store_reset module=store status=ok tables={} freshness_records={cleared}",
                layouts.len()
            );
        }
        for layout in layouts.values() {
            layout.apply(&tx)?;
        }
        tx.commit()?;

        info!(
            "event=store_open module=store status=ok entity_types={} reset={} duration_ms={}",
            layouts.len(),
            config.reset_existing,
            started_at.elapsed().as_millis()
        );

        Ok(Self {
            conn: Some(conn),
            catalog,
            registry,
            layouts,
            transaction_open: false,
        })
    }

    pub fn catalog(&self) -> &Arc<SchemaCatalog> {
        &self.catalog
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction_open
    }

    /// Replaces the factory used to materialize rows of `entity_type`.
    pub fn register_factory(
        &mut self,
        entity_type: &str,
        factory: EntityFactory,
    ) -> StoreResult<()> {
        self.layout(entity_type)?;
        self.registry.register(entity_type, factory);
        Ok(())
    }

    /// Unrestricted filter over `entity_type`.
    pub fn filter(&self, entity_type: &str) -> StoreResult<Filter> {
        self.layout(entity_type)?;
        Ok(Filter::new(entity_type, Arc::clone(&self.catalog)))
    }

    /// Inserts or updates `entities` in one atomic unit.
    ///
    /// Every entity is validated first; newly inserted entities receive an
    /// internal id.
    pub fn persist(&mut self, entities: &mut [Entity]) -> StoreResult<()> {
        if entities.is_empty() {
            return Ok(());
        }
        let started_at = Instant::now();
        let conn = self.conn.as_mut().ok_or(StoreError::Closed)?;

        for entity in entities.iter_mut() {
            require_layout(&self.layouts, entity.type_name())?;
            entity.validate()?;
        }

        let savepoint = conn.savepoint()?;
        for entity in entities.iter_mut() {
            write_entity(&savepoint, &self.layouts, entity)?;
        }
        savepoint.commit()?;

        debug!(
            "event=store_persist module=store status=ok entities={} duration_ms={}",
            entities.len(),
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    /// Merges one entity's current state, atomically.
    pub fn update(&mut self, entity: &mut Entity) -> StoreResult<()> {
        self.persist(std::slice::from_mut(entity))
    }

    /// Starts an explicit batch transaction for [`Self::mass_update`].
    pub fn open_transaction(&mut self) -> StoreResult<()> {
        let conn = self.conn.as_ref().ok_or(StoreError::Closed)?;
        if self.transaction_open {
            return Err(StoreError::TransactionAlreadyOpen);
        }
        conn.execute_batch("BEGIN IMMEDIATE;")?;
        self.transaction_open = true;
        debug!("event=store_transaction module=store status=open");
        Ok(())
    }

    /// Stages one entity inside the open explicit transaction.
    pub fn mass_update(&mut self, entity: &mut Entity) -> StoreResult<()> {
        let conn = self.conn.as_ref().ok_or(StoreError::Closed)?;
        if !self.transaction_open {
            return Err(StoreError::NoTransaction);
        }
        require_layout(&self.layouts, entity.type_name())?;
        entity.validate()?;
        write_entity(conn, &self.layouts, entity)
    }

    /// Commits every entity staged since [`Self::open_transaction`].
    pub fn commit(&mut self) -> StoreResult<()> {
        self.finish_transaction("COMMIT;", "commit")
    }

    /// Discards every entity staged since [`Self::open_transaction`].
    pub fn rollback(&mut self) -> StoreResult<()> {
        self.finish_transaction("ROLLBACK;", "rollback")
    }

    /// Every stored entity of `entity_type`.
    pub fn all(&self, entity_type: &str) -> StoreResult<EntitySequence> {
        let filter = self.filter(entity_type)?;
        self.query(&[filter])
    }

    /// Entities matching every filter in `filters`.
    ///
    /// # Errors
    /// - `EmptyFilterSet` for an empty slice.
    /// - `MixedFilterTypes` when filters are bound to different types.
    pub fn query(&self, filters: &[Filter]) -> StoreResult<EntitySequence> {
        let started_at = Instant::now();
        let conn = self.conn.as_ref().ok_or(StoreError::Closed)?;
        let (clause, binds) = where_clause(filters)?;
        let entity_type = filters
            .first()
            .map(Filter::entity_type)
            .ok_or(StoreError::EmptyFilterSet)?;
        let layout = require_layout(&self.layouts, entity_type)?;

        let sql = format!("{}{clause};", layout.select_sql());
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(binds.iter()))?;
        let mut raw_rows = Vec::new();
        while let Some(row) = rows.next()? {
            raw_rows.push(read_row(row, layout)?);
        }

        debug!(
            "event=store_query module=store status=ok entity_type={entity_type} rows={} duration_ms={}",
            raw_rows.len(),
            started_at.elapsed().as_millis()
        );

        let factory = self
            .registry
            .factory(entity_type)
            .ok_or_else(|| StoreError::UnregisteredEntityType(entity_type.to_string()))?;
        Ok(EntitySequence::new(
            entity_type,
            Arc::clone(&self.catalog),
            factory,
            raw_rows,
        ))
    }

    /// Number of entities matching every filter in `filters`.
    pub fn count(&self, filters: &[Filter]) -> StoreResult<u64> {
        let conn = self.conn.as_ref().ok_or(StoreError::Closed)?;
        let (clause, binds) = where_clause(filters)?;
        let entity_type = filters
            .first()
            .map(Filter::entity_type)
            .ok_or(StoreError::EmptyFilterSet)?;
        let layout = require_layout(&self.layouts, entity_type)?;

        let sql = format!("SELECT COUNT(*) FROM {}{clause};", layout.table());
        let count = conn.query_row(&sql, params_from_iter(binds.iter()), |row| {
            row.get::<_, i64>(0)
        })?;
        u64::try_from(count).map_err(|_| StoreError::InvalidData(format!("negative count {count}")))
    }

    /// Calls `visit` with every stored entity of `entity_type`.
    pub fn for_each<F>(&self, entity_type: &str, mut visit: F) -> StoreResult<()>
    where
        F: FnMut(Entity),
    {
        for entity in self.all(entity_type)? {
            visit(entity);
        }
        Ok(())
    }

    /// Stored freshness of `source_identifier`, or an unseen record.
    pub fn freshness(&self, source_identifier: &str) -> StoreResult<FreshnessRecord> {
        let conn = self.conn.as_ref().ok_or(StoreError::Closed)?;
        Ok(freshness::load(conn, source_identifier)?)
    }

    /// Upserts one freshness record.
    pub fn persist_freshness(&mut self, record: &FreshnessRecord) -> StoreResult<()> {
        let conn = self.conn.as_ref().ok_or(StoreError::Closed)?;
        freshness::upsert(conn, record)?;
        debug!(
            "event=freshness_persist module=store status=ok source={}",
            record.source_identifier
        );
        Ok(())
    }

    /// Releases the connection.
    ///
    /// # Errors
    /// - `Closed` when already closed.
    /// - `TransactionLeftOpen` when an explicit transaction was still open; its
    ///   staged entities are rolled back and the store is closed regardless.
    pub fn close(&mut self) -> StoreResult<()> {
        let conn = self.conn.take().ok_or(StoreError::Closed)?;
        let left_open = std::mem::take(&mut self.transaction_open);
        if left_open {
            warn!("event=store_close module=store status=rollback reason=transaction_left_open");
            conn.execute_batch("ROLLBACK;")?;
        }

        conn.close().map_err(|(_, err)| {
            error!("event=store_close module=store status=error error={err}");
            StoreError::from(err)
        })?;
        info!("event=store_close module=store status=ok");

        if left_open {
            Err(StoreError::TransactionLeftOpen)
        } else {
            Ok(())
        }
    }

    fn finish_transaction(&mut self, sql: &str, action: &str) -> StoreResult<()> {
        let conn = self.conn.as_ref().ok_or(StoreError::Closed)?;
        if !self.transaction_open {
            return Err(StoreError::NoTransaction);
        }
        conn.execute_batch(sql)?;
        self.transaction_open = false;
        debug!("event=store_transaction module=store status={action}");
        Ok(())
    }

    /// Layout of a registered type, provided the store is still open.
    fn layout(&self, entity_type: &str) -> StoreResult<&TableLayout> {
        if self.conn.is_none() {
            return Err(StoreError::Closed);
        }
        require_layout(&self.layouts, entity_type)
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.transaction_open {
                warn!("event=store_drop module=store status=rollback reason=transaction_left_open");
                if let Err(err) = conn.execute_batch("ROLLBACK;") {
                    error!("event=store_drop module=store status=error error={err}");
                }
            }
        }
    }
}

fn require_layout<'a>(
    layouts: &'a BTreeMap<String, TableLayout>,
    entity_type: &str,
) -> StoreResult<&'a TableLayout> {
    layouts
        .get(entity_type)
        .ok_or_else(|| StoreError::UnregisteredEntityType(entity_type.to_string()))
}

fn write_entity(
    conn: &Connection,
    layouts: &BTreeMap<String, TableLayout>,
    entity: &mut Entity,
) -> StoreResult<()> {
    let layout = require_layout(layouts, entity.type_name())?;
    let id = entity.id().unwrap_or_else(Uuid::new_v4);

    let mut binds = Vec::with_capacity(layout.columns().len() + 2);
    binds.push(SqlValue::Text(id.to_string()));
    binds.push(SqlValue::Text(entity.type_name().to_string()));
    for column in layout.columns() {
        let value = entity.raw(&column.name).unwrap_or(&Value::Null);
        let encoded = encode(column.encoding, value).map_err(|value| {
            StoreError::InvalidData(format!(
                "`{}` in type `{}` cannot be stored as {:?}: `{value}`",
                column.name,
                entity.type_name(),
                column.encoding
            ))
        })?;
        binds.push(encoded);
    }

    conn.execute(&layout.upsert_sql(), params_from_iter(binds))?;
    entity.assign_id(id);
    Ok(())
}

fn read_row(row: &Row<'_>, layout: &TableLayout) -> StoreResult<RawRow> {
    let id_text: String = row.get(0)?;
    let id = Uuid::parse_str(&id_text)
        .map_err(|err| StoreError::InvalidData(format!("invalid entity id `{id_text}`: {err}")))?;
    let tag: String = row.get(1)?;
    if tag != layout.entity_type() {
        return Err(StoreError::InvalidData(format!(
            "row `{id_text}` in `{}` carries type tag `{tag}`",
            layout.entity_type()
        )));
    }

    let mut attributes = RawAttributes::new();
    attributes.insert(TYPE_TAG.to_string(), Value::Text(tag));
    for (index, column) in layout.columns().iter().enumerate() {
        let stored: SqlValue = row.get(index + 2)?;
        if let Some(value) = decode(column.encoding, stored) {
            attributes.insert(column.name.clone(), value);
        }
    }
    Ok(RawRow { id, attributes })
}
