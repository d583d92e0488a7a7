//! Physical table layout derived from entity type schemas.
//!
//! # Responsibility
//! - Map every declared attribute to one column with a storage encoding.
//! - Create, extend and index per-type tables.
//!
//! # Invariants
//! - Table name equals the entity type name.
//! - `_id` is the primary key; `_class_` always holds the type tag.
//! - Existing tables only ever gain columns; nothing is dropped unless reset.

use crate::model::TYPE_TAG;
use crate::schema::{AttributeDefinition, Datatype, EntityTypeSchema};
use log::info;
use rusqlite::Connection;
use std::collections::BTreeSet;

pub(crate) const ID_COLUMN: &str = "_id";

/// How one attribute is represented in its column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnEncoding {
    Integer,
    Boolean,
    Real,
    Text,
    /// JSON array or object text holding a list, pair or nested entity.
    Json,
}

impl ColumnEncoding {
    pub(crate) fn for_attribute(definition: &AttributeDefinition) -> Self {
        if definition.is_sequence() || definition.datatype.is_composite() {
            return Self::Json;
        }
        match definition.datatype {
            Datatype::Integer => Self::Integer,
            Datatype::Boolean => Self::Boolean,
            Datatype::Float => Self::Real,
            _ => Self::Text,
        }
    }

    fn sql_type(self) -> &'static str {
        match self {
            Self::Integer | Self::Boolean => "INTEGER",
            Self::Real => "REAL",
            Self::Text | Self::Json => "TEXT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    pub name: String,
    pub encoding: ColumnEncoding,
}

/// Column set of one entity type table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    entity_type: String,
    columns: Vec<ColumnLayout>,
}

impl TableLayout {
    pub fn derive(schema: &EntityTypeSchema) -> Self {
        let columns = schema
            .attributes()
            .map(|definition| ColumnLayout {
                name: definition.name.clone(),
                encoding: ColumnEncoding::for_attribute(definition),
            })
            .collect();
        Self {
            entity_type: schema.name().to_string(),
            columns,
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn columns(&self) -> &[ColumnLayout] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnLayout> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub(crate) fn table(&self) -> String {
        quote_ident(&self.entity_type)
    }

    pub(crate) fn drop_table(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {};", self.table()))
    }

    /// Creates the table if absent, adds missing columns and scalar indexes.
    pub(crate) fn apply(&self, conn: &Connection) -> rusqlite::Result<()> {
        let mut definitions = vec![
            format!("{} TEXT PRIMARY KEY NOT NULL", quote_ident(ID_COLUMN)),
            format!("{} TEXT NOT NULL", quote_ident(TYPE_TAG)),
        ];
        definitions.extend(self.columns.iter().map(column_definition));
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} ({});",
            self.table(),
            definitions.join(", ")
        ))?;

        let existing = self.existing_columns(conn)?;
        let mut added = 0usize;
        for column in self.columns.iter().filter(|c| !existing.contains(&c.name)) {
            conn.execute_batch(&format!(
                "ALTER TABLE {} ADD COLUMN {};",
                self.table(),
                column_definition(column)
            ))?;
            added += 1;
        }

        for column in self.columns.iter().filter(|c| c.encoding != ColumnEncoding::Json) {
            conn.execute_batch(&format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({});",
                quote_ident(&format!("idx_{}_{}", self.entity_type, column.name)),
                self.table(),
                quote_ident(&column.name)
            ))?;
        }

        info!(
            "event=layout_apply module=store status=ok entity_type={} columns={} added_columns={added}",
            self.entity_type,
            self.columns.len()
        );
        Ok(())
    }

    /// `INSERT ... ON CONFLICT("_id") DO UPDATE` over every column.
    pub(crate) fn upsert_sql(&self) -> String {
        let names: Vec<String> = [ID_COLUMN, TYPE_TAG]
            .into_iter()
            .chain(self.columns.iter().map(|c| c.name.as_str()))
            .map(quote_ident)
            .collect();
        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
        let updates: Vec<String> = names
            .iter()
            .skip(1)
            .map(|name| format!("{name} = excluded.{name}"))
            .collect();

        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) DO UPDATE SET {};",
            self.table(),
            names.join(", "),
            placeholders.join(", "),
            quote_ident(ID_COLUMN),
            updates.join(", ")
        )
    }

    /// `SELECT` of identity, tag and every attribute column, in layout order.
    pub(crate) fn select_sql(&self) -> String {
        let names: Vec<String> = [ID_COLUMN, TYPE_TAG]
            .into_iter()
            .chain(self.columns.iter().map(|c| c.name.as_str()))
            .map(quote_ident)
            .collect();
        format!("SELECT {} FROM {}", names.join(", "), self.table())
    }

    fn existing_columns(&self, conn: &Connection) -> rusqlite::Result<BTreeSet<String>> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", self.table()))?;
        let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
        names.collect()
    }
}

fn column_definition(column: &ColumnLayout) -> String {
    format!("{} {}", quote_ident(&column.name), column.encoding.sql_type())
}

/// Quotes an SQL identifier, doubling embedded quotes.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::{quote_ident, ColumnEncoding, TableLayout};
    use crate::schema::SchemaCatalog;

    fn layout() -> TableLayout {
        let sheet = "Attribute,Description,Datatype,Cardinality,Application\n\
                     count,,Integer,0..1,\n\
                     flag,,Boolean,0..1,\n\
                     score,,Float,0..1,\n\
                     tags,,String,0..*,\n\
                     title,,String,1..1,\n";
        let catalog = SchemaCatalog::from_sheets([("Item", sheet)]).unwrap();
        TableLayout::derive(catalog.entity_type("Item").unwrap())
    }

    #[test]
    fn encodings_follow_datatype_and_cardinality() {
        let layout = layout();
        let encoding = |name: &str| layout.column(name).unwrap().encoding;
        assert_eq!(encoding("count"), ColumnEncoding::Integer);
        assert_eq!(encoding("flag"), ColumnEncoding::Boolean);
        assert_eq!(encoding("score"), ColumnEncoding::Real);
        assert_eq!(encoding("tags"), ColumnEncoding::Json);
        assert_eq!(encoding("title"), ColumnEncoding::Text);
    }

    #[test]
    fn upsert_binds_every_column_once() {
        let sql = layout().upsert_sql();
        assert!(sql.starts_with("INSERT INTO \"Item\""));
        assert!(sql.contains("?7)"));
        assert!(!sql.contains("?8"));
        assert!(sql.contains("ON CONFLICT(\"_id\")"));
    }

    #[test]
    fn identifiers_escape_quotes() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
