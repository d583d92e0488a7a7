//! Tabular schema sheet parsing.
//!
//! # Responsibility
//! - Turn one CSV sheet into the attribute map of one entity type.
//! - Skip sheets that are not schema sheets.
//!
//! # Invariants
//! - Column positions are fixed: Attribute(0), description(1), Datatype(2),
//!   Cardinality(3), Application(4).
//! - A malformed header or cardinality aborts parsing of the whole catalog.

use super::attribute::{parse_datatype_cell, AttributeDefinition, Cardinality};
use super::{SchemaError, SchemaResult};
use crate::model::TYPE_TAG;
use crate::store::ID_COLUMN;
use csv::{ReaderBuilder, StringRecord, Trim};
use log::debug;
use std::collections::BTreeMap;

const ATTRIBUTE_COLUMN: usize = 0;
const DATATYPE_COLUMN: usize = 2;
const CARDINALITY_COLUMN: usize = 3;
const APPLICATION_COLUMN: usize = 4;

/// Column names every entity table already carries.
const RESERVED_NAMES: [&str; 2] = [ID_COLUMN, TYPE_TAG];

const REQUIRED_HEADERS: &[(usize, &str)] = &[
    (DATATYPE_COLUMN, "Datatype"),
    (CARDINALITY_COLUMN, "Cardinality"),
    (APPLICATION_COLUMN, "Application"),
];

/// Parses one sheet.
///
/// Returns `Ok(None)` when the sheet is not a schema sheet (first header cell
/// is not `Attribute`).
pub(crate) fn parse_sheet(
    sheet: &str,
    text: &str,
) -> SchemaResult<Option<BTreeMap<String, AttributeDefinition>>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());
    let mut records = reader.records();

    let header = match records.next() {
        Some(record) => record.map_err(|source| SchemaError::Csv {
            sheet: sheet.to_string(),
            source,
        })?,
        None => {
            debug!("event=schema_sheet_skip module=schema sheet={sheet} reason=empty");
            return Ok(None);
        }
    };

    if cell(&header, ATTRIBUTE_COLUMN) != "Attribute" {
        debug!("event=schema_sheet_skip module=schema sheet={sheet} reason=no_attribute_header");
        return Ok(None);
    }

    for (column, expected) in REQUIRED_HEADERS {
        let found = cell(&header, *column);
        if found != *expected {
            return Err(SchemaError::MalformedHeader {
                sheet: sheet.to_string(),
                column: *column,
                expected,
                found: found.to_string(),
            });
        }
    }

    let mut attributes = BTreeMap::new();
    for record in records {
        let record = record.map_err(|source| SchemaError::Csv {
            sheet: sheet.to_string(),
            source,
        })?;

        let name = cell(&record, ATTRIBUTE_COLUMN);
        if name.is_empty() {
            continue;
        }

        let definition = parse_row(sheet, name, &record)?;
        if attributes.insert(name.to_string(), definition).is_some() {
            return Err(SchemaError::DuplicateAttribute {
                sheet: sheet.to_string(),
                attribute: name.to_string(),
            });
        }
    }

    Ok(Some(attributes))
}

fn parse_row(sheet: &str, name: &str, record: &StringRecord) -> SchemaResult<AttributeDefinition> {
    if RESERVED_NAMES.contains(&name) {
        return Err(SchemaError::ReservedAttribute {
            sheet: sheet.to_string(),
            attribute: name.to_string(),
        });
    }

    let cardinality_code = cell(record, CARDINALITY_COLUMN);
    let cardinality =
        Cardinality::parse(cardinality_code).ok_or_else(|| SchemaError::MalformedCardinality {
            sheet: sheet.to_string(),
            attribute: name.to_string(),
            value: cardinality_code.to_string(),
        })?;

    let datatype_cell = cell(record, DATATYPE_COLUMN);
    let (datatype, allowed_values) =
        parse_datatype_cell(datatype_cell).ok_or_else(|| SchemaError::MalformedDatatype {
            sheet: sheet.to_string(),
            attribute: name.to_string(),
            value: datatype_cell.to_string(),
        })?;

    let scope = match cell(record, APPLICATION_COLUMN) {
        "" => None,
        value => Some(value.to_string()),
    };

    Ok(AttributeDefinition {
        name: name.to_string(),
        datatype,
        cardinality,
        allowed_values,
        scope,
    })
}

fn cell(record: &StringRecord, index: usize) -> &str {
    record.get(index).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::parse_sheet;
    use crate::schema::{Datatype, SchemaError};

    #[test]
    fn non_schema_sheet_is_ignored() {
        let parsed = parse_sheet("Notes", "Remarks,,,\nsome text,,,\n").unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn blank_rows_are_skipped() {
        let text = "Attribute,Description,Datatype,Cardinality,Application\n\
                    title,,String,1..1,\n\
                    ,,,,\n\
                    pages,,Integer,0..1,library\n";
        let attributes = parse_sheet("Book", text).unwrap().unwrap();
        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes["pages"].datatype, Datatype::Integer);
        assert_eq!(attributes["pages"].scope.as_deref(), Some("library"));
        assert_eq!(attributes["title"].scope, None);
    }

    #[test]
    fn misplaced_header_column_is_fatal() {
        let text = "Attribute,Description,Cardinality,Datatype,Application\n";
        let err = parse_sheet("Book", text).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::MalformedHeader { column: 2, expected: "Datatype", .. }
        ));
    }

    #[test]
    fn duplicate_attribute_is_fatal() {
        let text = "Attribute,Description,Datatype,Cardinality,Application\n\
                    title,,String,1..1,\n\
                    title,,String,0..1,\n";
        let err = parse_sheet("Book", text).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateAttribute { .. }));
    }

    #[test]
    fn store_column_names_cannot_be_declared() {
        for reserved in ["_id", "_class_"] {
            let text = format!(
                "Attribute,Description,Datatype,Cardinality,Application\n{reserved},,String,0..1,\n"
            );
            let err = parse_sheet("Book", &text).unwrap_err();
            match err {
                SchemaError::ReservedAttribute { sheet, attribute } => {
                    assert_eq!(sheet, "Book");
                    assert_eq!(attribute, reserved);
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }
}
