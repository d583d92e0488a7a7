mod common;

use lodestone_core::schema::{install, installed};
use lodestone_core::{Cardinality, Datatype, SchemaCatalog, SchemaError};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::sync::Arc;

const HEADER: &str = "Attribute,Description,Datatype,Cardinality,Application\n";

#[test]
fn workbook_directory_loads_every_schema_sheet() {
    let catalog = common::catalog();

    let types: Vec<&str> = catalog.entity_types().collect();
    assert_eq!(types, vec!["Companion", "Record", "Strict"]);
    assert!(!catalog.contains("Notes"));
}

#[test]
fn attribute_definitions_carry_datatype_and_cardinality() {
    let catalog = common::catalog();

    let tags = catalog.attribute("Record", "tags").unwrap();
    assert_eq!(tags.datatype, Datatype::String);
    assert_eq!(tags.cardinality, Cardinality::OptionalList);

    let companion = catalog.attribute("Record", "companion").unwrap();
    assert_eq!(companion.datatype, Datatype::Entity("Companion".to_string()));
    assert!(!companion.is_sequence());

    let range = catalog.attribute("Record", "range").unwrap();
    assert_eq!(range.datatype, Datatype::Pair("PairOfInteger".to_string()));
    assert!(range.is_sequence());

    let title = catalog.attribute("Strict", "title").unwrap();
    assert_eq!(title.cardinality, Cardinality::MandatoryScalar);
}

#[test]
fn enum_datatype_becomes_string_with_allowed_values() {
    let catalog = common::catalog();

    let status = catalog.attribute("Record", "status").unwrap();
    assert_eq!(status.datatype, Datatype::String);
    let expected: BTreeSet<String> = ["archived", "draft", "published"]
        .into_iter()
        .map(str::to_string)
        .collect();
    assert_eq!(status.allowed_values.as_ref(), Some(&expected));
}

#[test]
fn scope_filter_keeps_shared_and_matching_attributes() {
    let catalog = common::catalog();
    let record = catalog.require("Record").unwrap();

    let museum: Vec<&str> = record
        .attributes_for_scope("museum")
        .map(|definition| definition.name.as_str())
        .collect();
    assert!(museum.contains(&"status"));
    assert!(!museum.contains(&"genres"));
    assert!(museum.contains(&"string"));
    assert_eq!(museum.len(), record.len() - 1);
}

#[test]
fn missing_source_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let err = SchemaCatalog::load(dir.path().join("absent")).unwrap_err();
    assert!(matches!(err, SchemaError::MissingSource(_)));
}

#[test]
fn single_sheet_file_is_accepted() {
    let catalog = SchemaCatalog::load(common::schema_dir().join("Strict.csv")).unwrap();
    assert_eq!(catalog.entity_types().collect::<Vec<_>>(), vec!["Strict"]);
}

#[test]
fn malformed_cardinality_is_fatal() {
    let sheet = format!("{HEADER}title,,String,2..*,\n");
    let err = SchemaCatalog::from_sheets([("Book", sheet)]).unwrap_err();
    match err {
        SchemaError::MalformedCardinality {
            sheet,
            attribute,
            value,
        } => {
            assert_eq!(sheet, "Book");
            assert_eq!(attribute, "title");
            assert_eq!(value, "2..*");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn blank_cardinality_is_fatal() {
    let sheet = format!("{HEADER}title,,String,,\n");
    let err = SchemaCatalog::from_sheets([("Book", sheet)]).unwrap_err();
    assert!(matches!(err, SchemaError::MalformedCardinality { .. }));
}

#[test]
fn identity_column_name_is_reserved() {
    let sheet = format!("{HEADER}_id,,String,0..1,\n");
    let err = SchemaCatalog::from_sheets([("Book", sheet)]).unwrap_err();
    assert!(matches!(
        err,
        SchemaError::ReservedAttribute { ref attribute, .. } if attribute == "_id"
    ));
}

#[test]
fn unknown_nested_type_is_fatal() {
    let sheet = format!("{HEADER}author,,Person,0..1,\n");
    let err = SchemaCatalog::from_sheets([("Book", sheet)]).unwrap_err();
    assert!(matches!(
        err,
        SchemaError::UnresolvedDatatype { ref datatype, .. } if datatype == "Person"
    ));
}

#[test]
fn empty_enum_is_fatal() {
    let sheet = format!("{HEADER}kind,,enum(),0..1,\n");
    let err = SchemaCatalog::from_sheets([("Book", sheet)]).unwrap_err();
    assert!(matches!(err, SchemaError::MalformedDatatype { .. }));
}

#[test]
fn unknown_type_lookup_is_a_configuration_error() {
    let catalog = common::catalog();
    assert!(matches!(
        catalog.require("Missing"),
        Err(SchemaError::UnknownEntityType(_))
    ));
}

#[test]
fn catalog_installs_once_per_process() {
    let shared = install(SchemaCatalog::load(common::schema_dir()).unwrap()).unwrap();
    assert!(Arc::ptr_eq(&shared, &installed().unwrap()));

    let err = install(SchemaCatalog::default()).unwrap_err();
    assert!(matches!(err, SchemaError::AlreadyInstalled));
}

#[test]
fn catalog_exports_definitions_as_json() {
    let exported = common::catalog().export_json().unwrap();
    let json: serde_json::Value = serde_json::from_str(&exported).unwrap();

    let record = &json["Record"]["attributes"];
    assert_eq!(record["count"]["cardinality"], "optional_scalar");
    assert_eq!(record["count"]["datatype"]["kind"], "integer");
    assert_eq!(record["companions"]["datatype"]["name"], "Companion");
    assert_eq!(
        record["status"]["allowed_values"],
        serde_json::json!(["archived", "draft", "published"])
    );
    assert_eq!(record["status"]["scope"], "museum");
    assert!(json["Notes"].is_null());
}
