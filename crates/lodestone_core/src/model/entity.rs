//! Schema-validated dynamic entity.
//!
//! # Responsibility
//! - Hold the attribute bag of one instance of a named entity type.
//! - Mediate every attribute read and write through the schema catalog.
//!
//! # Invariants
//! - Every non-tag attribute key exists in the type's schema.
//! - Mandatory scalars never hold null; list attributes never read as null.
//! - Encoded list/nested values are decoded on first read and cached in place.
//! - The `_class_` tag is written once by [`Entity::new`] and is exempt from
//!   schema membership checks.

use super::value::Value;
use crate::schema::{AttributeDefinition, Datatype, SchemaCatalog};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use uuid::Uuid;

/// Implicit attribute holding the concrete type name.
pub const TYPE_TAG: &str = "_class_";

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i:https?|ftp|file|mailto|jar):\S+$").expect("valid url regex")
});

/// Internal storage identity assigned on first persist.
pub type EntityId = Uuid;

/// Attribute name -> stored value, as held by entities and storage rows.
pub type RawAttributes = BTreeMap<String, Value>;

pub type EntityResult<T> = Result<T, EntityError>;

/// Reason a value was rejected by the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    MandatoryMissing,
    EmptyMandatoryList,
    ExpectedList { found: String },
    UnexpectedList,
    TypeMismatch { expected: String, found: String },
    NotCastable { expected: String },
    DisallowedValue { allowed: Vec<String> },
}

impl Display for Violation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MandatoryMissing => write!(f, "mandatory attribute has no value"),
            Self::EmptyMandatoryList => write!(f, "mandatory list has zero elements"),
            Self::ExpectedList { found } => {
                write!(f, "invalid attribute type `{found}`, expected a list")
            }
            Self::UnexpectedList => write!(f, "scalar attribute cannot hold a list"),
            Self::TypeMismatch { expected, found } => {
                write!(f, "invalid attribute type `{found}`, expected type was `{expected}`")
            }
            Self::NotCastable { expected } => write!(f, "value cannot be cast to `{expected}`"),
            Self::DisallowedValue { allowed } => {
                write!(f, "value is not one of [{}]", allowed.join(", "))
            }
        }
    }
}

/// Entity access or validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityError {
    UnknownEntityType(String),
    UnknownAttribute {
        entity_type: String,
        attribute: String,
    },
    Validation {
        entity_type: String,
        attribute: String,
        value: String,
        violation: Violation,
    },
    NotAList {
        entity_type: String,
        attribute: String,
    },
    IndexOutOfBounds {
        entity_type: String,
        attribute: String,
        index: usize,
        len: usize,
    },
    Decode {
        entity_type: String,
        attribute: String,
        value: String,
        message: String,
    },
}

impl Display for EntityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownEntityType(name) => {
                write!(f, "schema definition not found for type `{name}`")
            }
            Self::UnknownAttribute {
                entity_type,
                attribute,
            } => write!(
                f,
                "no attribute definition found for attribute `{attribute}` in type `{entity_type}`"
            ),
            Self::Validation {
                entity_type,
                attribute,
                value,
                violation,
            } => write!(
                f,
                "validation failed for attribute `{attribute}`, value `{value}` in type `{entity_type}`: {violation}"
            ),
            Self::NotAList {
                entity_type,
                attribute,
            } => write!(
                f,
                "`{attribute}` in type `{entity_type}` is no list type; elements cannot be indexed"
            ),
            Self::IndexOutOfBounds {
                entity_type,
                attribute,
                index,
                len,
            } => write!(
                f,
                "index {index} out of bounds for `{attribute}` in type `{entity_type}` (len {len})"
            ),
            Self::Decode {
                entity_type,
                attribute,
                value,
                message,
            } => write!(
                f,
                "cannot decode stored value `{value}` of `{attribute}` in type `{entity_type}`: {message}"
            ),
        }
    }
}

impl Error for EntityError {}

/// One instance of a schema-declared entity type.
#[derive(Clone)]
pub struct Entity {
    type_name: String,
    id: Option<EntityId>,
    catalog: Arc<SchemaCatalog>,
    attributes: RawAttributes,
}

impl Entity {
    /// Creates an empty entity and writes its type tag.
    ///
    /// # Errors
    /// - `UnknownEntityType` when the catalog has no such type.
    pub fn new(catalog: &Arc<SchemaCatalog>, type_name: &str) -> EntityResult<Self> {
        ensure_known_type(catalog, type_name)?;
        let mut attributes = RawAttributes::new();
        attributes.insert(TYPE_TAG.to_string(), Value::Text(type_name.to_string()));
        Ok(Self::restore(Arc::clone(catalog), type_name, None, attributes))
    }

    /// Reconstructs an entity from a raw attribute map without re-tagging.
    ///
    /// Values are not validated here; encoded lists stay encoded until read.
    pub fn from_raw(
        catalog: &Arc<SchemaCatalog>,
        type_name: &str,
        id: Option<EntityId>,
        attributes: RawAttributes,
    ) -> EntityResult<Self> {
        ensure_known_type(catalog, type_name)?;
        Ok(Self::restore(Arc::clone(catalog), type_name, id, attributes))
    }

    /// Unchecked raw-map constructor used by entity factories.
    ///
    /// Callers guarantee `type_name` exists in `catalog`.
    pub fn restore(
        catalog: Arc<SchemaCatalog>,
        type_name: &str,
        id: Option<EntityId>,
        attributes: RawAttributes,
    ) -> Self {
        Self {
            type_name: type_name.to_string(),
            id,
            catalog,
            attributes,
        }
    }

    /// Joins identifier fragments into one deterministic identifier.
    pub fn compose_id(parts: &[&str]) -> String {
        parts.join("_")
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn id(&self) -> Option<EntityId> {
        self.id
    }

    pub(crate) fn assign_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }

    pub fn catalog(&self) -> &Arc<SchemaCatalog> {
        &self.catalog
    }

    /// Validates and stores `value`, returning the previous value.
    pub fn set(
        &mut self,
        attribute: &str,
        value: impl Into<Value>,
    ) -> EntityResult<Option<Value>> {
        let value = value.into();
        self.check(attribute, &value)?;
        Ok(self.attributes.insert(attribute.to_string(), value))
    }

    /// Stores `value` without validation, returning the previous value.
    pub fn set_unchecked(&mut self, attribute: &str, value: impl Into<Value>) -> Option<Value> {
        self.attributes.insert(attribute.to_string(), value.into())
    }

    /// Validated read of one attribute.
    ///
    /// Encoded list and nested-entity values are decoded and cached in place
    /// on first read. Absent list attributes read as an empty list.
    pub fn get(&mut self, attribute: &str) -> EntityResult<Value> {
        if attribute == TYPE_TAG {
            return Ok(Value::Text(self.type_name.clone()));
        }

        let catalog = Arc::clone(&self.catalog);
        let definition = self.definition_in(&catalog, attribute)?;
        self.normalize(&catalog, definition)?;

        let value = self
            .attributes
            .get(attribute)
            .cloned()
            .unwrap_or(Value::Null);
        check_value(definition, &value).map_err(|violation| self.violation(attribute, &value, violation))?;

        if value.is_null() && definition.is_sequence() {
            return Ok(Value::List(Vec::new()));
        }
        Ok(value)
    }

    /// Shorthand for `get(attribute)[index]`; legal only on list attributes.
    pub fn get_index(&mut self, attribute: &str, index: usize) -> EntityResult<Value> {
        let catalog = Arc::clone(&self.catalog);
        let definition = self.definition_in(&catalog, attribute)?;
        if !definition.is_sequence() {
            return Err(EntityError::NotAList {
                entity_type: self.type_name.clone(),
                attribute: attribute.to_string(),
            });
        }

        let items = self.get(attribute)?.into_list().unwrap_or_default();
        let len = items.len();
        items
            .into_iter()
            .nth(index)
            .ok_or_else(|| EntityError::IndexOutOfBounds {
                entity_type: self.type_name.clone(),
                attribute: attribute.to_string(),
                index,
                len,
            })
    }

    /// Validated read of every schema-declared attribute.
    ///
    /// Also rejects stored keys that the schema does not declare.
    pub fn validate(&mut self) -> EntityResult<()> {
        let catalog = Arc::clone(&self.catalog);
        let schema = catalog
            .entity_type(&self.type_name)
            .ok_or_else(|| EntityError::UnknownEntityType(self.type_name.clone()))?;

        if let Some(unknown) = self
            .attributes
            .keys()
            .find(|key| key.as_str() != TYPE_TAG && schema.attribute(key).is_none())
        {
            return Err(EntityError::UnknownAttribute {
                entity_type: self.type_name.clone(),
                attribute: unknown.clone(),
            });
        }

        for attribute in schema.attribute_names() {
            self.get(attribute)?;
        }
        Ok(())
    }

    /// Non-failing pre-check of a candidate value.
    pub fn is_valid(&self, attribute: &str, value: &Value) -> bool {
        self.check(attribute, value).is_ok()
    }

    /// Stored representation without validation or decoding.
    pub fn raw(&self, attribute: &str) -> Option<&Value> {
        self.attributes.get(attribute)
    }

    /// Iterates stored attributes, including the type tag.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attributes
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn into_attributes(self) -> RawAttributes {
        self.attributes
    }

    /// JSON object form used to embed this entity into a parent column.
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        for (name, value) in &self.attributes {
            let json = match value {
                Value::Text(encoded) if self.is_embedded(name) => {
                    serde_json::from_str(encoded).unwrap_or_else(|_| value.to_json())
                }
                _ => value.to_json(),
            };
            object.insert(name.clone(), json);
        }
        object
            .entry(TYPE_TAG.to_string())
            .or_insert_with(|| serde_json::Value::String(self.type_name.clone()));
        serde_json::Value::Object(object)
    }

    fn is_embedded(&self, attribute: &str) -> bool {
        self.catalog
            .attribute(&self.type_name, attribute)
            .is_some_and(|definition| {
                definition.is_sequence() || definition.datatype.is_composite()
            })
    }

    fn check(&self, attribute: &str, value: &Value) -> EntityResult<()> {
        if attribute == TYPE_TAG {
            return match value {
                Value::Text(tag) if *tag == self.type_name => Ok(()),
                other => Err(self.violation(
                    attribute,
                    other,
                    Violation::TypeMismatch {
                        expected: self.type_name.clone(),
                        found: other.to_string(),
                    },
                )),
            };
        }

        let definition = self.definition_in(&self.catalog, attribute)?;
        check_value(definition, value).map_err(|violation| self.violation(attribute, value, violation))
    }

    fn definition_in<'c>(
        &self,
        catalog: &'c SchemaCatalog,
        attribute: &str,
    ) -> EntityResult<&'c AttributeDefinition> {
        catalog
            .attribute(&self.type_name, attribute)
            .ok_or_else(|| EntityError::UnknownAttribute {
                entity_type: self.type_name.clone(),
                attribute: attribute.to_string(),
            })
    }

    fn normalize(
        &mut self,
        catalog: &Arc<SchemaCatalog>,
        definition: &AttributeDefinition,
    ) -> EntityResult<()> {
        let Some(Value::Text(encoded)) = self.attributes.get(&definition.name) else {
            return Ok(());
        };

        let nested_type = match &definition.datatype {
            Datatype::Entity(target) => Some(target.as_str()),
            _ => None,
        };
        let decoded = if definition.is_sequence() {
            decode_sequence(catalog, encoded, nested_type)
        } else if let Some(target) = nested_type {
            decode_entity(catalog, encoded, target)
        } else {
            return Ok(());
        };

        let decoded = decoded.map_err(|message| EntityError::Decode {
            entity_type: self.type_name.clone(),
            attribute: definition.name.clone(),
            value: encoded.clone(),
            message,
        })?;
        self.attributes.insert(definition.name.clone(), decoded);
        Ok(())
    }

    fn violation(&self, attribute: &str, value: &Value, violation: Violation) -> EntityError {
        EntityError::Validation {
            entity_type: self.type_name.clone(),
            attribute: attribute.to_string(),
            value: value.to_string(),
            violation,
        }
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name && self.attributes == other.attributes
    }
}

impl Debug for Entity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("type_name", &self.type_name)
            .field("id", &self.id)
            .field("attributes", &self.attributes)
            .finish()
    }
}

fn ensure_known_type(catalog: &SchemaCatalog, type_name: &str) -> EntityResult<()> {
    if catalog.contains(type_name) {
        Ok(())
    } else {
        Err(EntityError::UnknownEntityType(type_name.to_string()))
    }
}

fn decode_sequence(
    catalog: &Arc<SchemaCatalog>,
    encoded: &str,
    nested_type: Option<&str>,
) -> Result<Value, String> {
    if encoded.trim().is_empty() {
        return Ok(Value::List(Vec::new()));
    }
    let json: serde_json::Value = serde_json::from_str(encoded).map_err(|err| err.to_string())?;
    if !json.is_array() {
        return Err("expected a JSON array".to_string());
    }
    Value::from_json(catalog, &json, nested_type)
}

fn decode_entity(
    catalog: &Arc<SchemaCatalog>,
    encoded: &str,
    target: &str,
) -> Result<Value, String> {
    let json: serde_json::Value = serde_json::from_str(encoded).map_err(|err| err.to_string())?;
    if !json.is_object() {
        return Err("expected a JSON object".to_string());
    }
    Value::from_json(catalog, &json, Some(target))
}

fn check_value(definition: &AttributeDefinition, value: &Value) -> Result<(), Violation> {
    if value.is_null() {
        return if definition.is_mandatory() {
            Err(Violation::MandatoryMissing)
        } else {
            Ok(())
        };
    }

    if definition.is_sequence() {
        let Value::List(items) = value else {
            return Err(Violation::ExpectedList {
                found: value.repr_name().to_string(),
            });
        };
        if items.is_empty() && definition.is_mandatory() {
            return Err(Violation::EmptyMandatoryList);
        }
        if matches!(definition.datatype, Datatype::Pair(_)) {
            return Ok(());
        }
        return items
            .iter()
            .try_for_each(|item| check_scalar(definition, item));
    }

    if matches!(value, Value::List(_)) {
        return Err(Violation::UnexpectedList);
    }
    check_scalar(definition, value)
}

fn check_scalar(definition: &AttributeDefinition, value: &Value) -> Result<(), Violation> {
    check_datatype(&definition.datatype, value)?;
    if let Some(allowed) = &definition.allowed_values {
        if !is_allowed(allowed, value) {
            return Err(Violation::DisallowedValue {
                allowed: allowed.iter().cloned().collect(),
            });
        }
    }
    Ok(())
}

fn is_allowed(allowed: &BTreeSet<String>, value: &Value) -> bool {
    value.as_text().is_some_and(|text| allowed.contains(text))
}

fn check_datatype(datatype: &Datatype, value: &Value) -> Result<(), Violation> {
    // Numeric, boolean and URL types are checked by castability of the
    // value's string form; everything else by exact representation name.
    let castable = match datatype {
        Datatype::Any => return Ok(()),
        Datatype::String | Datatype::Enum => return exact_repr(value, "String"),
        Datatype::Pair(name) | Datatype::Entity(name) => return exact_repr(value, name),
        Datatype::Integer => value.cast_text().is_some_and(|text| text.parse::<i64>().is_ok()),
        Datatype::Float => value
            .cast_text()
            .is_some_and(|text| text.parse::<f64>().is_ok_and(f64::is_finite)),
        Datatype::Boolean => value
            .cast_text()
            .is_some_and(|text| text == "true" || text == "false"),
        Datatype::Url => value.cast_text().is_some_and(|text| URL_RE.is_match(&text)),
    };

    if castable {
        Ok(())
    } else {
        Err(Violation::NotCastable {
            expected: datatype.name().to_string(),
        })
    }
}

fn exact_repr(value: &Value, expected: &str) -> Result<(), Violation> {
    if value.repr_name() == expected {
        Ok(())
    } else {
        Err(Violation::TypeMismatch {
            expected: expected.to_string(),
            found: value.repr_name().to_string(),
        })
    }
}
