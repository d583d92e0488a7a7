//! Dynamic attribute values.
//!
//! # Responsibility
//! - Represent every value an entity attribute can hold.
//! - Convert values to and from their embedded JSON encoding.
//!
//! # Invariants
//! - `repr_name` is the strict representation name used by schema checks.
//! - Nested entity JSON objects always carry the `_class_` tag.

use super::entity::{Entity, RawAttributes, TYPE_TAG};
use crate::schema::SchemaCatalog;
use serde_json::{Map, Number};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// One attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    List(Vec<Value>),
    Entity(Box<Entity>),
}

impl Value {
    /// Representation name compared against declared datatypes.
    pub fn repr_name(&self) -> &str {
        match self {
            Self::Null => "Null",
            Self::Text(_) => "String",
            Self::Integer(_) => "Integer",
            Self::Float(_) => "Float",
            Self::Boolean(_) => "Boolean",
            Self::List(_) => "List",
            Self::Entity(entity) => entity.type_name(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the numeric value; integers widen to `f64`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Self::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn into_list(self) -> Option<Vec<Value>> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn into_entity(self) -> Option<Entity> {
        match self {
            Self::Entity(entity) => Some(*entity),
            _ => None,
        }
    }

    /// String form used by castability checks of scalar datatypes.
    ///
    /// Returns `None` for null, list and entity values.
    pub fn cast_text(&self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text.clone()),
            Self::Integer(value) => Some(value.to_string()),
            Self::Float(value) => Some(value.to_string()),
            Self::Boolean(value) => Some(value.to_string()),
            Self::Null | Self::List(_) | Self::Entity(_) => None,
        }
    }

    /// Embedded JSON form of this value.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Text(text) => serde_json::Value::String(text.clone()),
            Self::Integer(value) => serde_json::Value::Number(Number::from(*value)),
            Self::Float(value) => Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Boolean(value) => serde_json::Value::Bool(*value),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Self::Entity(entity) => entity.to_json(),
        }
    }

    /// Rebuilds a value from its embedded JSON form.
    ///
    /// Objects become nested entities; their type comes from the `_class_`
    /// tag, or `fallback_type` when the tag is absent.
    pub fn from_json(
        catalog: &Arc<SchemaCatalog>,
        json: &serde_json::Value,
        fallback_type: Option<&str>,
    ) -> Result<Self, String> {
        Ok(match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(value) => Self::Boolean(*value),
            serde_json::Value::Number(number) => match number.as_i64() {
                Some(value) => Self::Integer(value),
                None => Self::Float(number.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(text) => Self::Text(text.clone()),
            serde_json::Value::Array(items) => Self::List(
                items
                    .iter()
                    .map(|item| Self::from_json(catalog, item, fallback_type))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            serde_json::Value::Object(object) => {
                Self::Entity(Box::new(entity_from_object(catalog, object, fallback_type)?))
            }
        })
    }
}

fn entity_from_object(
    catalog: &Arc<SchemaCatalog>,
    object: &Map<String, serde_json::Value>,
    fallback_type: Option<&str>,
) -> Result<Entity, String> {
    let type_name = match object.get(TYPE_TAG) {
        Some(serde_json::Value::String(name)) => name.as_str(),
        Some(other) => return Err(format!("type tag must be a string, found `{other}`")),
        None => fallback_type.ok_or_else(|| "nested object has no type tag".to_string())?,
    };
    if !catalog.contains(type_name) {
        return Err(format!("nested object has unknown type `{type_name}`"));
    }

    let mut attributes = RawAttributes::new();
    for (key, json) in object {
        // Nested attributes of nested entities resolve their own type tags.
        let value = if key == TYPE_TAG {
            Value::Text(type_name.to_string())
        } else {
            Value::from_json(catalog, json, None)?
        };
        attributes.insert(key.clone(), value);
    }
    attributes
        .entry(TYPE_TAG.to_string())
        .or_insert_with(|| Value::Text(type_name.to_string()));

    Ok(Entity::restore(
        Arc::clone(catalog),
        type_name,
        None,
        attributes,
    ))
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Text(text) => f.write_str(text),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Boolean(value) => write!(f, "{value}"),
            Self::List(_) | Self::Entity(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<Entity> for Value {
    fn from(value: Entity) -> Self {
        Self::Entity(Box::new(value))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::Value;

    #[test]
    fn cast_text_uses_display_form() {
        assert_eq!(Value::from(3).cast_text().as_deref(), Some("3"));
        assert_eq!(Value::from(1.0_f64).cast_text().as_deref(), Some("1"));
        assert_eq!(Value::from(true).cast_text().as_deref(), Some("true"));
        assert_eq!(Value::from(vec!["a"]).cast_text(), None);
        assert_eq!(Value::Null.cast_text(), None);
    }

    #[test]
    fn list_json_keeps_order_and_quoting() {
        let value = Value::from(vec!["alpha", "beta"]);
        assert_eq!(value.to_json().to_string(), r#"["alpha","beta"]"#);
    }

    #[test]
    fn option_maps_none_to_null() {
        assert!(Value::from(None::<String>).is_null());
        assert_eq!(Value::from(Some("x")), Value::Text("x".to_string()));
    }
}
