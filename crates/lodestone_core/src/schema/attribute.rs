//! Attribute-level schema vocabulary.
//!
//! # Responsibility
//! - Describe one declared attribute: datatype, cardinality, enum values and
//!   scope tag.
//! - Parse the short cardinality codes and datatype cells of schema sheets.
//!
//! # Invariants
//! - Definitions are immutable once the catalog is loaded.
//! - `enum(...)` datatypes are normalized to `String` plus `allowed_values`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

static CARDINALITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<min>[01])(?:\.\.)?(?P<max>[1-9]|\*)$").expect("cardinality regex is valid")
});

static ENUM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^enum\((?P<values>.*)\)$").expect("enum regex is valid"));

/// Mandatory/optional x scalar/list classification of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    MandatoryScalar,
    OptionalScalar,
    MandatoryList,
    OptionalList,
}

impl Cardinality {
    /// Parses a cardinality code such as `0..1`, `1..1`, `0..*` or `1..*`.
    ///
    /// Returns `None` for any other form.
    pub fn parse(code: &str) -> Option<Self> {
        let captures = CARDINALITY_RE.captures(code.trim())?;
        let mandatory = &captures["min"] == "1";
        let list = &captures["max"] == "*";
        Some(match (mandatory, list) {
            (true, false) => Self::MandatoryScalar,
            (false, false) => Self::OptionalScalar,
            (true, true) => Self::MandatoryList,
            (false, true) => Self::OptionalList,
        })
    }

    pub fn is_list(self) -> bool {
        matches!(self, Self::MandatoryList | Self::OptionalList)
    }

    pub fn is_mandatory(self) -> bool {
        matches!(self, Self::MandatoryScalar | Self::MandatoryList)
    }
}

impl Display for Cardinality {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            Self::MandatoryScalar => "1..1",
            Self::OptionalScalar => "0..1",
            Self::MandatoryList => "1..*",
            Self::OptionalList => "0..*",
        };
        f.write_str(code)
    }
}

/// Declared datatype of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Datatype {
    String,
    Integer,
    Float,
    Boolean,
    Url,
    Enum,
    /// Any datatype cell starting with `Pair`; validated like a list.
    Pair(String),
    /// Name of another entity type declared in the same catalog.
    Entity(String),
    /// Blank datatype cell; values are not type-checked.
    Any,
}

impl Datatype {
    /// Name used in diagnostics and strict representation checks.
    pub fn name(&self) -> &str {
        match self {
            Self::String => "String",
            Self::Integer => "Integer",
            Self::Float => "Float",
            Self::Boolean => "Boolean",
            Self::Url => "URL",
            Self::Enum => "Enum",
            Self::Pair(name) | Self::Entity(name) => name.as_str(),
            Self::Any => "",
        }
    }

    /// Whether values of this type are stored as embedded JSON text.
    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Pair(_) | Self::Entity(_))
    }

    fn from_cell(cell: &str) -> Self {
        match cell {
            "" => Self::Any,
            "String" => Self::String,
            "Integer" => Self::Integer,
            "Float" => Self::Float,
            "Boolean" => Self::Boolean,
            "URL" => Self::Url,
            "Enum" => Self::Enum,
            other if other.starts_with("Pair") => Self::Pair(other.to_string()),
            other => Self::Entity(other.to_string()),
        }
    }
}

impl Display for Datatype {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One declared attribute of an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeDefinition {
    pub name: String,
    pub datatype: Datatype,
    pub cardinality: Cardinality,
    /// Present only for `enum(...)` datatypes.
    pub allowed_values: Option<BTreeSet<String>>,
    /// Consuming application this attribute belongs to; `None` means all.
    pub scope: Option<String>,
}

impl AttributeDefinition {
    pub fn is_list(&self) -> bool {
        self.cardinality.is_list()
    }

    pub fn is_mandatory(&self) -> bool {
        self.cardinality.is_mandatory()
    }

    /// List attributes and pair attributes share the sequence representation.
    pub fn is_sequence(&self) -> bool {
        self.is_list() || matches!(self.datatype, Datatype::Pair(_))
    }

    /// Whether the attribute is visible to the given scope.
    pub fn in_scope(&self, scope: &str) -> bool {
        self.scope.as_deref().map_or(true, |own| own == scope)
    }
}

/// Splits a datatype cell into its base type and optional enum values.
///
/// Returns `None` when the cell uses the `enum(...)` form without any value.
pub(crate) fn parse_datatype_cell(cell: &str) -> Option<(Datatype, Option<BTreeSet<String>>)> {
    let trimmed = cell.trim();
    let Some(captures) = ENUM_RE.captures(trimmed) else {
        return Some((Datatype::from_cell(trimmed), None));
    };

    let values = captures["values"]
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>();
    if values.is_empty() {
        return None;
    }
    Some((Datatype::String, Some(values)))
}

#[cfg(test)]
mod tests {
    use super::{parse_datatype_cell, Cardinality, Datatype};

    #[test]
    fn cardinality_codes_map_to_variants() {
        assert_eq!(Cardinality::parse("1..1"), Some(Cardinality::MandatoryScalar));
        assert_eq!(Cardinality::parse("0..1"), Some(Cardinality::OptionalScalar));
        assert_eq!(Cardinality::parse("1..*"), Some(Cardinality::MandatoryList));
        assert_eq!(Cardinality::parse(" 0..* "), Some(Cardinality::OptionalList));
        assert_eq!(Cardinality::parse("0*"), Some(Cardinality::OptionalList));
    }

    #[test]
    fn cardinality_rejects_other_forms() {
        for code in ["", "2..1", "1..", "many", "0..n", "1...*"] {
            assert_eq!(Cardinality::parse(code), None, "code `{code}` should be rejected");
        }
    }

    #[test]
    fn enum_cell_is_rewritten_to_string_with_values() {
        let (datatype, values) = parse_datatype_cell("enum(draft, published)").unwrap();
        assert_eq!(datatype, Datatype::String);
        let values = values.unwrap();
        assert!(values.contains("draft"));
        assert!(values.contains("published"));
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn empty_enum_is_rejected() {
        assert!(parse_datatype_cell("enum()").is_none());
    }

    #[test]
    fn pair_and_entity_names_are_classified() {
        assert_eq!(
            parse_datatype_cell("PairOfString").unwrap().0,
            Datatype::Pair("PairOfString".to_string())
        );
        assert_eq!(
            parse_datatype_cell("Companion").unwrap().0,
            Datatype::Entity("Companion".to_string())
        );
        assert_eq!(parse_datatype_cell("").unwrap().0, Datatype::Any);
    }
}
