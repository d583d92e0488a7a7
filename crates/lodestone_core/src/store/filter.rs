//! Schema-aware filter expressions.
//!
//! # Responsibility
//! - Build equality, case-insensitive contains and OR predicates over one
//!   entity type.
//! - Compile predicates into SQL `WHERE` fragments with bound parameters.
//!
//! # Invariants
//! - Builders never mutate the receiver; each returns a new expression.
//! - Chained builder calls combine with AND.
//! - `equals` on a list attribute matches the whole quoted JSON element
//!   inside the encoded column, which can false-positive on elements that
//!   contain the quoted token.

use super::codec::encode;
use super::layout::{quote_ident, ColumnEncoding};
use super::{StoreError, StoreResult};
use crate::db::FOLD_CASE_FUNCTION;
use crate::model::{EntityError, Value};
use crate::schema::{AttributeDefinition, SchemaCatalog};
use rusqlite::types::Value as SqlValue;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
enum Criterion {
    Equals { column: String, value: SqlValue },
    IsNull { column: String },
    ListContains { column: String, needle: String },
    ContainsIgnoreCase { column: String, needle: String },
    Or(Vec<Option<Criterion>>),
    And(Vec<Criterion>),
}

impl Criterion {
    fn compile(&self, sql: &mut String, binds: &mut Vec<SqlValue>) {
        match self {
            Self::Equals { column, value } => {
                binds.push(value.clone());
                sql.push_str(&format!("{} = ?{}", quote_ident(column), binds.len()));
            }
            Self::IsNull { column } => {
                sql.push_str(&format!("{} IS NULL", quote_ident(column)));
            }
            Self::ListContains { column, needle } => {
                binds.push(SqlValue::Text(needle.clone()));
                sql.push_str(&format!("instr({}, ?{}) > 0", quote_ident(column), binds.len()));
            }
            Self::ContainsIgnoreCase { column, needle } => {
                binds.push(SqlValue::Text(needle.clone()));
                sql.push_str(&format!(
                    "instr({FOLD_CASE_FUNCTION}(CAST({} AS TEXT)), ?{}) > 0",
                    quote_ident(column),
                    binds.len()
                ));
            }
            Self::Or(branches) => {
                if branches.is_empty() {
                    sql.push('0');
                    return;
                }
                sql.push('(');
                for (index, branch) in branches.iter().enumerate() {
                    if index > 0 {
                        sql.push_str(" OR ");
                    }
                    match branch {
                        Some(criterion) => criterion.compile(sql, binds),
                        None => sql.push('1'),
                    }
                }
                sql.push(')');
            }
            Self::And(parts) => {
                sql.push('(');
                for (index, part) in parts.iter().enumerate() {
                    if index > 0 {
                        sql.push_str(" AND ");
                    }
                    part.compile(sql, binds);
                }
                sql.push(')');
            }
        }
    }
}

/// Predicate bound to one entity type.
///
/// An expression without criteria matches every row of its type.
#[derive(Debug, Clone)]
pub struct Filter {
    entity_type: String,
    catalog: Arc<SchemaCatalog>,
    criterion: Option<Criterion>,
}

impl Filter {
    pub(crate) fn new(entity_type: &str, catalog: Arc<SchemaCatalog>) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            catalog,
            criterion: None,
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Whether this expression restricts rows at all.
    pub fn is_unrestricted(&self) -> bool {
        self.criterion.is_none()
    }

    /// Equality on a scalar attribute, element containment on a list attribute.
    pub fn equals(&self, attribute: &str, value: impl Into<Value>) -> StoreResult<Self> {
        let value = value.into();
        let definition = self.definition(attribute)?;
        let column = attribute.to_string();

        let criterion = if definition.is_sequence() {
            Criterion::ListContains {
                column,
                needle: value.to_json().to_string(),
            }
        } else if value.is_null() {
            Criterion::IsNull { column }
        } else {
            let encoding = ColumnEncoding::for_attribute(definition);
            let encoded = encode(encoding, &value).map_err(|value| {
                StoreError::InvalidFilterValue {
                    entity_type: self.entity_type.clone(),
                    attribute: attribute.to_string(),
                    value,
                }
            })?;
            Criterion::Equals {
                column,
                value: encoded,
            }
        };
        Ok(self.and(criterion))
    }

    /// Case-insensitive substring match on the stored representation.
    ///
    /// Both sides are folded with Unicode lowercase rules, so `"Ä"` matches
    /// `"ä"`.
    pub fn contains_ignore_case(&self, attribute: &str, needle: &str) -> StoreResult<Self> {
        self.definition(attribute)?;
        Ok(self.and(Criterion::ContainsIgnoreCase {
            column: attribute.to_string(),
            needle: needle.to_lowercase(),
        }))
    }

    /// Disjunction of `branches`, ANDed with this expression's criteria.
    ///
    /// # Errors
    /// - `MixedFilterTypes` when a branch is bound to another entity type.
    pub fn or(&self, branches: &[Filter]) -> StoreResult<Self> {
        let mut compiled = Vec::with_capacity(branches.len());
        for branch in branches {
            ensure_same_type(&self.entity_type, branch)?;
            compiled.push(branch.criterion.clone());
        }
        Ok(self.and(Criterion::Or(compiled)))
    }

    /// Appends this expression's `WHERE` fragment, or nothing if unrestricted.
    pub(crate) fn compile(&self, sql: &mut String, binds: &mut Vec<SqlValue>) -> bool {
        match &self.criterion {
            Some(criterion) => {
                criterion.compile(sql, binds);
                true
            }
            None => false,
        }
    }

    fn and(&self, criterion: Criterion) -> Self {
        let combined = match self.criterion.clone() {
            None => criterion,
            Some(Criterion::And(mut parts)) => {
                parts.push(criterion);
                Criterion::And(parts)
            }
            Some(existing) => Criterion::And(vec![existing, criterion]),
        };
        Self {
            entity_type: self.entity_type.clone(),
            catalog: Arc::clone(&self.catalog),
            criterion: Some(combined),
        }
    }

    fn definition(&self, attribute: &str) -> StoreResult<&AttributeDefinition> {
        self.catalog
            .attribute(&self.entity_type, attribute)
            .ok_or_else(|| {
                StoreError::Entity(EntityError::UnknownAttribute {
                    entity_type: self.entity_type.clone(),
                    attribute: attribute.to_string(),
                })
            })
    }
}

pub(crate) fn ensure_same_type(expected: &str, filter: &Filter) -> StoreResult<()> {
    if filter.entity_type == expected {
        Ok(())
    } else {
        Err(StoreError::MixedFilterTypes {
            expected: expected.to_string(),
            found: filter.entity_type.clone(),
        })
    }
}

/// Builds `WHERE` text and binds for a non-empty set of same-type filters.
pub(crate) fn where_clause(filters: &[Filter]) -> StoreResult<(String, Vec<SqlValue>)> {
    let first = filters.first().ok_or(StoreError::EmptyFilterSet)?;
    let mut fragments = Vec::new();
    let mut binds = Vec::new();
    for filter in filters {
        ensure_same_type(&first.entity_type, filter)?;
        let mut fragment = String::new();
        if filter.compile(&mut fragment, &mut binds) {
            fragments.push(fragment);
        }
    }

    if fragments.is_empty() {
        Ok((String::new(), binds))
    } else {
        Ok((format!(" WHERE {}", fragments.join(" AND ")), binds))
    }
}
