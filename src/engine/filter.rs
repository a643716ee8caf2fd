//! Record filtering
//!
//! Filter clauses are validated once into typed predicates and then applied
//! in order, AND-combined. A null field value never matches.

use crate::core::error::OptionsError;
use crate::engine::options::{FilterClause, FilterOperator, LimitSpec};
use crate::formats::decode::{FieldValue, VariantRecord};
use serde_json::Value;
use std::cmp::Ordering;

/// A clause target that a field value can be compared with
///
/// Decoded fields are numbers, text or text lists, so boolean targets are
/// rejected when a clause is compiled.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Number(f64),
    Text(String),
}

impl Scalar {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(Scalar::Number),
            Value::String(s) => Some(Scalar::Text(s.clone())),
            _ => None,
        }
    }

    /// Strict equality: numbers only equal numbers, text only equals text
    fn matches(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (Scalar::Number(n), FieldValue::Int(i)) => *n == *i as f64,
            (Scalar::Number(n), FieldValue::Float(f)) => n == f,
            (Scalar::Text(t), FieldValue::Str(s)) => t == s,
            _ => false,
        }
    }

    fn matches_text(&self, text: &str) -> bool {
        matches!(self, Scalar::Text(t) if t == text)
    }
}

/// A validated filter clause
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Scalar value is in the set
    IsOneOf(Vec<Scalar>),
    /// List value shares an element with the set
    HasOneOf(Vec<Scalar>),
    /// Numeric value within `[lo, hi]`
    IsBetween(f64, f64),
    /// Exact match
    IsEqual(Scalar),
}

impl Predicate {
    pub fn matches(&self, value: &FieldValue) -> bool {
        if value.is_null() {
            return false;
        }
        match self {
            Predicate::IsOneOf(set) => set.iter().any(|s| s.matches(value)),
            Predicate::HasOneOf(set) => match value {
                FieldValue::List(items) => items
                    .iter()
                    .any(|item| set.iter().any(|s| s.matches_text(item))),
                // scalars behave like a one-element list
                scalar => set.iter().any(|s| s.matches(scalar)),
            },
            Predicate::IsBetween(lo, hi) => value
                .as_f64()
                .map_or(false, |v| *lo <= v && v <= *hi),
            Predicate::IsEqual(target) => target.matches(value),
        }
    }
}

/// One compiled clause
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPredicate {
    pub field: String,
    pub predicate: Predicate,
}

impl TryFrom<&FilterClause> for FieldPredicate {
    type Error = OptionsError;

    fn try_from(clause: &FilterClause) -> Result<Self, Self::Error> {
        let invalid = |message: &str| OptionsError::InvalidTarget {
            field: clause.field.clone(),
            operator: clause.operator.as_str(),
            message: message.to_string(),
        };

        let scalar_set = |target: &Value| -> Result<Vec<Scalar>, OptionsError> {
            target
                .as_array()
                .ok_or_else(|| invalid("expected an array"))?
                .iter()
                .map(|v| Scalar::from_json(v).ok_or_else(|| invalid("expected scalar elements")))
                .collect()
        };

        let predicate = match clause.operator {
            FilterOperator::IsOneOf => Predicate::IsOneOf(scalar_set(&clause.target)?),
            FilterOperator::HasOneOf => Predicate::HasOneOf(scalar_set(&clause.target)?),
            FilterOperator::IsBetween => {
                let bounds = clause
                    .target
                    .as_array()
                    .filter(|a| a.len() == 2)
                    .ok_or_else(|| invalid("expected [min, max]"))?;
                let lo = bounds[0].as_f64().ok_or_else(|| invalid("min is not a number"))?;
                let hi = bounds[1].as_f64().ok_or_else(|| invalid("max is not a number"))?;
                Predicate::IsBetween(lo, hi)
            }
            FilterOperator::IsEqual => Predicate::IsEqual(
                Scalar::from_json(&clause.target).ok_or_else(|| invalid("expected a scalar"))?,
            ),
        };

        Ok(FieldPredicate {
            field: clause.field.clone(),
            predicate,
        })
    }
}

/// Ordered, AND-combined predicates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<FieldPredicate>,
}

impl Filter {
    pub fn compile(clauses: &[FilterClause]) -> Result<Self, OptionsError> {
        Ok(Self {
            clauses: clauses
                .iter()
                .map(FieldPredicate::try_from)
                .collect::<Result<_, _>>()?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, record: &VariantRecord) -> bool {
        self.clauses
            .iter()
            .all(|clause| clause.predicate.matches(&record.value(&clause.field)))
    }

    /// Apply each clause in turn
    pub fn apply<R: AsRef<VariantRecord>>(&self, records: Vec<R>) -> Vec<R> {
        let mut records = records;
        for clause in &self.clauses {
            records.retain(|r| clause.predicate.matches(&r.as_ref().value(&clause.field)));
        }
        records
    }
}

/// Keep the `limit.max` records with the largest `limit.field`
///
/// Records without a numeric value rank last; ties break on `(from, id)`.
pub fn apply_limit<R: AsRef<VariantRecord>>(records: Vec<R>, limit: &LimitSpec) -> Vec<R> {
    if records.len() <= limit.max {
        return records;
    }
    let mut records = records;
    records.sort_by(|a, b| {
        let (a, b) = (a.as_ref(), b.as_ref());
        let va = a.value(&limit.field).as_f64();
        let vb = b.value(&limit.field).as_f64();
        match (va, vb) {
            (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
        .then_with(|| a.from.cmp(&b.from))
        .then_with(|| a.id.cmp(&b.id))
    });
    records.truncate(limit.max);
    records
}
