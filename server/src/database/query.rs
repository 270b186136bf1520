//! Generic document query builder
//!
//! A query is a list of field conditions, an optional ordering and an
//! optional limit. Backends without native query support evaluate it
//! in-process with [`Query::apply`].

use super::store::Document;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Field is an array containing the value
    ArrayContains,
    /// Value is an array containing the field
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: Op,
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub conditions: Vec<Condition>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: &str, op: Op, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition {
            field: field.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions.iter().all(|c| c.matches(doc))
    }

    /// Filter, order and truncate documents already in insertion order.
    pub fn apply(&self, docs: Vec<Document>) -> Vec<Document> {
        let mut selected: Vec<Document> = docs.into_iter().filter(|d| self.matches(d)).collect();

        if let Some((field, direction)) = &self.order_by {
            // Stable sort keeps insertion order between equal keys
            selected.sort_by(|a, b| {
                let ord = compare_fields(a.get(field), b.get(field));
                match direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        }

        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }

        selected
    }
}

impl Condition {
    fn matches(&self, doc: &Document) -> bool {
        let field = doc.get(&self.field).unwrap_or(&Value::Null);

        match self.op {
            Op::Eq => compare_values(field, &self.value) == Some(Ordering::Equal),
            Op::Ne => compare_values(field, &self.value) != Some(Ordering::Equal),
            Op::Lt => compare_values(field, &self.value) == Some(Ordering::Less),
            Op::Le => matches!(
                compare_values(field, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Op::Gt => compare_values(field, &self.value) == Some(Ordering::Greater),
            Op::Ge => matches!(
                compare_values(field, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Op::ArrayContains => field
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .any(|item| compare_values(item, &self.value) == Some(Ordering::Equal))
                })
                .unwrap_or(false),
            Op::In => self
                .value
                .as_array()
                .map(|options| {
                    options
                        .iter()
                        .any(|option| compare_values(field, option) == Some(Ordering::Equal))
                })
                .unwrap_or(false),
        }
    }
}

fn as_instant(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Compare two JSON values of the same kind.
///
/// Strings that both parse as RFC 3339 compare as instants, since
/// serialized timestamps vary in fractional precision. Values of
/// different kinds are incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => match (as_instant(a), as_instant(b)) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => Some(x.cmp(y)),
        },
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            (a == b).then_some(Ordering::Equal)
        }
        _ => None,
    }
}

/// Ordering used for sorting; missing or incomparable values sort first
fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
    }
}
