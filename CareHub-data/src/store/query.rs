//! Collection queries: field filters, ordering, cursors and limits.
//!
//! Queries are evaluated against JSON documents. Field paths may be dotted to
//! reach nested values (`emergency_info.blood_type`). Comparisons only match
//! values of the same kind; a missing field never matches except for `!=`.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::timestamp::{parse_timestamp, timestamp_value};
use super::Document;
use crate::repository::RepositoryError;

/// Comparison operator used by a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// Field value is one of the listed values
    In,
    /// Field is an array containing the value
    ArrayContains,
}

/// A single field condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Dotted field path
    pub field: String,
    /// Operator
    pub op: FilterOp,
    /// Operand
    pub value: Value,
}

impl Filter {
    /// Evaluate this filter against a document body
    pub fn matches(&self, data: &Value) -> bool {
        let actual = field_value(data, &self.field);

        match self.op {
            FilterOp::Eq => actual.map_or(false, |v| values_equal(v, &self.value)),
            FilterOp::NotEq => actual.map_or(true, |v| !values_equal(v, &self.value)),
            FilterOp::Lt => ordered(actual, &self.value).map_or(false, Ordering::is_lt),
            FilterOp::Lte => ordered(actual, &self.value).map_or(false, Ordering::is_le),
            FilterOp::Gt => ordered(actual, &self.value).map_or(false, Ordering::is_gt),
            FilterOp::Gte => ordered(actual, &self.value).map_or(false, Ordering::is_ge),
            FilterOp::In => match (actual, &self.value) {
                (Some(v), Value::Array(candidates)) => candidates.iter().any(|c| values_equal(v, c)),
                _ => false,
            },
            FilterOp::ArrayContains => match actual {
                Some(Value::Array(items)) => items.iter().any(|item| values_equal(item, &self.value)),
                _ => false,
            },
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    /// Smallest first
    #[default]
    Asc,
    /// Largest first
    Desc,
}

/// A sort key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    /// Dotted field path
    pub field: String,
    /// Sort direction
    pub direction: Direction,
}

/// A query against one collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    filters: Vec<Filter>,
    order_by: Vec<OrderBy>,
    start_after: Option<String>,
    limit: Option<usize>,
}

impl Query {
    /// Create an empty query matching every document
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality filter
    pub fn where_eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.where_op(field, FilterOp::Eq, value)
    }

    /// Add a membership filter
    pub fn where_in(self, field: &str, values: Vec<Value>) -> Self {
        self.where_op(field, FilterOp::In, Value::Array(values))
    }

    /// Add a filter with an explicit operator
    pub fn where_op(mut self, field: &str, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    /// Add a date comparison filter
    pub fn where_date(self, field: &str, op: FilterOp, value: DateTime<Utc>) -> Self {
        self.where_op(field, op, timestamp_value(value))
    }

    /// Add a sort key; earlier keys take precedence
    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by.push(OrderBy {
            field: field.to_string(),
            direction,
        });
        self
    }

    /// Resume after the document with this id
    pub fn start_after(mut self, id: impl Into<String>) -> Self {
        self.start_after = Some(id.into());
        self
    }

    /// Return at most `limit` documents
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Filters of this query
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Limit of this query, if any
    pub fn get_limit(&self) -> Option<usize> {
        self.limit
    }

    /// Whether a document body satisfies every filter
    pub fn matches(&self, data: &Value) -> bool {
        self.filters.iter().all(|filter| filter.matches(data))
    }

    /// Evaluate the query over every document of a collection
    ///
    /// The cursor document is looked up in `documents` before filtering, so a
    /// cursor stays valid even when its document no longer matches the filters.
    pub fn apply(&self, documents: Vec<Document>) -> Result<Vec<Document>, RepositoryError> {
        let cursor = match &self.start_after {
            Some(id) => Some(
                documents
                    .iter()
                    .find(|doc| &doc.id == id)
                    .cloned()
                    .ok_or_else(|| RepositoryError::Validation(format!("invalid cursor: {}", id)))?,
            ),
            None => None,
        };

        let mut matched: Vec<Document> = documents
            .into_iter()
            .filter(|doc| self.matches(&doc.data))
            .collect();

        matched.sort_by(|a, b| self.compare_documents(a, b));

        if let Some(cursor) = cursor {
            matched.retain(|doc| self.compare_documents(doc, &cursor) == Ordering::Greater);
        }

        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }

        Ok(matched)
    }

    fn compare_documents(&self, a: &Document, b: &Document) -> Ordering {
        for key in &self.order_by {
            let ordering = compare_values(field_value(&a.data, &key.field), field_value(&b.data, &key.field));
            let ordering = match key.direction {
                Direction::Asc => ordering,
                Direction::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.id.cmp(&b.id)
    }
}

/// Resolve a dotted path inside a document body
pub fn field_value<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(data, |current, segment| current.get(segment))
        .filter(|value| !value.is_null())
}

/// Kind of a value for ordering purposes
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Rank {
    Missing,
    Bool,
    Number,
    Timestamp,
    Text,
    Array,
    Object,
}

fn rank(value: &Value) -> Rank {
    match value {
        Value::Null => Rank::Missing,
        Value::Bool(_) => Rank::Bool,
        Value::Number(_) => Rank::Number,
        Value::String(_) | Value::Object(_) if parse_timestamp(value).is_some() => Rank::Timestamp,
        Value::String(_) => Rank::Text,
        Value::Array(_) => Rank::Array,
        Value::Object(_) => Rank::Object,
    }
}

/// Compare two values of the same kind, `None` across kinds
fn compare_same_kind(a: &Value, b: &Value) -> Option<Ordering> {
    let (rank_a, rank_b) = (rank(a), rank(b));
    if rank_a != rank_b {
        return None;
    }

    match rank_a {
        Rank::Missing => Some(Ordering::Equal),
        Rank::Bool => Some(a.as_bool()?.cmp(&b.as_bool()?)),
        Rank::Number => a.as_f64()?.partial_cmp(&b.as_f64()?),
        Rank::Timestamp => Some(parse_timestamp(a)?.cmp(&parse_timestamp(b)?)),
        Rank::Text => Some(a.as_str()?.cmp(b.as_str()?)),
        Rank::Array => {
            let (xs, ys) = (a.as_array()?, b.as_array()?);
            for (x, y) in xs.iter().zip(ys) {
                match compare_values(Some(x), Some(y)) {
                    Ordering::Equal => continue,
                    other => return Some(other),
                }
            }
            Some(xs.len().cmp(&ys.len()))
        }
        Rank::Object => Some(if a == b { Ordering::Equal } else { a.to_string().cmp(&b.to_string()) }),
    }
}

fn ordered(actual: Option<&Value>, operand: &Value) -> Option<Ordering> {
    compare_same_kind(actual?, operand)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    compare_same_kind(a, b) == Some(Ordering::Equal)
}

/// Total order over optional values used for sorting
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.unwrap_or(&Value::Null);
    let b = b.unwrap_or(&Value::Null);
    compare_same_kind(a, b).unwrap_or_else(|| rank(a).cmp(&rank(b)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn doc(id: &str, data: Value) -> Document {
        let now = Utc::now();
        Document {
            id: id.to_string(),
            data,
            create_time: now,
            update_time: now,
        }
    }

    fn ids(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d.id.as_str()).collect()
    }

    fn lab_docs() -> Vec<Document> {
        vec![
            doc("a", json!({ "test_name": "Glucose", "value": 5.4, "status": "completed", "tags": ["fasting"] })),
            doc("b", json!({ "test_name": "Glucose", "value": 7.9, "status": "reviewed", "tags": [] })),
            doc("c", json!({ "test_name": "HbA1c", "value": 6, "status": "pending" })),
            doc("d", json!({ "test_name": "Cholesterol", "value": null, "status": "pending", "meta": { "lab": "north" } })),
        ]
    }

    #[test]
    fn test_equality_filter_selects_subset() {
        let result = Query::new().where_eq("test_name", "Glucose").apply(lab_docs()).unwrap();
        assert_eq!(ids(&result), vec!["a", "b"]);
    }

    #[test]
    fn test_numeric_comparisons_mix_int_and_float() {
        let result = Query::new()
            .where_op("value", FilterOp::Gte, 6)
            .apply(lab_docs())
            .unwrap();
        assert_eq!(ids(&result), vec!["b", "c"]);

        let result = Query::new().where_eq("value", 6.0).apply(lab_docs()).unwrap();
        assert_eq!(ids(&result), vec!["c"]);
    }

    #[test]
    fn test_missing_and_null_fields() {
        let not_glucose = Query::new()
            .where_op("value", FilterOp::NotEq, 5.4)
            .apply(lab_docs())
            .unwrap();
        assert_eq!(ids(&not_glucose), vec!["b", "c", "d"]);

        let below = Query::new().where_op("value", FilterOp::Lt, 100).apply(lab_docs()).unwrap();
        assert_eq!(ids(&below), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_in_and_array_contains() {
        let result = Query::new()
            .where_in("status", vec![json!("pending"), json!("reviewed")])
            .apply(lab_docs())
            .unwrap();
        assert_eq!(ids(&result), vec!["b", "c", "d"]);

        let result = Query::new()
            .where_op("tags", FilterOp::ArrayContains, "fasting")
            .apply(lab_docs())
            .unwrap();
        assert_eq!(ids(&result), vec!["a"]);
    }

    #[test]
    fn test_nested_field_path() {
        let result = Query::new().where_eq("meta.lab", "north").apply(lab_docs()).unwrap();
        assert_eq!(ids(&result), vec!["d"]);
    }

    #[test]
    fn test_ordering_with_tiebreak_and_limit() {
        let result = Query::new()
            .order_by("test_name", Direction::Desc)
            .limit(3)
            .apply(lab_docs())
            .unwrap();
        assert_eq!(ids(&result), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_dates_compare_chronologically_across_forms() {
        let docs = vec![
            doc("late", json!({ "at": "2024-01-01T10:00:00.5Z" })),
            doc("early", json!({ "at": "2024-01-01T10:00:00Z" })),
            doc("object", json!({ "at": { "seconds": 1_704_103_201i64, "nanos": 0 } })),
        ];
        let result = Query::new().order_by("at", Direction::Asc).apply(docs.clone()).unwrap();
        assert_eq!(ids(&result), vec!["early", "late", "object"]);

        let cutoff = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let result = Query::new()
            .where_date("at", FilterOp::Gt, cutoff)
            .apply(docs)
            .unwrap();
        assert_eq!(ids(&result), vec!["late", "object"]);
    }

    #[test]
    fn test_cursor_resumes_after_document() {
        let query = Query::new().order_by("value", Direction::Asc);
        let all = query.clone().apply(lab_docs()).unwrap();
        assert_eq!(ids(&all), vec!["d", "a", "c", "b"]);

        let rest = query.clone().start_after("a").apply(lab_docs()).unwrap();
        assert_eq!(ids(&rest), vec!["c", "b"]);

        let invalid = query.start_after("zzz").apply(lab_docs());
        assert!(matches!(invalid, Err(RepositoryError::Validation(_))));
    }

    #[test]
    fn test_cursor_survives_filter_mismatch() {
        let query = Query::new()
            .where_eq("test_name", "Glucose")
            .order_by("value", Direction::Asc)
            .start_after("c");
        let result = query.apply(lab_docs()).unwrap();
        assert_eq!(ids(&result), vec!["b"]);
    }
}
