//! Predicate evaluation against in-memory documents
//!
//! Evaluation is pure: no storage access, no allocation beyond what the
//! comparisons need.

use super::predicate::{Predicate, lookup};
use chrono::DateTime;
use serde_json::{Map, Value};
use std::cmp::Ordering;

impl Predicate {
    /// Whether `doc` satisfies this predicate
    pub fn matches(&self, doc: &Map<String, Value>) -> bool {
        match self {
            Predicate::Equal { field, value } => match lookup(doc, field) {
                Some(v) => values_equal(v, value),
                None => value.is_null(),
            },
            Predicate::In { field, values } => {
                lookup(doc, field).is_some_and(|v| values.iter().any(|c| values_equal(v, c)))
            }
            Predicate::NotIn { field, values } => {
                lookup(doc, field).is_none_or(|v| !values.iter().any(|c| values_equal(v, c)))
            }
            Predicate::Compare { field, op, value } => lookup(doc, field)
                .and_then(|v| compare_values(v, value))
                .is_some_and(|ordering| op.holds(ordering)),
            Predicate::Exists { field, exists } => lookup(doc, field).is_some() == *exists,
            Predicate::Regex { field, regex } => {
                matches!(lookup(doc, field), Some(Value::String(s)) if regex.is_match(s))
            }
            Predicate::ElemMatch { field, predicate } => match lookup(doc, field) {
                Some(Value::Array(items)) => items.iter().any(|item| match item {
                    Value::Object(obj) => predicate.matches(obj),
                    _ => false,
                }),
                _ => false,
            },
            Predicate::And(items) => items.iter().all(|p| p.matches(doc)),
            Predicate::Or(items) => items.iter().any(|p| p.matches(doc)),
        }
    }
}

/// Deep equality where numbers compare by value (`1 == 1.0`)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => a == b,
    }
}

/// Ordering between two comparable values: numbers, or RFC3339 times.
///
/// Returns `None` for any other combination so the comparison fails.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => {
            let x = DateTime::parse_from_rfc3339(x).ok()?;
            let y = DateTime::parse_from_rfc3339(y).ok()?;
            Some(x.cmp(&y))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::field::Field;
    use crate::core::schema::Schema;
    use crate::core::validation::{
        ArrayValidator, IntegerValidator, StringValidator, TimeValidator,
    };
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new()
            .field("name", Field::new().filterable().with_validator(StringValidator::default()))
            .field("age", Field::new().filterable().with_validator(IntegerValidator::default()))
            .field("born", Field::new().filterable().with_validator(TimeValidator))
            .field("note", Field::new().filterable())
            .field(
                "address",
                Field::new().filterable().with_schema(
                    Schema::new().field("city", Field::new().filterable()),
                ),
            )
            .field(
                "tags",
                Field::new().filterable().with_validator(ArrayValidator::new(
                    Field::new().with_schema(
                        Schema::new()
                            .field("name", Field::new().filterable())
                            .field("weight", Field::new().filterable().with_validator(IntegerValidator::default())),
                    ),
                )),
            )
    }

    fn doc() -> Map<String, Value> {
        json!({
            "name": "john",
            "age": 32,
            "born": "1992-03-04T10:00:00.000Z",
            "note": null,
            "address": {"city": "Paris"},
            "tags": [{"name": "go", "weight": 1}, {"name": "rust", "weight": 5}]
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn eval(filter: Value) -> bool {
        Predicate::parse(&filter, &schema()).unwrap().matches(&doc())
    }

    #[test]
    fn test_equality_and_dotted_paths() {
        assert!(eval(json!({"name": "john"})));
        assert!(!eval(json!({"name": "jane"})));
        assert!(eval(json!({"address.city": "Paris"})));
        assert!(eval(json!({"address": {"city": "Paris"}})));
    }

    #[test]
    fn test_exists_counts_null_as_present() {
        assert!(eval(json!({"note": {"$exists": true}})));
        assert!(!eval(json!({"note": {"$exists": false}})));
        let p = Predicate::parse(&json!({"age": {"$exists": false}}), &schema()).unwrap();
        let mut d = doc();
        d.remove("age");
        assert!(p.matches(&d));
    }

    #[test]
    fn test_in_and_nin() {
        assert!(eval(json!({"age": {"$in": [31, 32]}})));
        assert!(!eval(json!({"age": {"$nin": [32]}})));
        assert!(eval(json!({"name": {"$nin": ["jane"]}})));

        let p = Predicate::parse(&json!({"age": {"$in": [32]}}), &schema()).unwrap();
        let q = Predicate::parse(&json!({"age": {"$nin": [32]}}), &schema()).unwrap();
        let mut d = doc();
        d.remove("age");
        assert!(!p.matches(&d));
        assert!(q.matches(&d));
    }

    #[test]
    fn test_comparisons() {
        assert!(eval(json!({"age": {"$gt": 30, "$lte": 32}})));
        assert!(!eval(json!({"age": {"$lt": 32}})));
        assert!(eval(json!({"born": {"$lt": "2000-01-01T00:00:00Z"}})));
        assert!(!eval(json!({"born": {"$gte": "1992-03-04T12:00:00+01:00"}})));
    }

    #[test]
    fn test_comparison_fails_on_absent_or_non_numeric() {
        let p = Predicate::parse(&json!({"note": {"$gt": 1}}), &schema()).unwrap();
        assert!(!p.matches(&doc()));
        let mut d = doc();
        d.insert("note".to_string(), json!("text"));
        assert!(!p.matches(&d));
        d.remove("note");
        assert!(!p.matches(&d));
    }

    #[test]
    fn test_regex() {
        assert!(eval(json!({"name": {"$regex": "^jo"}})));
        assert!(!eval(json!({"name": {"$regex": "^ja"}})));
    }

    #[test]
    fn test_elem_match_requires_single_element() {
        assert!(eval(json!({"tags": {"$elemMatch": {"name": "rust", "weight": {"$gt": 2}}}})));
        // Conditions satisfied by different elements do not match
        assert!(!eval(json!({"tags": {"$elemMatch": {"name": "go", "weight": {"$gt": 2}}}})));
    }

    #[test]
    fn test_and_idempotent_and_or() {
        for p in [
            json!({"name": "john"}),
            json!({"age": {"$gt": 40}}),
            json!({"note": {"$exists": true}}),
        ] {
            let single = eval(p.clone());
            assert_eq!(eval(json!({"$and": [p.clone(), p.clone()]})), single);
            if single {
                assert!(eval(json!({"$or": [p, {"name": "nobody"}]})));
            }
        }
    }

    #[test]
    fn test_empty_predicate_matches_everything() {
        assert!(Predicate::all().matches(&doc()));
        assert!(Predicate::all().matches(&Map::new()));
    }

    #[test]
    fn test_values_equal_numeric() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(values_equal(&json!({"a": [1, 2]}), &json!({"a": [1.0, 2]})));
        assert!(!values_equal(&json!([1, 2]), &json!([2, 1])));
        assert!(!values_equal(&json!("1"), &json!(1)));
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(compare_values(&json!(1), &json!(2.5)), Some(Ordering::Less));
        assert_eq!(compare_values(&json!("a"), &json!("b")), None);
        assert_eq!(compare_values(&json!(true), &json!(1)), None);
    }
}
