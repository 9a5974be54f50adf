//! Sort specifications

use super::predicate::lookup;
use crate::core::error::{GraphError, GraphResult, QueryError};
use crate::core::schema::Schema;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;

/// One sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub name: String,
    pub reversed: bool,
}

/// Ordered list of sort keys; `-name` sorts descending
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sort(pub Vec<SortField>);

impl Sort {
    /// Parse a comma separated list such as `"-created,title"`
    pub fn parse(order: &str, schema: &Schema) -> GraphResult<Self> {
        let mut fields = Vec::new();
        for part in order.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, reversed) = match part.strip_prefix('-') {
                Some(name) => (name, true),
                None => (part, false),
            };
            let field = schema
                .get_field(name)
                .ok_or_else(|| GraphError::query_parse(Some(name), "unknown sort field"))?;
            if !field.sortable {
                return Err(QueryError::FieldNotSortable {
                    field: name.to_string(),
                }
                .into());
            }
            fields.push(SortField {
                name: name.to_string(),
                reversed,
            });
        }
        Ok(Sort(fields))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compare two documents under this sort
    pub fn compare(&self, a: &Map<String, Value>, b: &Map<String, Value>) -> Ordering {
        for field in &self.0 {
            let ordering = total_cmp(
                lookup(a, &field.name).unwrap_or(&Value::Null),
                lookup(b, &field.name).unwrap_or(&Value::Null),
            );
            let ordering = if field.reversed {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|s| {
                if s.reversed {
                    format!("-{}", s.name)
                } else {
                    s.name.clone()
                }
            })
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

fn rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: null < bool < number < string < array < object
pub fn total_cmp(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.total_cmp(&y)
            }
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (a, b) in x.iter().zip(y) {
                let ordering = total_cmp(a, b);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::field::Field;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new()
            .field("title", Field::new().sortable())
            .field("rank", Field::new().sortable())
            .field("body", Field::new())
    }

    fn doc(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_parse_directions() {
        let sort = Sort::parse("-rank, title", &schema()).unwrap();
        assert_eq!(sort.0.len(), 2);
        assert!(sort.0[0].reversed);
        assert!(!sort.0[1].reversed);
        assert_eq!(sort.to_string(), "-rank,title");
        assert!(Sort::parse("", &schema()).unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_unsortable_and_unknown() {
        assert_eq!(
            Sort::parse("body", &schema()).unwrap_err().kind(),
            ErrorKind::FieldNotSortable
        );
        assert_eq!(
            Sort::parse("-nope", &schema()).unwrap_err().kind(),
            ErrorKind::QueryParse
        );
    }

    #[test]
    fn test_compare_multi_key() {
        let sort = Sort::parse("-rank,title", &schema()).unwrap();
        let a = doc(json!({"rank": 2, "title": "b"}));
        let b = doc(json!({"rank": 2, "title": "a"}));
        let c = doc(json!({"rank": 3, "title": "z"}));
        let mut docs = vec![a.clone(), b.clone(), c.clone()];
        docs.sort_by(|x, y| sort.compare(x, y));
        assert_eq!(docs, vec![c, b, a]);
    }

    #[test]
    fn test_total_order_across_types() {
        let values = [json!(null), json!(false), json!(1.5), json!("a"), json!([1]), json!({})];
        for pair in values.windows(2) {
            assert_eq!(total_cmp(&pair[0], &pair[1]), Ordering::Less);
        }
        assert_eq!(total_cmp(&json!(2), &json!(10)), Ordering::Less);
    }
}
